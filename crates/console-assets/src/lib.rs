use std::borrow::Cow;
use std::path::PathBuf;

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Embedded;

/// AssetBank отдаёт шаблоны и статику из каталога `COMPASS_CONSOLE_ASSETS_DIR`,
/// если он задан, иначе из встроенных ресурсов.
#[derive(Debug, Clone, Default)]
pub struct AssetBank {
    root: Option<PathBuf>,
}

impl AssetBank {
    pub fn autodetect() -> Self {
        let root = std::env::var_os("COMPASS_CONSOLE_ASSETS_DIR").map(PathBuf::from);
        Self { root }
    }

    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Raw file by relative path, e.g. `static/js/console.js`.
    pub fn get(&self, rel: &str) -> Option<Cow<'static, [u8]>> {
        if rel.split('/').any(|seg| seg == "..") {
            return None;
        }
        if let Some(root) = &self.root {
            if let Ok(bytes) = std::fs::read(root.join(rel)) {
                return Some(Cow::Owned(bytes));
            }
        }
        Embedded::get(rel).map(|f| f.data)
    }

    /// Template by name: "chat" → `templates/chat.html`. Missing → empty.
    pub fn template(&self, name: &str) -> String {
        let rel = format!("templates/{}.html", name);
        self.get(&rel)
            .map(|data| String::from_utf8_lossy(&data).into_owned())
            .unwrap_or_default()
    }

    /// Fill `{{KEY}}` placeholders. Values are inserted verbatim; escaping is
    /// the caller's job.
    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> String {
        let mut out = self.template(name);
        for (key, value) in vars {
            out = out.replace(&format!("{{{{{}}}}}", key), value);
        }
        out
    }
}

/// Content type by file extension, for the static route.
pub fn content_type(rel: &str) -> &'static str {
    match rel.rsplit('.').next().unwrap_or("") {
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "html" => "text/html; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

// file: src/settings.rs
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// User-editable overrides, stored as one TOML document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_model: Option<String>,
}

impl Settings {
    /// From the settings form: blank fields mean "not set".
    pub fn from_form(bearer_token: &str, api_key: &str, chat_model: &str) -> Self {
        fn non_empty(s: &str) -> Option<String> {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Self {
            bearer_token: non_empty(bearer_token),
            api_key: non_empty(api_key),
            chat_model: non_empty(chat_model),
        }
    }
}

/// Whole-file read/write; last writer wins.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable file falls back to defaults.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("settings: using defaults ({:#})", e);
                Settings::default()
            }
        }
    }

    fn try_load(&self) -> anyhow::Result<Settings> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse {}", self.path.display()))
    }

    pub fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        let raw = toml::to_string_pretty(settings).context("serialize settings")?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        std::fs::write(&self.path, raw)
            .with_context(|| format!("write {}", self.path.display()))?;
        tracing::info!("settings saved to {}", self.path.display());
        Ok(())
    }
}

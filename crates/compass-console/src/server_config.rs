// file: src/server_config.rs
use sha2::{Digest, Sha256};
use std::env;
use std::path::PathBuf;

type AnyResult<T> = anyhow::Result<T>;

pub const DEFAULT_CHAT_MODEL: &str = "command-a-03-2025";

/// A collaborator was requested but its endpoint/credential is not configured.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    MissingVar(&'static str),
    #[error("Cohere API Key is not configured. Please configure it in Settings.")]
    MissingApiKey,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub compass: CompassSection,
    pub cohere: CohereSection,
    pub http: HttpSection,
    pub storage: StorageSection,
}

#[derive(Clone, Debug)]
pub struct CompassSection {
    pub api_url: Option<String>,
    pub bearer_token: Option<String>,
    pub parser_url: Option<String>,
    pub parser_bearer_token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CohereSection {
    pub base_url: String,
    pub api_key: Option<String>,
    pub default_model: String,
}

#[derive(serde::Serialize, Clone, Debug)]
pub struct HttpSection {
    pub bind_addr: String,
    pub bind_port: u16,
    pub max_upload_mb: usize,
}

#[derive(serde::Serialize, Clone, Debug)]
pub struct StorageSection {
    pub settings_file: PathBuf,
    pub upload_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            compass: CompassSection {
                api_url: None,
                bearer_token: None,
                parser_url: None,
                parser_bearer_token: None,
                timeout_secs: 120,
            },
            cohere: CohereSection {
                base_url: llm_cohere::DEFAULT_BASE_URL.to_string(),
                api_key: None,
                default_model: DEFAULT_CHAT_MODEL.to_string(),
            },
            http: HttpSection {
                bind_addr: "127.0.0.1".to_string(),
                bind_port: 5000,
                max_upload_mb: 50,
            },
            storage: StorageSection {
                settings_file: PathBuf::from("settings.toml"),
                upload_dir: PathBuf::from("/tmp/compass_uploads"),
            },
        }
    }
}

impl CompassSection {
    pub fn require_api_url(&self) -> Result<&str, ConfigError> {
        self.api_url
            .as_deref()
            .ok_or(ConfigError::MissingVar("COMPASS_API_URL"))
    }

    pub fn require_parser_url(&self) -> Result<&str, ConfigError> {
        self.parser_url
            .as_deref()
            .ok_or(ConfigError::MissingVar("COMPASS_PARSER_URL"))
    }
}

impl ServerConfig {
    pub fn load_dotenvs() -> anyhow::Result<()> {
        use std::path::Path;

        fn load_one(path: &Path) -> anyhow::Result<()> {
            match dotenvy::from_filename(path) {
                Ok(_) => {
                    let absolute_path = std::fs::canonicalize(path)?;
                    tracing::info!(
                        "loaded .env from {}: {}",
                        path.display(),
                        absolute_path.display()
                    );
                    Ok(())
                }
                Err(dotenvy::Error::Io(_)) => {
                    // файла нет, просто предупреждаем
                    tracing::warn!("no .env at {}", path.display());
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("malformed .env at {}: {}", path.display(), e);
                    Err(anyhow::anyhow!("Malformed .env file: {}", path.display()))
                }
            }
        }

        load_one(Path::new(".env"))
    }

    /// URLs and keys stay optional here: a missing one only fails the
    /// request that needs that collaborator.
    pub fn from_env() -> AnyResult<Self> {
        let defaults = Self::default();

        // --- Compass ---
        let compass = CompassSection {
            api_url: get_optional("COMPASS_API_URL"),
            bearer_token: get_optional("COMPASS_API_BEARER_TOKEN").map(|s| normalize_secret(&s)),
            parser_url: get_optional("COMPASS_PARSER_URL"),
            parser_bearer_token: get_optional("COMPASS_PARSER_BEARER_TOKEN")
                .map(|s| normalize_secret(&s)),
            timeout_secs: get_env_num_or_warn("HTTP_TIMEOUT_SECS", defaults.compass.timeout_secs),
        };

        // --- Cohere ---
        let api_key = get_optional("COHERE_API_KEY")
            .map(|s| normalize_secret(&s))
            .filter(|s| !s.is_empty());
        if let Some(ref k) = api_key {
            validate_api_key(k)?;
        }
        let cohere = CohereSection {
            base_url: get_env_or_warn("COHERE_BASE_URL", defaults.cohere.base_url),
            api_key,
            default_model: get_env_or_warn("COHERE_CHAT_MODEL", defaults.cohere.default_model),
        };

        // --- HTTP ---
        let http = HttpSection {
            bind_addr: get_env_or_warn("BIND_ADDR", defaults.http.bind_addr),
            bind_port: get_env_num_or_warn("PORT", defaults.http.bind_port),
            max_upload_mb: get_env_num_or_warn("MAX_UPLOAD_MB", defaults.http.max_upload_mb),
        };

        // --- Storage ---
        let storage = StorageSection {
            settings_file: PathBuf::from(get_env_or_warn(
                "COMPASS_SETTINGS_FILE",
                defaults.storage.settings_file.to_string_lossy(),
            )),
            upload_dir: PathBuf::from(get_env_or_warn(
                "COMPASS_UPLOAD_DIR",
                defaults.storage.upload_dir.to_string_lossy(),
            )),
        };

        Ok(Self {
            compass,
            cohere,
            http,
            storage,
        })
    }

    pub fn log_summary(&self) {
        match &self.compass.api_url {
            Some(u) => tracing::info!("Compass index url={}", u),
            None => tracing::warn!("COMPASS_API_URL not set; index pages will report it"),
        }
        match &self.compass.parser_url {
            Some(u) => tracing::info!("Compass parser url={}", u),
            None => tracing::warn!("COMPASS_PARSER_URL not set; pre-chunked uploads disabled"),
        }
        if let Some(t) = &self.compass.bearer_token {
            tracing::info!("Compass bearer token: len={}, sha256[:8]={}", t.len(), sha256_8(t));
        }
        if let Some(k) = &self.cohere.api_key {
            tracing::info!("Cohere api_key: len={}, sha256[:8]={}", k.len(), sha256_8(k));
        } else {
            tracing::warn!("Cohere api_key not set in env (settings may provide it)");
        }
        tracing::info!(
            "Cohere base_url={} default model='{}' timeout={}s",
            self.cohere.base_url,
            self.cohere.default_model,
            self.compass.timeout_secs
        );
        tracing::info!(
            "HTTP {}:{} (max upload {} MB)",
            self.http.bind_addr,
            self.http.bind_port,
            self.http.max_upload_mb
        );
        tracing::info!(
            "settings={} uploads={}",
            self.storage.settings_file.display(),
            self.storage.upload_dir.display()
        );
    }

    pub fn reveal_masked(&self) -> MaskedConfig {
        MaskedConfig {
            compass: MaskedCompass {
                api_url: self.compass.api_url.clone(),
                bearer_token: self.compass.bearer_token.as_deref().map(MaskedSecret::of),
                parser_url: self.compass.parser_url.clone(),
                parser_bearer_token: self
                    .compass
                    .parser_bearer_token
                    .as_deref()
                    .map(MaskedSecret::of),
                timeout_secs: self.compass.timeout_secs,
            },
            cohere: MaskedCohere {
                base_url: self.cohere.base_url.clone(),
                api_key: self.cohere.api_key.as_deref().map(MaskedSecret::of),
                default_model: self.cohere.default_model.clone(),
            },
            http: self.http.clone(),
            storage: self.storage.clone(),
        }
    }
}

// ===== helpers =====
fn normalize_secret(s: &str) -> String {
    let mut t = s.trim().trim_matches('\u{feff}').to_string();
    if t.len() >= 2
        && ((t.starts_with('"') && t.ends_with('"')) || (t.starts_with('\'') && t.ends_with('\'')))
    {
        t = t[1..t.len() - 1].to_string();
    }
    t.trim().to_string()
}

fn validate_api_key(k: &str) -> anyhow::Result<()> {
    if k.contains('\n') || k.contains('\r') {
        anyhow::bail!("COHERE_API_KEY contains newline");
    }
    Ok(())
}

fn sha256_8(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    let d = h.finalize();
    hex::encode(&d[..4])
}

// ===== masked view for /health/config =====
#[derive(serde::Serialize, Clone, Debug)]
pub struct MaskedConfig {
    pub compass: MaskedCompass,
    pub cohere: MaskedCohere,
    pub http: HttpSection,
    pub storage: StorageSection,
}

#[derive(serde::Serialize, Clone, Debug)]
pub struct MaskedCompass {
    pub api_url: Option<String>,
    pub bearer_token: Option<MaskedSecret>,
    pub parser_url: Option<String>,
    pub parser_bearer_token: Option<MaskedSecret>,
    pub timeout_secs: u64,
}

#[derive(serde::Serialize, Clone, Debug)]
pub struct MaskedCohere {
    pub base_url: String,
    pub api_key: Option<MaskedSecret>,
    pub default_model: String,
}

#[derive(serde::Serialize, Clone, Debug)]
pub struct MaskedSecret {
    pub len: usize,
    pub sha256_8: String,
}

impl MaskedSecret {
    fn of(secret: &str) -> Self {
        Self {
            len: secret.len(),
            sha256_8: sha256_8(secret),
        }
    }
}

fn get_optional(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

// WARN + default (строки)
fn get_env_or_warn(name: &str, default: impl Into<String>) -> String {
    match env::var(name) {
        Ok(v) => v.trim().to_string(),
        Err(_) => {
            tracing::warn!("ENV `{}` not set, using default", name);
            default.into()
        }
    }
}

fn get_env_num_or_warn<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match env::var(name) {
        Ok(v) => match v.trim().parse::<T>() {
            Ok(x) => x,
            Err(_) => {
                tracing::warn!("ENV `{}` invalid value `{}`, using default", name, v);
                default
            }
        },
        Err(_) => {
            tracing::warn!("ENV `{}` not set, using default", name);
            default
        }
    }
}

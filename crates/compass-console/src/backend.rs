// file: src/backend.rs
use std::sync::Arc;
use std::time::Duration;

use compass_client::{CompassClient, CompassParserClient, IndexClient, ParserClient, ParserConfig};
use llm_cohere::CohereClient;
use llm_traits::LlmClient;

use crate::server_config::{ConfigError, ServerConfig};
use crate::settings::{Settings, SettingsStore};

pub trait HasConfig {
    fn config(&self) -> &ServerConfig;
}

/// Builds the external collaborators per request. Handlers only ever see
/// this trait, so tests swap in in-memory fakes.
pub trait Backends: HasConfig + Send + Sync + 'static {
    fn settings(&self) -> &SettingsStore;
    fn index_client(&self, settings: &Settings) -> anyhow::Result<Arc<dyn IndexClient>>;
    fn parser_client(&self, config: ParserConfig) -> anyhow::Result<Arc<dyn ParserClient>>;
    fn chat_client(&self, api_key: &str) -> anyhow::Result<Arc<dyn LlmClient>>;
}

/// Settings first, environment second.
#[derive(Debug, Clone)]
pub struct Effective {
    pub bearer_token: Option<String>,
    pub api_key: Option<String>,
    pub chat_model: String,
}

impl Effective {
    pub fn resolve(settings: &Settings, cfg: &ServerConfig) -> Self {
        Self {
            bearer_token: settings
                .bearer_token
                .clone()
                .or_else(|| cfg.compass.bearer_token.clone()),
            api_key: settings.api_key.clone().or_else(|| cfg.cohere.api_key.clone()),
            chat_model: settings
                .chat_model
                .clone()
                .unwrap_or_else(|| cfg.cohere.default_model.clone()),
        }
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }
}

pub struct LiveBackends {
    cfg: Arc<ServerConfig>,
    settings: SettingsStore,
}

impl LiveBackends {
    pub fn new(cfg: Arc<ServerConfig>) -> Self {
        let settings = SettingsStore::new(cfg.storage.settings_file.clone());
        Self { cfg, settings }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.cfg.compass.timeout_secs)
    }
}

impl HasConfig for LiveBackends {
    fn config(&self) -> &ServerConfig {
        &self.cfg
    }
}

impl Backends for LiveBackends {
    fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    fn index_client(&self, settings: &Settings) -> anyhow::Result<Arc<dyn IndexClient>> {
        let url = self.cfg.compass.require_api_url()?;
        let token = Effective::resolve(settings, &self.cfg).bearer_token;
        Ok(Arc::new(CompassClient::new(url, token, self.timeout())?))
    }

    fn parser_client(&self, config: ParserConfig) -> anyhow::Result<Arc<dyn ParserClient>> {
        let url = self.cfg.compass.require_parser_url()?;
        let token = self.cfg.compass.parser_bearer_token.clone();
        Ok(Arc::new(CompassParserClient::new(
            url,
            token,
            config,
            self.timeout(),
        )?))
    }

    fn chat_client(&self, api_key: &str) -> anyhow::Result<Arc<dyn LlmClient>> {
        Ok(Arc::new(CohereClient::with_base_url(
            api_key.to_string(),
            &self.cfg.cohere.base_url,
            self.timeout(),
        )?))
    }
}

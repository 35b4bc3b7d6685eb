use crate::{error::ReftreeError, locator::SpaceLocator};
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

/// Environment variable holding the content-management access token.
pub const TOKEN_ENV: &str = "REFTREE_CMA_TOKEN";

pub const DEFAULT_LOCALE: &str = "en-US";
pub const DEFAULT_BATCH_SIZE: usize = 4;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_DEPTH: usize = 3;
pub const DEFAULT_PAGE_SIZE: usize = 3;
pub const DEFAULT_API_URL: &str = "https://api.contentful.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub size: usize,
    pub delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            size: DEFAULT_BATCH_SIZE,
            delay_ms: DEFAULT_BATCH_DELAY_MS,
        }
    }
}

impl BatchConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub page_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentTypesConfig {
    pub container: String,
    pub leaf: Vec<String>,
    pub low_priority: Option<String>,
    pub variant: Vec<String>,
    pub taxonomy: Option<String>,
    /// Content type that cloned variants are created under.
    pub clone_target: String,
}

impl Default for ContentTypesConfig {
    fn default() -> Self {
        ContentTypesConfig {
            container: "place".to_string(),
            leaf: vec!["poi".to_string()],
            low_priority: Some("poi".to_string()),
            variant: vec![
                "poiVariantApp".to_string(),
                "poiVariantWeb".to_string(),
                "poiVariantPrint".to_string(),
            ],
            taxonomy: Some("taxonomy".to_string()),
            clone_target: "poiVariantApp".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub space_id: String,
    pub environment_id: String,
    /// Space that external resource links point into.
    pub shared: Option<SpaceLocator>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: DEFAULT_API_URL.to_string(),
            space_id: String::new(),
            environment_id: "master".to_string(),
            shared: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReftreeConfig {
    pub locale: String,
    pub batch: BatchConfig,
    pub tree: TreeConfig,
    pub content_types: ContentTypesConfig,
    pub api: ApiConfig,
}

impl Default for ReftreeConfig {
    fn default() -> Self {
        ReftreeConfig {
            locale: DEFAULT_LOCALE.to_string(),
            batch: BatchConfig::default(),
            tree: TreeConfig::default(),
            content_types: ContentTypesConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl ReftreeConfig {
    pub fn validate(&self) -> Result<(), ReftreeError> {
        if self.batch.size == 0 {
            return Err(ReftreeError::Config("batch.size must be positive".to_string()));
        }
        if self.tree.page_size == 0 {
            return Err(ReftreeError::Config(
                "tree.page_size must be positive".to_string(),
            ));
        }
        if self.locale.is_empty() {
            return Err(ReftreeError::Config("locale must not be empty".to_string()));
        }
        Url::parse(&self.api.base_url)?;
        Ok(())
    }

    /// Access token for the content API. Tokens are never read from or written to the config file.
    pub fn token_from_env() -> Result<String, ReftreeError> {
        std::env::var(TOKEN_ENV)
            .map_err(|_| ReftreeError::Config(format!("{TOKEN_ENV} is not set")))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<ReftreeConfig, ReftreeError> {
        tracing::debug!("Attempting to read config from: {:?}", &self.path);
        if !self.path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(ReftreeConfig::default());
        }
        let content = read_to_string(&self.path)?;
        let config: ReftreeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &ReftreeConfig) -> Result<(), ReftreeError> {
        tracing::debug!("Attempting to write config to: {:?}", &self.path);
        config.validate()?;
        let toml_string = toml::to_string(config)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::item::FeedKey;

pub const NEWS_FEED: &str = "news";
pub const LIKES_FEED: &str = "likes";

const NEWS_ENDPOINT_ENV: &str = "NEWSDECK_NEWS_ENDPOINT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub feeds: BTreeMap<String, FeedSettings>,
    pub review: ReviewConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub default_endpoint: String,
    /// `{id}` is replaced by the item id; without it `/{id}` is appended.
    pub reaction_endpoint: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    #[serde(default)]
    pub endpoint: Option<String>,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    pub max_feed_items: usize,
    pub visible_stack: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut feeds = BTreeMap::new();
        feeds.insert(
            NEWS_FEED.to_string(),
            FeedSettings {
                endpoint: None,
                ttl_seconds: 60,
            },
        );
        feeds.insert(
            LIKES_FEED.to_string(),
            FeedSettings {
                endpoint: Some("/api/articles/likes".to_string()),
                ttl_seconds: 5 * 60,
            },
        );
        Self {
            api: ApiConfig::default(),
            feeds,
            review: ReviewConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            default_endpoint: "/api/news".to_string(),
            reaction_endpoint: "/api/articles/{id}/reaction".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_feed_items: 30,
            visible_stack: 4,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reaction_path(&self, item_id: i64) -> String {
        if self.reaction_endpoint.contains("{id}") {
            self.reaction_endpoint.replace("{id}", &item_id.to_string())
        } else {
            format!("{}/{}", self.reaction_endpoint.trim_end_matches('/'), item_id)
        }
    }
}

impl AppConfig {
    pub fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("newsdeck").join("config.json"))
    }

    /// Loads the user configuration, or falls back to defaults and tries to
    /// write them out. Environment overrides are applied either way.
    pub fn load() -> Self {
        let mut config = match Self::config_file_path() {
            Some(path) => match Self::load_from(&path) {
                Ok(config) => config,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "could not load config, using defaults");
                    let default_config = Self::default();
                    if let Err(save_err) = default_config.save_to(&path) {
                        warn!(error = %save_err, "could not save default config");
                    }
                    default_config
                }
            },
            None => {
                warn!("no config directory on this platform, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(endpoint) = std::env::var(NEWS_ENDPOINT_ENV)
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            self.api.default_endpoint = endpoint;
        }
    }

    /// Endpoint for every configured feed key.
    pub fn routes(&self) -> BTreeMap<FeedKey, String> {
        self.feeds
            .iter()
            .map(|(name, settings)| {
                let endpoint = settings
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| self.api.default_endpoint.clone());
                (FeedKey::new(name.clone()), endpoint)
            })
            .collect()
    }

    /// Freshness window for a feed; unknown feeds get the default feed's.
    pub fn ttl_for(&self, key: &FeedKey) -> Duration {
        let seconds = self
            .feeds
            .get(key.as_str())
            .or_else(|| self.feeds.get(NEWS_FEED))
            .map(|settings| settings.ttl_seconds)
            .unwrap_or(60);
        Duration::from_secs(seconds)
    }
}

use crate::duration::DEFAULT_SESSION_EXPIRATION_NOTICE_INTERVAL_SECS;
use crate::error::ConfigError;
use crate::reconnection::ReconnectionConfig;
use crate::{
    API_URL_PREFIX, DEPLOYMENT_ID_QUERY_KEY, DEPLOYMENTS_API_PATH, WEB_SOCKET_PATH,
    WEB_SOCKET_URL_PREFIX,
};

use common::ErrorLocation;

use std::panic::Location;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};
use url::Url;

const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessengerConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    pub deployment_id: String,

    /// Bare host suffix, e.g. `mypurecloud.com`.
    pub domain: String,

    #[serde(default = "default_reconnection_timeout_secs")]
    pub reconnection_timeout_secs: u64,

    #[serde(default = "default_auto_refresh_token_when_expired")]
    pub auto_refresh_token_when_expired: bool,

    #[serde(default = "default_session_expiration_notice_interval_secs")]
    pub session_expiration_notice_interval_secs: i64,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_reconnection_timeout_secs() -> u64 {
    300
}
fn default_auto_refresh_token_when_expired() -> bool {
    true
}
fn default_session_expiration_notice_interval_secs() -> i64 {
    DEFAULT_SESSION_EXPIRATION_NOTICE_INTERVAL_SECS
}

impl MessengerConfig {
    pub fn new(deployment_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            version: CONFIG_VERSION,
            deployment_id: deployment_id.into(),
            domain: domain.into(),
            reconnection_timeout_secs: default_reconnection_timeout_secs(),
            auto_refresh_token_when_expired: default_auto_refresh_token_when_expired(),
            session_expiration_notice_interval_secs:
                default_session_expiration_notice_interval_secs(),
        }
    }

    /// Load and validate a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when `path` does not exist, and the
    /// read/parse/validation variants otherwise.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                location: ErrorLocation::from(Location::caller()),
                path: path.to_path_buf(),
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: MessengerConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        config.validate()?;

        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Save to `path` using temp file + rename.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                location: ErrorLocation::from(Location::caller()),
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        let temp_path = path.with_extension("toml.tmp");

        std::fs::write(&temp_path, contents).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            source: e,
        })?;

        info!("Config saved to {}", path.display());
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid version: {} (expected 1-{})",
                    self.version, CONFIG_VERSION
                ),
            });
        }

        if self.deployment_id.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "deployment_id cannot be empty".to_string(),
            });
        }

        if self.domain.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "domain cannot be empty".to_string(),
            });
        }

        if self.domain.contains("://") || self.domain.contains('/') {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid domain: {} (expected a bare host without scheme or path)",
                    self.domain
                ),
            });
        }

        Ok(())
    }

    /// `wss://webmessaging.<domain>/v1?deploymentId=<id>`
    pub fn web_socket_url(&self) -> Result<Url, ConfigError> {
        let mut url = parse_url(&format!(
            "{WEB_SOCKET_URL_PREFIX}{}{WEB_SOCKET_PATH}",
            self.domain
        ))?;
        url.query_pairs_mut()
            .append_pair(DEPLOYMENT_ID_QUERY_KEY, &self.deployment_id);
        Ok(url)
    }

    /// `https://api.<domain>/api/v2/webdeployments/`
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        parse_url(&format!(
            "{API_URL_PREFIX}{}{DEPLOYMENTS_API_PATH}",
            self.domain
        ))
    }

    pub fn reconnection(&self) -> ReconnectionConfig {
        ReconnectionConfig::from_timeout_secs(self.reconnection_timeout_secs)
    }
}

#[track_caller]
fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason: format!("Invalid URL {raw}: {e}"),
    })
}

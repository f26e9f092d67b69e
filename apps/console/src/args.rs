//! Command-line flags, with `MESSENGER_*` environment fallbacks.

use crate::error::ConsoleError;
use crate::logger::{DEFAULT_LOG_LEVEL, LOG_FILE_NAME};

use transport_core::config::MessengerConfig;
use transport_core::error::ConfigError;

use common::ErrorLocation;

use std::panic::Location;
use std::path::PathBuf;

use clap::Parser;
use log::{LevelFilter, info};

const APP_DIR_NAME: &str = "messenger-console";
const CONFIG_FILE_NAME: &str = "config.toml";
const STORE_FILE_NAME: &str = "store.json";
const LOG_DIR_NAME: &str = "logs";

#[derive(Parser, Debug, Clone)]
#[command(name = "messenger-console")]
#[command(about = "Chat with a web-messaging deployment from the terminal")]
pub struct Args {
    /// TOML config file; created from the flags below when missing
    #[arg(long, env = "MESSENGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Deployment to connect to; overrides the config file
    #[arg(long, env = "MESSENGER_DEPLOYMENT_ID")]
    pub deployment_id: Option<String>,

    /// Region domain such as `mypurecloud.com`; overrides the config file
    #[arg(long, env = "MESSENGER_DOMAIN")]
    pub domain: Option<String>,

    /// Where the previously-authorized flag is kept
    #[arg(long, env = "MESSENGER_STORE")]
    pub store: Option<PathBuf>,

    #[arg(long, env = "MESSENGER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// off, error, warn, info, debug or trace
    #[arg(long, env = "MESSENGER_LOG_LEVEL", value_parser = parse_level)]
    pub log_level: Option<LevelFilter>,

    /// Persist the resolved config back to `--config`
    #[arg(long, default_value_t = false)]
    pub save_config: bool,
}

fn parse_level(value: &str) -> Result<LevelFilter, String> {
    value
        .parse()
        .map_err(|_| format!("unknown log level `{value}`"))
}

/// Per-user data directory for this app, falling back to the working directory.
fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR_NAME)
}

impl Args {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| app_dir(dirs::config_dir()).join(CONFIG_FILE_NAME))
    }

    pub fn store_path(&self) -> PathBuf {
        self.store
            .clone()
            .unwrap_or_else(|| app_dir(dirs::data_local_dir()).join(STORE_FILE_NAME))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| app_dir(dirs::data_local_dir()).join(LOG_DIR_NAME))
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join(LOG_FILE_NAME)
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level.unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Load the config file and apply flag overrides on top of it.
    ///
    /// A missing file is not an error as long as both `--deployment-id` and
    /// `--domain` are given.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Config`] when the file is unreadable or
    /// invalid, when required values are missing, or when the merged config
    /// fails validation.
    pub fn resolve_config(&self) -> Result<MessengerConfig, ConsoleError> {
        let path = self.config_path();

        let mut config = match MessengerConfig::load(&path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(ConfigError::NotFound { .. }) => {
                match (&self.deployment_id, &self.domain) {
                    (Some(deployment_id), Some(domain)) => {
                        MessengerConfig::new(deployment_id, domain)
                    }
                    _ => {
                        return Err(ConsoleError::Config {
                            message: format!(
                                "No config at {} and --deployment-id/--domain not both given",
                                path.display()
                            ),
                            location: ErrorLocation::from(Location::caller()),
                        });
                    }
                }
            }
            Err(e) => {
                return Err(ConsoleError::Config {
                    message: e.to_string(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        };

        if let Some(deployment_id) = &self.deployment_id {
            config.deployment_id = deployment_id.clone();
        }
        if let Some(domain) = &self.domain {
            config.domain = domain.clone();
        }

        config.validate().map_err(|e| ConsoleError::Config {
            message: e.to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        if self.save_config {
            config.save(&path).map_err(|e| ConsoleError::Config {
                message: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;
            info!("Saved config to {}", path.display());
        }

        Ok(config)
    }
}

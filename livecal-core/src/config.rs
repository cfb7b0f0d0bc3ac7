//! Sync configuration.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::remote::{Direction, Query};

static DEFAULT_COLLECTION: &str = "events";
static DEFAULT_ORDER_BY: &str = "text";
static ENV_PREFIX: &str = "LIVECAL";

/// Configuration at ~/.config/livecal/config.toml
///
/// Every key is optional and can be overridden with a `LIVECAL_<KEY>`
/// environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote collection holding the events
    pub collection: String,

    /// Field the live query is ordered by. Documents without it are not synced.
    pub order_by: String,

    pub direction: Direction,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            collection: DEFAULT_COLLECTION.to_string(),
            order_by: DEFAULT_ORDER_BY.to_string(),
            direction: Direction::Descending,
        }
    }
}

impl SyncConfig {
    pub fn config_path() -> SyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SyncError::Config("Could not determine config directory".into()))?
            .join("livecal");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, writing a commented template on first run.
    pub fn load() -> SyncResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    /// Load from `path` (`~` is expanded). A missing file yields the defaults.
    pub fn load_from(path: &Path) -> SyncResult<Self> {
        let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());

        let config: SyncConfig = Config::builder()
            .add_source(File::from(expanded).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// The live query the bridge subscribes to.
    pub fn query(&self) -> Query {
        Query::new(&self.collection, &self.order_by, self.direction)
    }

    pub fn to_toml(&self) -> SyncResult<String> {
        toml::to_string_pretty(self).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> SyncResult<()> {
        let contents = format!(
            "\
# livecal configuration

# Remote collection holding the events:
# collection = \"{}\"

# Field the live query is ordered by (documents without it are not synced):
# order_by = \"{}\"
# direction = \"descending\"
",
            DEFAULT_COLLECTION, DEFAULT_ORDER_BY
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| SyncError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    fn validate(&self) -> SyncResult<()> {
        if self.collection.trim().is_empty() {
            return Err(SyncError::Config("collection must not be empty".into()));
        }
        if self.order_by.trim().is_empty() {
            return Err(SyncError::Config("order_by must not be empty".into()));
        }
        Ok(())
    }
}

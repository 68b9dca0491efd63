//! Configuration file loading and parsing

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{validate_currency, Scope, StockroomConfigFile};

/// Configuration file names to search for
pub const CONFIG_FILE_NAMES: &[&str] = &["stockroom.yaml", "stockroom.yml"];

/// Loaded and validated Stockroom configuration
#[derive(Debug, Clone)]
pub struct StockroomConfig {
    /// The parsed configuration
    pub config: StockroomConfigFile,

    /// Path to the configuration file, if one was found
    pub config_path: Option<Utf8PathBuf>,

    /// Directory relative paths are resolved against
    pub working_dir: Utf8PathBuf,
}

impl StockroomConfig {
    /// Load configuration from the specified path or search for it
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let (config_path, content) = match path {
            Some(p) => (p.to_owned(), read_config(p)?),
            None => Self::find_config()?,
        };
        Self::from_yaml(&content, config_path)
    }

    /// Like [`StockroomConfig::load`], but falls back to defaults when no
    /// file is found by searching. An explicit path must still exist.
    pub fn load_or_default(path: Option<&Utf8Path>) -> Result<Self> {
        match Self::load(path) {
            Err(Error::ConfigNotFound { .. }) if path.is_none() => {
                debug!("No stockroom.yaml found, using defaults");
                Ok(Self {
                    config: StockroomConfigFile::default(),
                    config_path: None,
                    working_dir: current_dir()?,
                })
            }
            other => other,
        }
    }

    fn from_yaml(content: &str, config_path: Utf8PathBuf) -> Result<Self> {
        let working_dir = config_path
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .map(|p| p.to_owned())
            .unwrap_or_else(|| Utf8PathBuf::from("."));

        let config: StockroomConfigFile = serde_yaml_ng::from_str(content)?;
        let loaded = Self {
            config,
            config_path: Some(config_path),
            working_dir,
        };
        loaded.validate()?;
        Ok(loaded)
    }

    /// Find configuration file in current directory or parent directories
    fn find_config() -> Result<(Utf8PathBuf, String)> {
        let cwd = current_dir()?;
        let mut current = cwd.as_path();

        loop {
            for name in CONFIG_FILE_NAMES {
                let path = current.join(name);
                if path.exists() {
                    let content = fs::read_to_string(&path)?;
                    return Ok((path, content));
                }
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Err(Error::config_not_found(
            "stockroom.yaml (searched current and parent directories)",
        ))
    }

    fn validate(&self) -> Result<()> {
        let restore = &self.config.restore;
        if restore.max_concurrent == 0 {
            return Err(Error::invalid_config(
                "restore.max_concurrent must be at least 1",
            ));
        }
        if restore.poll_interval_secs == 0 {
            return Err(Error::invalid_config(
                "restore.poll_interval_secs must be at least 1",
            ));
        }
        if self.config.scope.tenant.is_empty() || self.config.scope.user.is_empty() {
            return Err(Error::invalid_config("scope.tenant and scope.user are required"));
        }
        if let Some(currency) = &self.config.settings.main_currency {
            validate_currency("settings.main_currency", currency)
                .map_err(|e| Error::invalid_config(e.to_string()))?;
        }
        Ok(())
    }

    /// Scope the CLI operates in
    pub fn scope(&self) -> Scope {
        Scope::new(&self.config.scope.tenant, &self.config.scope.user)
    }

    /// Snapshot path, resolved against the config directory
    pub fn snapshot_path(&self) -> Utf8PathBuf {
        self.resolve(&self.config.storage.snapshot)
    }

    pub fn blob_url(&self) -> &str {
        &self.config.blobs.url
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.restore.poll_interval_secs)
    }

    pub fn max_concurrent(&self) -> usize {
        self.config.restore.max_concurrent
    }

    pub fn main_currency(&self) -> Option<&str> {
        self.config.settings.main_currency.as_deref()
    }

    fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.working_dir.join(path)
        }
    }
}

fn read_config(path: &Utf8Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::config_not_found(path.as_str())
        } else {
            Error::Io(e)
        }
    })
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().map_err(Error::Io)?;
    Utf8PathBuf::try_from(cwd)
        .map_err(|_| Error::invalid_config("Current directory path is not valid UTF-8"))
}

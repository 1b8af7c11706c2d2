//! Settings: `catalog.toml`, command-line overrides and defaults.
//!
//! ```toml
//! index-location = "/var/cache/jar-catalog/index.lmdb"
//! file-type = [".jar", ".war"]
//! skip-if-processed = true
//! refresh-interval-secs = 300
//! config-refresh-delay-ms = 5000
//! ```
//!
//! A flag beats the file, the file beats the default. When no settings file
//! exists at all the index lives in the data directory; a settings file that
//! exists must name `index-location` unless `--index` is given.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use crate::cli::Cli;
use crate::engine::lmdb::lock_path;
use crate::error::{CatalogError, Result};

pub const CONFIG_FILE_NAME: &str = "catalog.toml";
pub const INDEX_FILE_NAME: &str = "index.lmdb";

const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
const DEFAULT_CONFIG_REFRESH_DELAY_MS: u64 = 5000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SettingsFile {
    index_location: Option<PathBuf>,
    file_type: Option<Vec<String>>,
    skip_if_processed: Option<bool>,
    refresh_interval_secs: Option<u64>,
    config_refresh_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    pub index_location: PathBuf,
    pub file_type: Vec<String>,
    pub skip_if_processed: bool,
    pub refresh_interval: Duration,
    pub config_refresh_delay: Duration,
}

impl Settings {
    pub fn defaults(index_location: PathBuf) -> Self {
        Self {
            index_location,
            file_type: vec![".jar".to_string()],
            skip_if_processed: true,
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            config_refresh_delay: Duration::from_millis(DEFAULT_CONFIG_REFRESH_DELAY_MS),
        }
    }

    /// Resolves settings from an optional settings file and index override.
    ///
    /// `config_file = None` means the default location, which may be absent.
    /// An explicitly named file must exist.
    pub fn resolve(config_file: Option<&Path>, index: Option<&Path>) -> Result<Self> {
        let path = match config_file {
            Some(p) => {
                if !p.exists() {
                    return Err(CatalogError::Config {
                        path: p.to_path_buf(),
                        message: "settings file not found".to_string(),
                    });
                }
                p.to_path_buf()
            }
            None => default_config_path()?,
        };

        let Some(file) = read_settings_file(&path)? else {
            let location = match index {
                Some(p) => p.to_path_buf(),
                None => catalog_home()?.join(INDEX_FILE_NAME),
            };
            return Ok(Self::defaults(location));
        };

        let index_location = match (index, &file.index_location) {
            (Some(p), _) => p.to_path_buf(),
            (None, Some(p)) if p.is_relative() => path
                .parent()
                .map(|dir| dir.join(p))
                .unwrap_or_else(|| p.clone()),
            (None, Some(p)) => p.clone(),
            (None, None) => {
                return Err(CatalogError::MissingConfiguration {
                    key: "index-location",
                });
            }
        };

        let mut settings = Self::defaults(index_location);
        if let Some(types) = file.file_type {
            if types.is_empty() || types.iter().any(String::is_empty) {
                return Err(CatalogError::Config {
                    path,
                    message: "file-type must list non-empty suffixes".to_string(),
                });
            }
            settings.file_type = types;
        }
        if let Some(skip) = file.skip_if_processed {
            settings.skip_if_processed = skip;
        }
        if let Some(secs) = file.refresh_interval_secs {
            settings.refresh_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = file.config_refresh_delay_ms {
            settings.config_refresh_delay = Duration::from_millis(ms);
        }
        Ok(settings)
    }
}

pub fn resolve(cli: &Cli) -> Result<Settings> {
    Settings::resolve(cli.config.as_deref(), cli.index.as_deref())
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(catalog_home()?.join(CONFIG_FILE_NAME))
}

fn catalog_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "failed to resolve data directory"))?;
    Ok(base.join("jar-catalog"))
}

fn read_settings_file(path: &Path) -> Result<Option<SettingsFile>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| CatalogError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Deletes the index file and its lock file.
pub fn clear_index(index_location: &Path) -> Result<()> {
    remove_file_if_exists(index_location)?;
    remove_file_if_exists(&lock_path(index_location))?;
    Ok(())
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Settings that follow edits to the settings file.
///
/// The file's mtime is checked at most once per `config-refresh-delay`; a
/// changed file is re-read, and a file that no longer parses keeps the
/// previous settings in force.
#[derive(Debug)]
pub struct ReloadingSettings {
    config_file: Option<PathBuf>,
    index: Option<PathBuf>,
    current: Settings,
    watched: PathBuf,
    last_modified: Option<SystemTime>,
    last_check: Instant,
}

impl ReloadingSettings {
    pub fn new(config_file: Option<PathBuf>, index: Option<PathBuf>) -> Result<Self> {
        let current = Settings::resolve(config_file.as_deref(), index.as_deref())?;
        let watched = match &config_file {
            Some(p) => p.clone(),
            None => default_config_path()?,
        };
        Ok(Self {
            last_modified: modified(&watched),
            config_file,
            index,
            current,
            watched,
            last_check: Instant::now(),
        })
    }

    pub fn from_cli(cli: &Cli) -> Result<Self> {
        Self::new(cli.config.clone(), cli.index.clone())
    }

    pub fn current(&self) -> &Settings {
        &self.current
    }

    /// Re-reads the settings file if it changed; returns whether settings did.
    pub fn refresh(&mut self) -> bool {
        if self.last_check.elapsed() < self.current.config_refresh_delay {
            return false;
        }
        self.last_check = Instant::now();

        let stamp = modified(&self.watched);
        if stamp == self.last_modified {
            return false;
        }
        self.last_modified = stamp;

        match Settings::resolve(self.config_file.as_deref(), self.index.as_deref()) {
            Ok(settings) if settings != self.current => {
                info!("settings reloaded from {}", self.watched.display());
                self.current = settings;
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("keeping previous settings: {e}");
                false
            }
        }
    }
}

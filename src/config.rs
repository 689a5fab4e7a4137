//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML file: the `--config` path, or `config.toml` in the platform config
//!    directory (e.g. `~/.config/dupfind/config.toml`)
//! 3. Environment variables prefixed with `DUPFIND_` (e.g. `DUPFIND_WORKERS=8`)
//! 4. Command-line flags
//!
//! ```toml
//! workers = 8
//! queue_capacity = 512
//! algorithm = "md5"
//! skip_hidden = true
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cli::ScanArgs;
use crate::duplicates::{FinderConfig, DEFAULT_QUEUE_CAPACITY, MAX_WORKERS};
use crate::scanner::{HashAlgorithm, WalkerConfig, MAX_QUEUE_CAPACITY};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DUPFIND_";

/// Errors loading or saving the configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A layer contained an invalid value.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),

    /// A setting parsed but lies outside its supported range.
    #[error("Invalid configuration: {key} = {value} exceeds the maximum of {max}")]
    OutOfRange {
        /// Name of the offending setting
        key: &'static str,
        /// The value that was supplied
        value: usize,
        /// Largest accepted value
        max: usize,
    },

    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Writing the config file failed.
    #[error("I/O error writing config: {0}")]
    Io(#[from] io::Error),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hashing worker threads (0 = available parallelism).
    pub workers: usize,
    /// Directory walker threads (0 = available parallelism).
    pub walk_threads: usize,
    /// Paths buffered between the walker and the workers.
    pub queue_capacity: usize,
    /// Content digest algorithm.
    pub algorithm: HashAlgorithm,
    /// Cancel the scan at the first unreadable file or directory.
    pub strict: bool,
    /// Follow symbolic links.
    pub follow_symlinks: bool,
    /// Skip names starting with `.`.
    pub skip_hidden: bool,
    /// Skip zero-length files.
    pub skip_empty: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 0,
            walk_threads: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            algorithm: HashAlgorithm::Blake3,
            strict: false,
            follow_symlinks: false,
            skip_hidden: false,
            skip_empty: false,
        }
    }
}

impl Config {
    /// Load defaults, the config file and the environment.
    ///
    /// With `explicit = None` the platform default path is used and a missing
    /// file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing or any layer holds an
    /// invalid value.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };
        if let Some(ref path) = path {
            log::debug!("Loading config from {}", path.display());
        }
        let config: Self = Self::figment(path.as_deref())
            .extract()
            .map_err(|e| ConfigError::Invalid(Box::new(e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scan pipeline cannot honour.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first setting above its limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("queue_capacity", self.queue_capacity, MAX_QUEUE_CAPACITY),
            ("workers", self.workers, MAX_WORKERS),
        ];
        for (key, value, max) in limits {
            if value > max {
                return Err(ConfigError::OutOfRange { key, value, max });
            }
        }
        Ok(())
    }

    /// Load from a specific file, falling back to defaults on any error.
    #[must_use]
    pub fn load_from_path(path: impl AsRef<Path>) -> Self {
        match Self::figment(Some(path.as_ref())).extract::<Self>() {
            Ok(config) if config.validate().is_ok() => config,
            Ok(_) => {
                log::debug!("Config values out of range, using defaults");
                Self::default()
            }
            Err(e) => {
                log::debug!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Apply scan flags given on the command line.
    pub fn merge_scan_args(&mut self, args: &ScanArgs) {
        if let Some(workers) = args.workers {
            self.workers = workers;
        }
        if let Some(threads) = args.walk_threads {
            self.walk_threads = threads;
        }
        if let Some(capacity) = args.queue_capacity {
            self.queue_capacity = capacity;
        }
        if let Some(algorithm) = args.algorithm {
            self.algorithm = algorithm.into();
        }
        self.strict |= args.strict;
        self.follow_symlinks |= args.follow_symlinks;
        self.skip_hidden |= args.skip_hidden;
        self.skip_empty |= args.skip_empty;
    }

    /// Save the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default platform-specific configuration path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "dupfind").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Build the finder configuration for a scan.
    #[must_use]
    pub fn finder_config(&self) -> FinderConfig {
        FinderConfig::default()
            .with_workers(self.workers)
            .with_walk_threads(self.walk_threads)
            .with_queue_capacity(self.queue_capacity)
            .with_algorithm(self.algorithm)
            .with_strict(self.strict)
            .with_walker_config(WalkerConfig::new(
                self.follow_symlinks,
                self.skip_hidden,
                self.skip_empty,
            ))
    }
}

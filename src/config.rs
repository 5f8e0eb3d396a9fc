//! Configuration for timeranger
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, TrangerError};

/// Main configuration for a timeranger database handle
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory holding one directory per database
    /// Internal structure:
    ///   {path}/{database}/
    ///     ├── __descriptor__
    ///     └── {topic}/
    ///           ├── topic_desc, topic_var, topic_cols
    ///           ├── topic_idx        (binary index log)
    ///           └── data/            (content bucket files)
    pub path: PathBuf,

    /// Database name (directory under `path`)
    pub database: String,

    /// strftime-like pattern turning a record time into a bucket name
    pub filename_mask: String,

    // -------------------------------------------------------------------------
    // Permissions (Unix modes)
    // -------------------------------------------------------------------------
    /// Mode for created directories
    pub xpermission: u32,

    /// Mode for created files
    pub rpermission: u32,

    // -------------------------------------------------------------------------
    // Access Configuration
    // -------------------------------------------------------------------------
    /// Writer or reader handle
    pub master: AccessMode,

    /// What to do when an on-disk invariant is found broken
    pub on_critical_error: CriticalErrorPolicy,
}

/// Access mode of a database handle
///
/// Exactly one process per database should open it as `Master`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-write
    Master,

    /// Read-only; every mutating call fails with `NotMaster`
    ReadOnly,
}

/// Policy applied to corruption errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriticalErrorPolicy {
    /// Log and return the error, letting the caller decide whether to exit
    LogAndContinue,

    /// Log and abort the process
    Abort,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./tranger_data"),
            database: "tranger".to_string(),
            filename_mask: "%Y-%m-%d".to_string(),
            xpermission: 0o2775,
            rpermission: 0o664,
            master: AccessMode::ReadOnly,
            on_critical_error: CriticalErrorPolicy::LogAndContinue,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the configuration before any directory is touched
    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(TrangerError::Config("database name is empty".to_string()));
        }
        if self.database.contains('/') {
            return Err(TrangerError::Config(format!(
                "database name must not contain '/': {}",
                self.database
            )));
        }
        if self.filename_mask.is_empty() {
            return Err(TrangerError::Config("filename mask is empty".to_string()));
        }
        Ok(())
    }

    /// Directory of this database
    pub fn database_dir(&self) -> PathBuf {
        self.path.join(&self.database)
    }

    pub fn is_master(&self) -> bool {
        self.master == AccessMode::Master
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the root directory
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the database name
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.config.database = name.into();
        self
    }

    /// Set the content filename mask
    pub fn filename_mask(mut self, mask: impl Into<String>) -> Self {
        self.config.filename_mask = mask.into();
        self
    }

    /// Set the directory mode
    pub fn xpermission(mut self, mode: u32) -> Self {
        self.config.xpermission = mode;
        self
    }

    /// Set the file mode
    pub fn rpermission(mut self, mode: u32) -> Self {
        self.config.rpermission = mode;
        self
    }

    /// Open as writer (`true`) or reader (`false`)
    pub fn master(mut self, master: bool) -> Self {
        self.config.master = if master {
            AccessMode::Master
        } else {
            AccessMode::ReadOnly
        };
        self
    }

    /// Set the critical error policy
    pub fn on_critical_error(mut self, policy: CriticalErrorPolicy) -> Self {
        self.config.on_critical_error = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

//! Error types for settings resolution and process execution.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a run before any test process is spawned.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A settings document is not valid JSON.
    #[error("error parsing settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A settings document parsed but is not a JSON object.
    #[error("settings file {0} does not contain a JSON object")]
    NotAnObject(PathBuf),

    /// A setting is valid JSON but has the wrong type (e.g. a fractional `dir-order`).
    #[error("invalid setting in {path}: {source}")]
    InvalidSetting {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The `files` setting of a directory is not an object.
    #[error("files setting is not an object for {0}")]
    FilesNotObject(PathBuf),

    /// A `src` redirect points back at a directory already on the chain.
    #[error("src redirect cycle detected at {0}")]
    RedirectCycle(PathBuf),

    /// A `src` redirect points at something that is not a directory.
    #[error("src redirect target is not a directory: {0}")]
    MissingDirectory(PathBuf),

    /// Filesystem error while reading settings or listing directories.
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Stable identifier recorded in the run log.
    pub fn id(&self) -> &'static str {
        match self {
            ConfigError::Parse { .. } => "testmin.dir.json-parse-error",
            ConfigError::NotAnObject(_) => "testmin.dir.json-not-object",
            ConfigError::InvalidSetting { .. } => "testmin.dir.json-invalid-setting",
            ConfigError::FilesNotObject(_) => "testmin.dir.json-files-not-object",
            ConfigError::RedirectCycle(_) => "testmin.dir.json-src-cycle",
            ConfigError::MissingDirectory(_) => "testmin.dir.json-src-missing",
            ConfigError::Io { .. } => "testmin.dir-io-error",
        }
    }
}

/// Errors from spawning or waiting on a test process.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting on {path}: {source}")]
    Wait {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors loading the global configuration file.
#[derive(Error, Debug)]
pub enum GlobalConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Result type for settings resolution.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type for process execution.
pub type RunnerResult<T> = std::result::Result<T, RunnerError>;

//! Global configuration (`testmin.config.json`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GlobalConfigError;

/// Name of the global configuration file, looked up in the test root.
pub const GLOBAL_CONFIG_FILE: &str = "testmin.config.json";

/// Environment variable overriding the default per-file timeout.
pub const TIMEOUT_ENV: &str = "TESTMIN_TIMEOUT";

/// Default per-file timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Global settings shared by every directory in a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Default timeout in seconds for files that do not set one (0 = no timeout).
    pub timeout: u64,

    /// Project identifier copied into the run log.
    pub project: Option<String>,

    /// Report submission settings.
    pub submit: SubmitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_SECS,
            project: None,
            submit: SubmitConfig::default(),
        }
    }
}

/// Whether and where to submit run logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct SubmitConfig {
    /// Submission is only attempted when this is set.
    pub request: bool,

    pub site: SiteConfig,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            request: false,
            site: SiteConfig::default(),
        }
    }
}

/// Remote collector endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct SiteConfig {
    pub root: String,
    pub submit: String,
    pub project: String,
    pub entry: String,
    pub title: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            root: "https://testmin.idocs.com".to_string(),
            submit: "/submit".to_string(),
            project: "/project".to_string(),
            entry: "/entry".to_string(),
            title: "Idocs Testmin".to_string(),
        }
    }
}

impl SiteConfig {
    /// URL the run log is posted to.
    pub fn submit_url(&self) -> String {
        format!("{}{}", self.root, self.submit)
    }

    /// URL of a submitted entry.
    pub fn entry_url(&self, id: &str) -> String {
        format!("{}{}?id={}", self.root, self.entry, id)
    }

    /// URL of a project's results.
    pub fn project_url(&self, project: &str) -> String {
        format!("{}{}?id={}", self.root, self.project, project)
    }
}

impl Config {
    /// Load `testmin.config.json` from `root` if it exists, then apply
    /// environment overrides.
    ///
    /// Fields missing from the file keep their defaults; nested sections
    /// are merged field by field.
    pub fn load(root: &Path) -> Result<Self, GlobalConfigError> {
        let path = root.join(GLOBAL_CONFIG_FILE);
        let mut config = if path.is_file() {
            let raw = std::fs::read_to_string(&path).map_err(|source| GlobalConfigError::Read {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| GlobalConfigError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            Config::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), GlobalConfigError> {
        if let Ok(value) = std::env::var(TIMEOUT_ENV) {
            self.timeout = value
                .trim()
                .parse()
                .map_err(|_| GlobalConfigError::InvalidEnv {
                    var: TIMEOUT_ENV,
                    value,
                })?;
        }
        Ok(())
    }
}

//! Run log: the hierarchical report of one engine invocation.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ConfigError;

/// Result of running one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Outcome {
    /// 1-based position within the directory.
    pub file_order: usize,

    pub success: bool,

    /// Wall-clock seconds.
    pub run_time: f64,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,

    /// Kept only on failure or when the file asks for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,

    /// Result payload without `testmin-success` and `env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

/// Log of one directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DirectoryLog {
    /// 1-based position in the run.
    pub dir_order: usize,

    pub run_time: f64,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,

    /// Outcomes of the files that ran, in run order.
    pub files: IndexMap<String, Outcome>,
}

impl DirectoryLog {
    /// Conjunction of the outcomes of the files that ran.
    pub fn success(&self) -> bool {
        self.files.values().all(|outcome| outcome.success)
    }
}

/// Tool and platform versions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct SysInfo {
    pub testmin: String,
    pub os: OsInfo,
    pub runtime: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct OsInfo {
    pub name: String,
    pub arch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl SysInfo {
    /// Collect version information for the current host.
    pub fn collect() -> Self {
        Self {
            testmin: crate::VERSION.to_string(),
            os: OsInfo {
                name: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
                release: uname("-r"),
                version: uname("-v"),
            },
            runtime: "rust".to_string(),
        }
    }
}

fn uname(flag: &str) -> Option<String> {
    std::process::Command::new("uname")
        .arg(flag)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// A configuration error recorded in the run log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct LoggedError {
    pub id: String,
    pub message: String,
}

impl From<&ConfigError> for LoggedError {
    fn from(err: &ConfigError) -> Self {
        Self {
            id: err.id().to_string(),
            message: err.to_string(),
        }
    }
}

/// The complete report of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RunLog {
    /// Random run token, also exported to tests as `testmin_test_id`.
    pub id: String,

    pub success: bool,

    pub timestamp: DateTime<Utc>,

    pub sys_info: SysInfo,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Directories that were attempted, in run order.
    pub dirs: IndexMap<String, DirectoryLog>,

    /// Total wall-clock seconds.
    pub run_time: f64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LoggedError>,

    /// Filled by the submission layer only.
    pub private: Map<String, Value>,
}

impl RunLog {
    /// Fresh log with a new id.
    pub fn new(project: Option<String>) -> Self {
        Self {
            id: new_run_id(),
            success: true,
            timestamp: Utc::now(),
            sys_info: SysInfo::collect(),
            project,
            dirs: IndexMap::new(),
            run_time: 0.0,
            errors: Vec::new(),
            private: Map::new(),
        }
    }

    /// Number of files that ran.
    pub fn files_run(&self) -> usize {
        self.dirs.values().map(|dir| dir.files.len()).sum()
    }

    /// Failing outcomes as `(directory key, file name, outcome)`.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str, &Outcome)> {
        self.dirs.iter().flat_map(|(dir, log)| {
            log.files
                .iter()
                .filter(|(_, outcome)| !outcome.success)
                .map(move |(file, outcome)| (dir.as_str(), file.as_str(), outcome))
        })
    }
}

/// Random run token.
pub fn new_run_id() -> String {
    Uuid::new_v4().simple().to_string()
}

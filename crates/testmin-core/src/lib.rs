//! Testmin - a minimalist test harness
//!
//! Any executable is a test:
//! - Resolves per-directory settings (`testmin.dir.json`), following `src` redirects
//! - Discovers executables that the settings do not list
//! - Runs every file as its own process, strictly in order, under a timeout
//! - Reads the verdict from the last line of each process's stdout
//! - Stops at the first failure and returns a hierarchical run log

pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod log;
pub mod obs;
pub mod protocol;
pub mod runner;
pub mod scanner;
pub mod settings;
pub mod telemetry;

/// Harness version, exported to tests as `TESTMIN`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export key types
pub use config::{Config, SiteConfig, SubmitConfig};
pub use engine::{Engine, EngineObserver, EngineOptions, FailFast, NoopObserver, UnitState};
pub use env::EnvContext;
pub use error::{ConfigError, GlobalConfigError, RunnerError};
pub use log::{DirectoryLog, Outcome, RunLog, SysInfo};
pub use protocol::{ResultLine, Verdict};
pub use runner::{FileRunner, Invocation, ProcessRunner, RawRun};
pub use scanner::DirectoryScanner;
pub use settings::{
    DirectorySettings, FileEntry, FileSettings, FileSpec, RunDirectory, SettingsResolver,
};
pub use telemetry::init_tracing;

//! Run orchestration and aggregation.
//!
//! Directories run in resolved order, files in directory order, one
//! process at a time. The first failing file ends its directory and the
//! first failing directory ends the run; nothing after it is attempted or
//! logged. Variables exported by a test are visible to every test that
//! runs after it.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn};

use crate::config::Config;
use crate::env::EnvContext;
use crate::error::ConfigResult;
use crate::log::{DirectoryLog, LoggedError, Outcome, RunLog};
use crate::obs;
use crate::protocol;
use crate::runner::{FileRunner, Invocation, ProcessRunner};
use crate::scanner::DirectoryScanner;
use crate::settings::{FileSpec, RunDirectory, SettingsResolver};

/// Lifecycle of a directory or file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl UnitState {
    fn from_success(success: bool) -> Self {
        if success {
            UnitState::Succeeded
        } else {
            UnitState::Failed
        }
    }
}

/// Short-circuiting fold over an ordered sequence.
///
/// Items are pushed with their verdict; after the first failing item is
/// pushed, [`FailFast::push`] returns `Break` and the caller stops. The
/// collected items are the prefix that was actually produced.
#[derive(Debug)]
pub struct FailFast<T> {
    items: Vec<T>,
    failed: bool,
}

impl<T> Default for FailFast<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            failed: false,
        }
    }
}

impl<T> FailFast<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an item. Returns `Break` once the sequence has failed.
    pub fn push(&mut self, item: T, success: bool) -> ControlFlow<()> {
        debug_assert!(!self.failed, "push after failure");
        self.items.push(item);
        if success {
            ControlFlow::Continue(())
        } else {
            self.failed = true;
            ControlFlow::Break(())
        }
    }

    /// True unless a failing item was pushed.
    pub fn success(&self) -> bool {
        !self.failed
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

/// Progress callbacks for display layers.
///
/// All methods default to doing nothing.
#[allow(unused_variables)]
pub trait EngineObserver: Send + Sync {
    /// Directories resolved and scanned; every one is pending.
    fn run_planned(&self, dirs: &[RunDirectory]) {}

    /// Settings resolution failed; nothing will run.
    fn resolution_failed(&self, error: &crate::error::ConfigError) {}

    fn dir_started(&self, dir: &RunDirectory, position: usize) {}

    /// The directory lists nothing runnable.
    fn no_files(&self, dir: &RunDirectory) {}

    fn dir_finished(&self, dir: &RunDirectory, log: &DirectoryLog, state: UnitState) {}

    fn file_started(&self, dir: &RunDirectory, file: &FileSpec) {}

    fn file_finished(&self, dir: &RunDirectory, file: &FileSpec, outcome: &Outcome) {}

    fn run_finished(&self, log: &RunLog) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {}

/// Engine settings taken from the global configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Timeout for files that do not set their own (0 = none).
    pub default_timeout: u64,

    /// Project id copied into the log.
    pub project: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            default_timeout: config.timeout,
            project: config.project.clone(),
        }
    }
}

/// Discovers, orders and runs the tests under a root directory.
pub struct Engine<R = ProcessRunner> {
    root: PathBuf,
    options: EngineOptions,
    runner: R,
    scanner: DirectoryScanner,
    observer: Box<dyn EngineObserver>,
}

impl Engine<ProcessRunner> {
    /// Engine that runs files as child processes.
    pub fn new(root: impl Into<PathBuf>, options: EngineOptions) -> Self {
        Self::with_runner(root, options, ProcessRunner::new())
    }
}

impl<R: FileRunner> Engine<R> {
    /// Engine with a custom file runner.
    pub fn with_runner(root: impl Into<PathBuf>, options: EngineOptions, runner: R) -> Self {
        Self {
            root: root.into(),
            options,
            runner,
            scanner: DirectoryScanner::new(),
            observer: Box::new(NoopObserver),
        }
    }

    pub fn with_scanner(mut self, scanner: DirectoryScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_observer(mut self, observer: impl EngineObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve directories and complete their file lists.
    pub fn plan(&self) -> ConfigResult<Vec<RunDirectory>> {
        let mut dirs = SettingsResolver::new(&self.root)?.resolve()?;
        for dir in &mut dirs {
            self.scanner.scan(dir);
        }
        Ok(dirs)
    }

    /// Run every test and return the log.
    ///
    /// Never fails: configuration errors are recorded in the log with
    /// `success: false` and no directories.
    pub async fn run(&self) -> RunLog {
        let mut log = RunLog::new(self.options.project.clone());
        let _span = obs::RunSpan::enter(&log.id);
        obs::emit_run_started(&log.id, &self.root.display().to_string());
        let start = Instant::now();

        let dirs = match self.plan() {
            Ok(dirs) => dirs,
            Err(err) => {
                obs::emit_resolution_failed(&err);
                self.observer.resolution_failed(&err);
                log.errors.push(LoggedError::from(&err));
                log.success = false;
                log.run_time = start.elapsed().as_secs_f64();
                self.observer.run_finished(&log);
                return log;
            }
        };
        obs::emit_run_planned(dirs.len());
        self.observer.run_planned(&dirs);

        // Only this engine writes to the context, and only between processes.
        let mut env = EnvContext::for_run(&log.id);

        let mut fold = FailFast::new();
        for (index, dir) in dirs.iter().enumerate() {
            let dir_log = self.run_dir(dir, index + 1, &mut env).await;
            let success = dir_log.success();
            if fold.push((dir.key.clone(), dir_log), success).is_break() {
                break;
            }
        }

        log.success = fold.success();
        log.dirs = fold.into_items().into_iter().collect();
        log.run_time = start.elapsed().as_secs_f64();

        obs::emit_run_finished(
            &log.id,
            start.elapsed().as_millis() as u64,
            log.files_run(),
            log.success,
        );
        self.observer.run_finished(&log);
        log
    }

    async fn run_dir(
        &self,
        dir: &RunDirectory,
        position: usize,
        env: &mut EnvContext,
    ) -> DirectoryLog {
        obs::emit_dir_started(&dir.key, position);
        self.observer.dir_started(dir, position);
        let mut dir_log = DirectoryLog {
            dir_order: position,
            ..Default::default()
        };

        if dir.skip {
            info!(dir = %dir.key, "skipping directory");
            dir_log.skipped = true;
            obs::emit_dir_finished(&dir.key, UnitState::Skipped, 0, 0.0);
            self.observer.dir_finished(dir, &dir_log, UnitState::Skipped);
            return dir_log;
        }

        let start = Instant::now();
        let files = dir.file_specs(self.options.default_timeout);
        if files.is_empty() {
            self.observer.no_files(dir);
        }

        let mut fold = FailFast::new();
        for file in &files {
            let outcome = self.run_file(dir, file, env).await;
            let success = outcome.success;
            if fold.push((file.name.clone(), outcome), success).is_break() {
                break;
            }
        }

        dir_log.files = fold.into_items().into_iter().collect();
        dir_log.run_time = start.elapsed().as_secs_f64();

        let state = UnitState::from_success(dir_log.success());
        obs::emit_dir_finished(&dir.key, state, dir_log.files.len(), dir_log.run_time);
        self.observer.dir_finished(dir, &dir_log, state);
        dir_log
    }

    async fn run_file(
        &self,
        dir: &RunDirectory,
        file: &FileSpec,
        env: &mut EnvContext,
    ) -> Outcome {
        obs::emit_file_started(&dir.key, &file.name);
        self.observer.file_started(dir, file);
        let start = Instant::now();
        let mut outcome = Outcome {
            file_order: file.order,
            ..Default::default()
        };

        let invocation = Invocation {
            file,
            working_dir: &dir.path,
            env: &*env,
        };
        let (stdout, stderr) = match self.runner.run(invocation).await {
            Ok(raw) => {
                outcome.timed_out = raw.timed_out;
                if raw.completed {
                    let verdict = protocol::decode(&raw.stdout);
                    outcome.success = verdict.passed();
                    if !verdict.details.is_empty() {
                        outcome.details = Some(verdict.details);
                    }
                    if !verdict.env.is_empty() {
                        let keys: Vec<&str> = verdict.env.keys().map(String::as_str).collect();
                        obs::emit_env_exported(&file.name, &keys);
                        env.merge(verdict.env);
                    }
                }
                (raw.stdout, raw.stderr)
            }
            Err(err) => {
                warn!(dir = %dir.key, file = %file.name, error = %err, "test could not be run");
                (String::new(), err.to_string())
            }
        };
        outcome.run_time = start.elapsed().as_secs_f64();

        if !outcome.success || file.save_output {
            outcome.stdout = Some(stdout);
            outcome.stderr = Some(stderr);
        }

        obs::emit_file_finished(
            &dir.key,
            &file.name,
            UnitState::from_success(outcome.success),
            outcome.timed_out,
            outcome.run_time,
        );
        self.observer.file_finished(dir, file, &outcome);
        outcome
    }
}

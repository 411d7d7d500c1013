//! Human-readable progress output for `--output normal`.

use std::sync::atomic::{AtomicBool, Ordering};

use testmin_core::{
    ConfigError, DirectoryLog, EngineObserver, FileSpec, Outcome, RunDirectory, RunLog, UnitState,
};

/// Width of horizontal rules.
pub const HR_LENGTH: usize = 100;

/// A horizontal rule, optionally with a title set into it.
pub fn hr(title: &str, dash: char) -> String {
    if title.is_empty() {
        return dash.to_string().repeat(HR_LENGTH);
    }
    let tail = HR_LENGTH.saturating_sub(5 + title.chars().count());
    format!(
        "{} {} {}",
        dash.to_string().repeat(3),
        title,
        dash.to_string().repeat(tail)
    )
}

/// Block shown after a failing file: its stdout and stderr between rules.
pub fn failure_block(outcome: &Outcome) -> String {
    let mut lines = vec![
        String::new(),
        hr("failure", '*'),
        hr("stdout", '-'),
        outcome.stdout.clone().unwrap_or_default(),
        hr("stderr", '-'),
        outcome.stderr.clone().unwrap_or_default(),
        hr("", '*'),
    ];
    if outcome.timed_out {
        lines.insert(2, "timed out".to_string());
    }
    lines.join("\n")
}

/// Final banner.
pub fn summary(log: &RunLog) -> String {
    let message = if log.success {
        "All tests run successfully"
    } else {
        "There were some errors in the tests"
    };
    [hr("finished testing", '='), message.to_string(), hr("", '=')].join("\n")
}

/// Prints progress to stdout as the engine reports it.
pub struct ConsoleObserver {
    dir_rules: AtomicBool,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self {
            dir_rules: AtomicBool::new(true),
        }
    }
}

impl Default for ConsoleObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineObserver for ConsoleObserver {
    fn run_planned(&self, dirs: &[RunDirectory]) {
        // A lone root directory gets no heading.
        if dirs.len() == 1 {
            self.dir_rules.store(false, Ordering::Relaxed);
        }
        println!("Running tests");
    }

    fn resolution_failed(&self, error: &ConfigError) {
        println!("error: {error}");
    }

    fn dir_started(&self, dir: &RunDirectory, _position: usize) {
        if self.dir_rules.load(Ordering::Relaxed) {
            println!("{}", hr(&dir.title, '='));
        }
    }

    fn no_files(&self, _dir: &RunDirectory) {
        println!("no files to run");
    }

    fn dir_finished(&self, _dir: &RunDirectory, _log: &DirectoryLog, state: UnitState) {
        if state == UnitState::Skipped {
            println!("*** skipping ***\n");
        } else {
            println!();
        }
    }

    fn file_started(&self, _dir: &RunDirectory, file: &FileSpec) {
        println!("{}", file.name);
    }

    fn file_finished(&self, _dir: &RunDirectory, _file: &FileSpec, outcome: &Outcome) {
        if !outcome.success {
            println!("{}\n", failure_block(outcome));
        }
    }

    fn run_finished(&self, log: &RunLog) {
        println!();
        println!("{}", summary(log));
        println!();
    }
}

//! Testmin - run every executable under a directory as a test
//!
//! The `testmin` command resolves the test tree under ROOT, runs each file
//! in order, stops at the first failure and reports the result.
//!
//! ## Output modes
//!
//! - `normal`: progress, failure output and a summary banner
//! - `silent`: nothing; the exit status carries the result
//! - `json`: the run log as a single JSON document

mod display;
mod submit;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use testmin_core::{Config, Engine, EngineOptions, RunLog};
use tracing::{debug, Level};

use crate::display::ConsoleObserver;
use crate::submit::{Submission, Submitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    Normal,
    Silent,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "testmin")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Minimalist test harness: every executable is a test", long_about = None)]
struct Cli {
    /// Directory holding the tests
    #[arg(default_value = ".")]
    root: PathBuf,

    /// What to print
    #[arg(short, long, value_enum, default_value_t = OutputMode::Normal)]
    output: OutputMode,

    /// Submit results without asking (needs submission enabled in testmin.config.json)
    #[arg(long, overrides_with = "no_submit")]
    submit: bool,

    /// Never submit results
    #[arg(long, overrides_with = "submit")]
    no_submit: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn submit_flag(&self) -> Option<bool> {
        match (self.submit, self.no_submit) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// Whether to submit without asking. `None` means ask.
fn submit_decision(requested: bool, flag: Option<bool>, output: OutputMode) -> Option<bool> {
    if !requested {
        return Some(false);
    }
    if flag.is_some() {
        return flag;
    }
    // Nobody is watching in silent and json modes.
    match output {
        OutputMode::Normal => None,
        OutputMode::Silent | OutputMode::Json => Some(true),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    testmin_core::init_tracing(cli.log_json, level);

    let config = Config::load(&cli.root).context("Failed to load testmin.config.json")?;
    debug!(?config, "loaded configuration");

    let mut engine = Engine::new(&cli.root, EngineOptions::from(&config));
    if cli.output == OutputMode::Normal {
        engine = engine.with_observer(ConsoleObserver::new());
    }
    let log = engine.run().await;

    match submit_decision(config.submit.request, cli.submit_flag(), cli.output) {
        Some(false) => {}
        Some(true) => cmd_submit(&config, &log, cli.output).await?,
        None => {
            let prompt = submit::consent_prompt(&config.submit.site);
            let stdin = std::io::stdin();
            if submit::ask_yes_no(&prompt, &mut stdin.lock(), &mut std::io::stdout())? {
                cmd_submit(&config, &log, cli.output).await?;
            }
        }
    }

    if cli.output == OutputMode::Json {
        println!("{}", serde_json::to_string(&log)?);
    }

    Ok(if log.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Submit the log and report where it landed.
async fn cmd_submit(config: &Config, log: &RunLog, output: OutputMode) -> Result<()> {
    let submitter = Submitter::new(config.submit.site.clone())?;
    let loud = output == OutputMode::Normal;
    if loud {
        println!("\nsubmitting...");
    }

    match submitter.submit(log).await? {
        Submission::Accepted {
            entry_url,
            project_url,
        } => {
            if loud {
                println!(" done\n");
                println!("test results:    {}", entry_url);
                if let Some(url) = project_url {
                    println!("project results: {}", url);
                }
            }
        }
        Submission::Rejected { errors } => {
            eprintln!(
                "Submission of test results failed. Errors: {}",
                errors.join(", ")
            );
        }
    }
    Ok(())
}

//! Posting run logs to a results collector.

use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use testmin_core::{RunLog, SiteConfig};
use tracing::{debug, info};

/// Form field carrying the serialized run log.
pub const FORM_FIELD: &str = "test-results";

/// What the collector made of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Accepted {
        entry_url: String,
        project_url: Option<String>,
    },
    Rejected {
        errors: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
struct CollectorResponse {
    success: bool,
    #[serde(default)]
    errors: Vec<CollectorError>,
}

#[derive(Debug, Deserialize)]
struct CollectorError {
    id: String,
}

/// Client for the collector described by a [`SiteConfig`].
pub struct Submitter {
    site: SiteConfig,
    http_client: reqwest::Client,
}

impl Submitter {
    pub fn new(site: SiteConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("testmin/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { site, http_client })
    }

    /// Post `log` as a urlencoded form.
    pub async fn submit(&self, log: &RunLog) -> Result<Submission> {
        let url = self.site.submit_url();
        let body = serde_json::to_string(log).context("Failed to serialize run log")?;
        info!(url = %url, run_id = %log.id, "submitting run log");

        let response = self
            .http_client
            .post(&url)
            .form(&[(FORM_FIELD, body)])
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Submission to {url} failed with HTTP status {status}");
        }

        let reply: CollectorResponse = response
            .json()
            .await
            .context("Collector returned an unreadable response")?;
        debug!(success = reply.success, "collector replied");

        Ok(interpret(&self.site, log, reply))
    }
}

fn interpret(site: &SiteConfig, log: &RunLog, reply: CollectorResponse) -> Submission {
    if reply.success {
        Submission::Accepted {
            entry_url: site.entry_url(&log.id),
            project_url: log.project.as_deref().map(|p| site.project_url(p)),
        }
    } else {
        Submission::Rejected {
            errors: reply.errors.into_iter().map(|e| e.id).collect(),
        }
    }
}

/// Text asking whether results may leave the machine.
pub fn consent_prompt(site: &SiteConfig) -> String {
    format!(
        "May this script submit these test results to {title}?\n\
         The results will be submitted to the {title} service where they will be\n\
         publicly available. In addition to the test results, the only information\n\
         about your system will be the operating system and version, and the\n\
         version of Testmin.\n",
        title = site.title
    )
}

/// Ask a yes/no question until the answer starts with `y` or `n`.
///
/// End of input counts as no.
pub fn ask_yes_no(prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> Result<bool> {
    write!(output, "{prompt}")?;
    loop {
        write!(output, "[Yes|No] ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }
        match line.trim_start().chars().next().map(|c| c.to_ascii_lowercase()) {
            Some('y') => return Ok(true),
            Some('n') => return Ok(false),
            _ => continue,
        }
    }
}

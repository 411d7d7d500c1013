//! Result line protocol.
//!
//! A test process reports its outcome by printing, as the last non-blank
//! line of its standard output, a single-line JSON object:
//!
//! ```text
//! {"testmin-success": true, "env": {"TOKEN": "abc"}, "anything": "else"}
//! ```
//!
//! Everything before that line is free-form. `testmin-success` is the
//! verdict, `env` is exported to later tests, and the remaining fields are
//! kept as details in the run log.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::warn;

/// Key carrying the pass/fail verdict.
pub const SUCCESS_KEY: &str = "testmin-success";

/// Key carrying environment variables for later tests.
pub const ENV_KEY: &str = "env";

/// Detail listing `env` names that cannot be exported.
pub const INVALID_ENV_KEY: &str = "invalid-env";

/// Decoded result line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    /// `Some` only when `testmin-success` was present and boolean.
    pub success: Option<bool>,

    /// Variables to export, converted to text.
    pub env: IndexMap<String, String>,

    /// Remaining payload fields.
    pub details: Map<String, Value>,
}

impl Verdict {
    /// Whether the verdict counts as a pass.
    pub fn passed(&self) -> bool {
        self.success == Some(true)
    }
}

/// Last line of `stdout` containing a non-whitespace character.
pub fn last_line(stdout: &str) -> Option<&str> {
    stdout
        .split(['\n', '\r'])
        .rev()
        .find(|line| !line.trim().is_empty())
}

/// Parse the result object from the last non-blank line of `stdout`.
///
/// Returns `None` when the line is not brace-delimited, is not valid JSON,
/// or is not a JSON object.
pub fn parse_results(stdout: &str) -> Option<Map<String, Value>> {
    let line = last_line(stdout)?;
    let trimmed = line.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Decode captured stdout into a [`Verdict`].
///
/// A missing or malformed result line yields a verdict with no success
/// flag and empty details.
pub fn decode(stdout: &str) -> Verdict {
    let Some(mut payload) = parse_results(stdout) else {
        return Verdict::default();
    };

    let success = match payload.shift_remove(SUCCESS_KEY) {
        Some(Value::Bool(flag)) => Some(flag),
        _ => None,
    };

    let mut rejected = Vec::new();
    let env = match payload.shift_remove(ENV_KEY) {
        Some(Value::Object(vars)) => vars
            .into_iter()
            .filter_map(|(key, value)| {
                let value = env_text(value);
                if exportable(&key, &value) {
                    Some((key, value))
                } else {
                    warn!(key = ?key, "rejecting env entry that cannot be exported");
                    rejected.push(Value::String(key));
                    None
                }
            })
            .collect(),
        Some(other) => {
            // Not a mapping, so it is ordinary detail.
            payload.insert(ENV_KEY.to_string(), other);
            IndexMap::new()
        }
        None => IndexMap::new(),
    };

    // The exporting test is at fault, not the next one to spawn.
    let success = if rejected.is_empty() {
        success
    } else {
        payload.insert(INVALID_ENV_KEY.to_string(), Value::Array(rejected));
        Some(false)
    };

    Verdict {
        success,
        env,
        details: payload,
    }
}

/// Whether a pair can be placed in a child's environment.
fn exportable(key: &str, value: &str) -> bool {
    !key.is_empty() && !key.contains(['=', '\0']) && !value.contains('\0')
}

fn env_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Builder for result lines, for tests written in Rust.
///
/// ```
/// use testmin_core::protocol::ResultLine;
///
/// let line = ResultLine::success().env("PORT", "8080").detail("checked", 3).render();
/// assert_eq!(line, r#"{"testmin-success":true,"env":{"PORT":"8080"},"checked":3}"#);
/// ```
#[derive(Debug, Clone)]
pub struct ResultLine {
    success: bool,
    env: Map<String, Value>,
    details: Map<String, Value>,
}

impl ResultLine {
    pub fn success() -> Self {
        Self::new(true)
    }

    pub fn failure() -> Self {
        Self::new(false)
    }

    fn new(success: bool) -> Self {
        Self {
            success,
            env: Map::new(),
            details: Map::new(),
        }
    }

    /// Export a variable to tests that run later.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), Value::String(value.into()));
        self
    }

    /// Attach an extra field to the logged details.
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Render as a single-line JSON object.
    pub fn render(&self) -> String {
        let mut object = Map::new();
        object.insert(SUCCESS_KEY.to_string(), Value::Bool(self.success));
        if !self.env.is_empty() {
            object.insert(ENV_KEY.to_string(), Value::Object(self.env.clone()));
        }
        for (key, value) in &self.details {
            if key != SUCCESS_KEY && key != ENV_KEY {
                object.insert(key.clone(), value.clone());
            }
        }
        Value::Object(object).to_string()
    }

    /// Print the result line and exit the process with status 0.
    pub fn done(&self) -> ! {
        println!("{}", self.render());
        std::process::exit(0)
    }
}

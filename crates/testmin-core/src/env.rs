//! Environment handed from the engine to each spawned test.
//!
//! The engine owns this context and only writes to it between processes:
//! after a test exits, the `env` block of its result line is merged in, and
//! every later spawn inherits the parent environment overlaid with it.

use indexmap::IndexMap;

/// Variable carrying the run-scoped correlation id.
pub const TEST_ID_VAR: &str = "testmin_test_id";

/// Variable carrying the harness version.
pub const VERSION_VAR: &str = "TESTMIN";

/// Ordered key/value overlay applied to child processes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvContext {
    vars: IndexMap<String, String>,
}

impl EnvContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context seeded with the run id and harness version.
    pub fn for_run(run_id: &str) -> Self {
        let mut ctx = Self::new();
        ctx.set(VERSION_VAR, crate::VERSION);
        ctx.set(TEST_ID_VAR, run_id);
        ctx
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Merge variables exported by a finished test. Later values win.
    pub fn merge(&mut self, exported: IndexMap<String, String>) {
        self.vars.extend(exported);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_run_seeds_id_and_version() {
        let ctx = EnvContext::for_run("abc123");
        assert_eq!(ctx.get(TEST_ID_VAR), Some("abc123"));
        assert_eq!(ctx.get(VERSION_VAR), Some(crate::VERSION));
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_merge_overwrites_existing_keys() {
        let mut ctx = EnvContext::new();
        ctx.set("TOKEN", "old");

        let mut exported = IndexMap::new();
        exported.insert("TOKEN".to_string(), "new".to_string());
        exported.insert("PORT".to_string(), "9000".to_string());
        ctx.merge(exported);

        assert_eq!(ctx.get("TOKEN"), Some("new"));
        assert_eq!(ctx.get("PORT"), Some("9000"));
        let keys: Vec<_> = ctx.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["TOKEN", "PORT"]);
    }
}

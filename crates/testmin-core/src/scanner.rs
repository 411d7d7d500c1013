//! Completes a directory's file list from what is on disk.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::settings::{FileEntry, RunDirectory};

/// Prefix for files that are never auto-discovered.
pub const DEV_PREFIX: &str = "dev.";

/// Prunes and extends directory file lists.
#[derive(Debug, Clone, Default)]
pub struct DirectoryScanner {
    /// Canonical path of the running harness, never treated as a test.
    self_exe: Option<PathBuf>,
}

impl DirectoryScanner {
    /// Scanner that excludes the currently running executable.
    pub fn new() -> Self {
        let self_exe = std::env::current_exe()
            .and_then(|exe| exe.canonicalize())
            .ok();
        Self { self_exe }
    }

    /// Scanner that excludes `exe` instead of the current executable.
    pub fn excluding(exe: impl AsRef<Path>) -> Self {
        Self {
            self_exe: exe.as_ref().canonicalize().ok(),
        }
    }

    /// Drop declared files that no longer exist and append undeclared
    /// executables in name order.
    ///
    /// Never fails: listing errors are logged and leave the declared list
    /// as it is.
    pub fn scan(&self, dir: &mut RunDirectory) {
        let files = &mut dir.settings.files;
        files.retain(|name, _| {
            let exists = dir.path.join(name).exists();
            if !exists {
                debug!(dir = %dir.key, file = %name, "declared file missing, dropping");
            }
            exists
        });

        let entries = match std::fs::read_dir(&dir.path) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.key, error = %err, "failed to list directory");
                return;
            }
        };

        let mut discovered: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                self.is_candidate(&name, &entry.path()).then_some(name)
            })
            .filter(|name| !files.contains_key(name))
            .collect();
        discovered.sort();

        for name in discovered {
            debug!(dir = %dir.key, file = %name, "auto-discovered test file");
            files.insert(name, FileEntry::Default);
        }
    }

    fn is_candidate(&self, name: &str, path: &Path) -> bool {
        if name.starts_with('.') || name.starts_with(DEV_PREFIX) {
            return false;
        }
        // Follows symlinks.
        if !path.is_file() || !is_executable(path) {
            return false;
        }
        match (&self.self_exe, path.canonicalize()) {
            (Some(exe), Ok(real)) => &real != exe,
            _ => true,
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

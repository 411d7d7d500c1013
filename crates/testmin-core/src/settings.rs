//! Per-directory settings (`testmin.dir.json`) and directory resolution.
//!
//! The root directory is always part of a run. Each immediate subdirectory
//! is added too; a directory whose settings name a `src` directory is
//! replaced by that directory, keeping only its own `dir-order`. The result
//! is stably sorted by order.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Name of the per-directory settings file.
pub const DIR_SETTINGS_FILE: &str = "testmin.dir.json";

/// Order given to directories that do not declare one.
pub const DEFAULT_DIR_ORDER: i64 = 1_000_000;

/// Order given to the root directory when it does not declare one.
pub const ROOT_DIR_ORDER: i64 = -1;

/// Title shown for the root directory.
pub const ROOT_TITLE: &str = "[root directory]";

/// Settings for a single file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSettings {
    /// Timeout in seconds; falls back to the global default when unset.
    pub timeout: Option<u64>,

    /// Keep stdout/stderr in the log even when the file passes.
    pub save_output: bool,
}

impl FileSettings {
    fn from_object(object: &serde_json::Map<String, Value>) -> Self {
        Self {
            timeout: object.get("timeout").and_then(Value::as_u64),
            save_output: object
                .get("save-output")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

/// One entry of a directory's `files` mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEntry {
    /// `false`: never run this file.
    Excluded,

    /// Run with default settings (auto-discovered, `true`, or any
    /// non-object value).
    Default,

    /// Run with explicit settings.
    Configured(FileSettings),
}

impl FileEntry {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(false) => FileEntry::Excluded,
            Value::Object(object) => FileEntry::Configured(FileSettings::from_object(object)),
            _ => FileEntry::Default,
        }
    }

    /// Effective settings, or `None` for an excluded entry.
    pub fn settings(&self) -> Option<FileSettings> {
        match self {
            FileEntry::Excluded => None,
            FileEntry::Default => Some(FileSettings::default()),
            FileEntry::Configured(settings) => Some(settings.clone()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct RawDirectorySettings {
    src: Option<String>,
    dir_order: Option<i64>,
    title: Option<String>,
    skip: bool,
    files: Option<Value>,
}

/// Parsed contents of a `testmin.dir.json` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySettings {
    /// Directory whose settings replace these ones.
    pub src: Option<PathBuf>,

    pub dir_order: Option<i64>,

    pub title: Option<String>,

    /// Skip every file in the directory.
    pub skip: bool,

    /// Declared files in declared order.
    pub files: IndexMap<String, FileEntry>,
}

impl DirectorySettings {
    /// Read the settings document in `dir`, or defaults if there is none.
    pub fn load(dir: &Path) -> ConfigResult<Self> {
        let path = dir.join(DIR_SETTINGS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(&raw, &path)
    }

    /// Parse a settings document. `path` is only used in errors.
    pub fn parse(raw: &str, path: &Path) -> ConfigResult<Self> {
        let value: Value = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if !value.is_object() {
            return Err(ConfigError::NotAnObject(path.to_path_buf()));
        }

        let raw: RawDirectorySettings =
            serde_json::from_value(value).map_err(|source| ConfigError::InvalidSetting {
                path: path.to_path_buf(),
                source,
            })?;

        let files = match raw.files {
            None | Some(Value::Null) => IndexMap::new(),
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(name, entry)| (name.clone(), FileEntry::from_value(entry)))
                .collect(),
            Some(_) => return Err(ConfigError::FilesNotObject(path.to_path_buf())),
        };

        Ok(Self {
            src: raw.src.map(PathBuf::from),
            dir_order: raw.dir_order,
            title: raw.title,
            skip: raw.skip,
            files,
        })
    }
}

/// A directory scheduled for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    /// Directory the files run in.
    pub path: PathBuf,

    /// Key under which the directory is logged (`./` for the root).
    pub key: String,

    /// Display name.
    pub title: String,

    pub settings: DirectorySettings,

    /// Sort key.
    pub order: i64,

    pub skip: bool,
}

/// A file scheduled for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    /// Name relative to its directory.
    pub name: String,

    /// Full path of the executable.
    pub path: PathBuf,

    /// Timeout in seconds, 0 for none.
    pub timeout_secs: u64,

    pub save_output: bool,

    /// 1-based position within the directory's file list.
    pub order: usize,
}

impl RunDirectory {
    /// Files to run, in order, with the global default timeout applied.
    ///
    /// Excluded entries are left out but still occupy their position.
    pub fn file_specs(&self, default_timeout: u64) -> Vec<FileSpec> {
        self.settings
            .files
            .iter()
            .enumerate()
            .filter_map(|(index, (name, entry))| {
                let settings = entry.settings()?;
                Some(FileSpec {
                    name: name.clone(),
                    path: self.path.join(name),
                    timeout_secs: settings.timeout.unwrap_or(default_timeout),
                    save_output: settings.save_output,
                    order: index + 1,
                })
            })
            .collect()
    }

    /// Whether the settings list no runnable files.
    pub fn has_runnable_files(&self) -> bool {
        self.settings
            .files
            .values()
            .any(|entry| !matches!(entry, FileEntry::Excluded))
    }
}

/// Resolves the ordered set of directories under a test root.
#[derive(Debug, Clone)]
pub struct SettingsResolver {
    root: PathBuf,
}

impl SettingsResolver {
    /// Create a resolver for `root`.
    pub fn new(root: impl AsRef<Path>) -> ConfigResult<Self> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|source| ConfigError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the root and its immediate subdirectories into run order.
    pub fn resolve(&self) -> ConfigResult<Vec<RunDirectory>> {
        let mut dirs = Vec::new();

        let mut root_dir = self.resolve_dir(&self.root, None, &mut HashSet::new())?;
        if root_dir.settings.title.is_none() {
            root_dir.title = ROOT_TITLE.to_string();
        }
        dirs.push(root_dir);

        for candidate in self.subdirectories()? {
            let dir = self.resolve_dir(&candidate, None, &mut HashSet::new())?;
            dirs.push(dir);
        }

        // Stable: equal orders keep discovery order.
        dirs.sort_by_key(|dir| dir.order);
        Ok(dirs)
    }

    fn subdirectories(&self) -> ConfigResult<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| ConfigError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ConfigError::Io {
                path: self.root.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            // Follows symlinks, so linked directories count.
            if entry.path().is_dir() {
                names.push(name);
            }
        }
        names.sort();

        Ok(names.into_iter().map(|name| self.root.join(name)).collect())
    }

    fn resolve_dir(
        &self,
        path: &Path,
        order_override: Option<i64>,
        visited: &mut HashSet<PathBuf>,
    ) -> ConfigResult<RunDirectory> {
        if !path.is_dir() {
            return Err(ConfigError::MissingDirectory(path.to_path_buf()));
        }
        let canonical = path.canonicalize().map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if !visited.insert(canonical.clone()) {
            return Err(ConfigError::RedirectCycle(path.to_path_buf()));
        }

        let settings = DirectorySettings::load(path)?;

        if let Some(src) = &settings.src {
            let target = self.root.join(src);
            debug!(
                dir = %path.display(),
                src = %target.display(),
                "following src redirect"
            );
            return self.resolve_dir(&target, settings.dir_order, visited);
        }

        let order = order_override.or(settings.dir_order).unwrap_or(if canonical == self.root {
            ROOT_DIR_ORDER
        } else {
            DEFAULT_DIR_ORDER
        });

        let key = dir_key(&self.root, path);
        let title = settings.title.clone().unwrap_or_else(|| key.clone());
        let skip = settings.skip;

        Ok(RunDirectory {
            path: path.to_path_buf(),
            key,
            title,
            settings,
            order,
            skip,
        })
    }
}

/// Log key for `path`: `./` for the root, otherwise the path relative to
/// the root with `.` components dropped.
pub fn dir_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = relative
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();

    if parts.is_empty() {
        "./".to_string()
    } else {
        parts.join("/")
    }
}

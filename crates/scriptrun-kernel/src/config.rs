//! On-disk configuration: the JSON file that declares the script catalog.
//!
//! ```json
//! {
//!   "working_directory": ".",
//!   "interpreter": "bash",
//!   "scripts": {
//!     "hello": { "path": "./scripts/hello.sh", "timeout": 30 }
//!   }
//! }
//! ```
//!
//! Relative paths resolve against the directory holding the config file.
//! Unknown keys are ignored so older files keep loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::registry::{ScriptSource, Snapshot};
use crate::script::{DEFAULT_TIMEOUT_SECS, ScriptSpec};

/// Config file name looked up when none is given.
pub const DEFAULT_CONFIG_FILE: &str = ".mcp-config.json";

/// Interpreter used when the config does not name one.
pub const DEFAULT_INTERPRETER: &str = "bash";

/// Script referenced by the starter config, relative to the config directory.
const STARTER_SCRIPT_PATH: &str = "scripts/hello.sh";

const STARTER_SCRIPT: &str = "#!/bin/bash\necho \"Hello from scriptrun${1:+, $1}!\"\n";

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize config for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} already exists")]
    AlreadyExists { path: PathBuf },

    #[error("script name must not be empty")]
    EmptyName,

    #[error("script key '{key}' does not match its name '{name}'")]
    NameMismatch { key: String, name: String },

    #[error("script '{name}': path does not exist: {path}")]
    MissingScript { name: String, path: PathBuf },

    #[error("working directory does not exist: {path}")]
    MissingDirectory { path: PathBuf },

    #[error("script '{name}': timeout must be a positive number of seconds")]
    InvalidTimeout { name: String },

    #[error("interpreter must not be empty")]
    EmptyInterpreter,
}

/// Top-level config file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default)]
    pub scripts: BTreeMap<String, ScriptEntry>,
}

/// One entry of the `scripts` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptEntry {
    /// Defaults to the map key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub path: PathBuf,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

fn default_working_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_interpreter() -> String {
    DEFAULT_INTERPRETER.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            working_directory: default_working_directory(),
            interpreter: default_interpreter(),
            scripts: BTreeMap::new(),
        }
    }
}

impl RunnerConfig {
    /// Parse a config document.
    pub fn from_json(path: &Path, text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Starter config written by `init`.
    pub fn starter() -> Self {
        let mut scripts = BTreeMap::new();
        scripts.insert(
            "hello".to_string(),
            ScriptEntry {
                name: Some("hello".to_string()),
                path: Path::new(".").join(STARTER_SCRIPT_PATH),
                description: "Simple hello world script".to_string(),
                arguments: Vec::new(),
                working_directory: None,
                timeout: 30,
                env: BTreeMap::new(),
            },
        );
        Self {
            scripts,
            ..Self::default()
        }
    }

    /// Validate every entry and build a snapshot. `base` anchors relative paths.
    ///
    /// Fails on the first invalid entry; nothing partial is returned.
    pub fn into_snapshot(self, base: &Path) -> Result<Snapshot, ConfigError> {
        if self.interpreter.trim().is_empty() {
            return Err(ConfigError::EmptyInterpreter);
        }

        let working_directory = existing_dir(&anchor(base, &self.working_directory))?;

        let mut scripts = BTreeMap::new();
        for (key, entry) in self.scripts {
            let spec = entry.into_spec(&key, base)?;
            scripts.insert(key, Arc::new(spec));
        }

        Ok(Snapshot::new(scripts, working_directory, self.interpreter))
    }
}

impl ScriptEntry {
    fn into_spec(self, key: &str, base: &Path) -> Result<ScriptSpec, ConfigError> {
        let name = self.name.unwrap_or_else(|| key.to_string());
        if name.trim().is_empty() || key.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if name != key {
            return Err(ConfigError::NameMismatch {
                key: key.to_string(),
                name,
            });
        }
        if self.timeout == 0 {
            return Err(ConfigError::InvalidTimeout { name });
        }

        let path = anchor(base, &self.path);
        if !path.exists() {
            return Err(ConfigError::MissingScript { name, path });
        }

        let working_directory = match self.working_directory {
            Some(dir) => Some(existing_dir(&anchor(base, &dir))?),
            None => None,
        };

        let mut spec = ScriptSpec::new(name, path)
            .with_description(self.description)
            .with_arguments(self.arguments)
            .with_timeout(self.timeout);
        spec.working_directory = working_directory;
        spec.env = self.env;
        Ok(spec)
    }
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn existing_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    if !path.is_dir() {
        return Err(ConfigError::MissingDirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()))
}

/// A JSON config file on disk, re-read on every load.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory relative paths in the file resolve against.
    fn base_dir(&self) -> PathBuf {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::path::absolute(&parent).unwrap_or(parent)
    }

    /// Read and parse the file without validating it.
    pub fn read(&self) -> Result<RunnerConfig, ConfigError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;
        RunnerConfig::from_json(&self.path, &text)
    }

    /// Write a starter config. Refuses to clobber an existing file unless `force`.
    pub fn write_starter(&self, force: bool) -> Result<(), ConfigError> {
        if self.path.exists() && !force {
            return Err(ConfigError::AlreadyExists {
                path: self.path.clone(),
            });
        }
        let mut text = serde_json::to_string_pretty(&RunnerConfig::starter()).map_err(|source| {
            ConfigError::Serialize {
                path: self.path.clone(),
                source,
            }
        })?;
        text.push('\n');
        write_file(&self.path, &text)?;

        // The starter catalog points at scripts/hello.sh; create it unless present.
        let script = self.base_dir().join(STARTER_SCRIPT_PATH);
        if !script.exists() {
            if let Some(dir) = script.parent() {
                std::fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
            write_file(&script, STARTER_SCRIPT)?;
        }
        Ok(())
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    std::fs::write(path, contents).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

impl ScriptSource for ConfigFile {
    fn load(&self) -> Result<Snapshot, ConfigError> {
        let base = self.base_dir();
        if !self.path.exists() {
            tracing::warn!(
                path = %self.path.display(),
                "config file not found, starting with an empty catalog"
            );
            return RunnerConfig::default().into_snapshot(&base);
        }
        self.read()?.into_snapshot(&base)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

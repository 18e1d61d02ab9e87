//! Script registry: named specs behind an atomically swappable snapshot.
//!
//! Readers load the current [`Snapshot`] without taking a lock. `reload`
//! builds a complete new snapshot from the [`ScriptSource`] and swaps the
//! pointer, so a lookup sees either the old catalog or the new one, never a
//! mix. Runs already in flight hold their own `Arc<ScriptSpec>` and are not
//! affected by a swap.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use arc_swap::ArcSwap;

use crate::config::{ConfigError, DEFAULT_INTERPRETER};
use crate::script::ScriptSpec;

/// Immutable point-in-time view of the catalog.
#[derive(Debug, Clone)]
pub struct Snapshot {
    scripts: BTreeMap<String, Arc<ScriptSpec>>,
    default_working_directory: PathBuf,
    interpreter: String,
}

impl Snapshot {
    pub fn new(
        scripts: BTreeMap<String, Arc<ScriptSpec>>,
        default_working_directory: PathBuf,
        interpreter: impl Into<String>,
    ) -> Self {
        Self {
            scripts,
            default_working_directory,
            interpreter: interpreter.into(),
        }
    }

    /// Build a snapshot from already-validated specs.
    pub fn from_specs(
        specs: impl IntoIterator<Item = ScriptSpec>,
        default_working_directory: impl Into<PathBuf>,
    ) -> Self {
        let scripts = specs
            .into_iter()
            .map(|spec| (spec.name().to_string(), Arc::new(spec)))
            .collect();
        Self::new(scripts, default_working_directory.into(), DEFAULT_INTERPRETER)
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<ScriptSpec>> {
        self.scripts.get(name).cloned()
    }

    /// All specs, sorted by name.
    pub fn specs(&self) -> Vec<Arc<ScriptSpec>> {
        self.scripts.values().cloned().collect()
    }

    pub fn default_working_directory(&self) -> &Path {
        &self.default_working_directory
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Where a registry gets its catalog from.
pub trait ScriptSource: Send + Sync {
    /// Produce a fully validated snapshot.
    fn load(&self) -> Result<Snapshot, ConfigError>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String {
        "in-memory catalog".to_string()
    }
}

impl ScriptSource for Snapshot {
    fn load(&self) -> Result<Snapshot, ConfigError> {
        Ok(self.clone())
    }
}

/// The live catalog shared by every request on a connection.
pub struct Registry {
    source: Box<dyn ScriptSource>,
    snapshot: ArcSwap<Snapshot>,
    /// Set by `set_working_directory`; cleared by `reload`.
    cwd_override: RwLock<Option<PathBuf>>,
}

impl Registry {
    /// Load the initial snapshot from `source`.
    pub fn load(source: impl ScriptSource + 'static) -> Result<Self, ConfigError> {
        let snapshot = source.load()?;
        tracing::info!(
            source = %source.describe(),
            scripts = snapshot.len(),
            "registry loaded"
        );
        Ok(Self {
            source: Box::new(source),
            snapshot: ArcSwap::from_pointee(snapshot),
            cwd_override: RwLock::new(None),
        })
    }

    /// A registry whose reload always yields the same catalog.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot.clone()),
            source: Box::new(snapshot),
            cwd_override: RwLock::new(None),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Look up a script by exact name.
    pub fn lookup(&self, name: &str) -> Option<Arc<ScriptSpec>> {
        self.snapshot.load().get(name)
    }

    /// Every registered script, sorted by name.
    pub fn list(&self) -> Vec<Arc<ScriptSpec>> {
        self.snapshot.load().specs()
    }

    /// Interpreter used to run scripts in the current snapshot.
    pub fn interpreter(&self) -> String {
        self.snapshot.load().interpreter().to_string()
    }

    /// The override set at runtime, or the snapshot's configured directory.
    pub fn default_working_directory(&self) -> PathBuf {
        let guard = self
            .cwd_override
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(dir) => dir.clone(),
            None => self.snapshot.load().default_working_directory().to_path_buf(),
        }
    }

    /// Replace the default working directory for the rest of the process.
    ///
    /// The path must name an existing directory. Returns the stored absolute path.
    pub fn set_working_directory(&self, path: &Path) -> Result<PathBuf, ConfigError> {
        if !path.is_dir() {
            return Err(ConfigError::MissingDirectory {
                path: path.to_path_buf(),
            });
        }
        let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        *self
            .cwd_override
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(resolved.clone());
        tracing::info!(path = %resolved.display(), "working directory changed");
        Ok(resolved)
    }

    /// Re-read the source and swap in the new snapshot.
    ///
    /// On error the current snapshot stays in place. Returns the new script count.
    pub fn reload(&self) -> Result<usize, ConfigError> {
        let fresh = self.source.load()?;
        let count = fresh.len();
        self.snapshot.store(Arc::new(fresh));
        *self
            .cwd_override
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        tracing::info!(source = %self.source.describe(), scripts = count, "registry reloaded");
        Ok(count)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("Registry")
            .field("source", &self.source.describe())
            .field("scripts", &snapshot.scripts.keys().collect::<Vec<_>>())
            .finish()
    }
}

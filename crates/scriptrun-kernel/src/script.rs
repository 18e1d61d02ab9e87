//! Execution parameters for one registered script.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Timeout applied when a config entry does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// A validated, registered script.
///
/// Specs are only handed out by a [`Registry`](crate::Registry) snapshot, which
/// checks every field before the spec becomes visible. The name is the
/// registry key and never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSpec {
    name: String,
    /// Absolute path to the script file.
    pub path: PathBuf,
    /// Free-text description shown to callers.
    pub description: String,
    /// Declared argument names. Documentation only; never enforced.
    pub arguments: Vec<String>,
    /// Overrides the registry's default working directory when set.
    pub working_directory: Option<PathBuf>,
    /// Wall-clock limit for one run, in seconds. Always positive.
    pub timeout_seconds: u64,
    /// Extra environment layered over the inherited environment.
    pub env: BTreeMap<String, String>,
}

impl ScriptSpec {
    /// Create a spec with default metadata.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            description: String::new(),
            arguments: Vec::new(),
            working_directory: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            env: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The registry key for this script.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Working directory a run should use, given the registry default.
    pub fn effective_working_directory(&self, default: &Path) -> PathBuf {
        let dir = self.working_directory.as_deref().unwrap_or(default);
        std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf())
    }

    /// Declared arguments joined for display, `None` when there are none.
    pub fn arguments_display(&self) -> String {
        if self.arguments.is_empty() {
            "None".to_string()
        } else {
            self.arguments.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_default_timeout() {
        let spec = ScriptSpec::new("hello", "/tmp/hello.sh");
        assert_eq!(spec.name(), "hello");
        assert_eq!(spec.timeout_seconds, DEFAULT_TIMEOUT_SECS);
        assert!(spec.working_directory.is_none());
    }

    #[test]
    fn override_wins_over_default_directory() {
        let spec = ScriptSpec::new("a", "/tmp/a.sh").with_working_directory("/var");
        assert_eq!(
            spec.effective_working_directory(Path::new("/tmp")),
            PathBuf::from("/var")
        );
    }

    #[test]
    fn relative_directory_is_made_absolute() {
        let spec = ScriptSpec::new("a", "/tmp/a.sh");
        let dir = spec.effective_working_directory(Path::new("some/dir"));
        assert!(dir.is_absolute());
        assert!(dir.ends_with("some/dir"));
    }

    #[test]
    fn arguments_display() {
        let bare = ScriptSpec::new("a", "/tmp/a.sh");
        assert_eq!(bare.arguments_display(), "None");

        let with_args = bare.with_arguments(["env", "tag"]);
        assert_eq!(with_args.arguments_display(), "env, tag");
    }
}

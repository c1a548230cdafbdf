//! Execution session and host lifecycle hooks.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::frontend::config::RunnerConfig;

/// Script library file extension tried when a bare name is imported.
pub const SCRIPT_EXTENSION: &str = "ds";

/// Configuration plus file search for the current execution.
///
/// Clones share the application values, so a value set through the runner
/// is seen by the engine and by extensions.
#[derive(Debug, Clone)]
pub struct ExecutionSession {
    config: Arc<RunnerConfig>,
    values: Arc<RwLock<BTreeMap<String, toml::Value>>>,
}

impl ExecutionSession {
    pub fn new(config: RunnerConfig) -> Self {
        let values = config.values.clone();
        Self {
            config: Arc::new(config),
            values: Arc::new(RwLock::new(values)),
        }
    }

    /// Configuration the session started with. Application values set
    /// since then are only visible through [`Self::config_value`].
    pub fn configuration(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn config_value(&self, key: &str) -> Option<toml::Value> {
        self.values.read().get(key).cloned()
    }

    pub fn set_config_value(&self, key: impl Into<String>, value: impl Into<toml::Value>) {
        let key = key.into();
        tracing::debug!(key = %key, "configuration value set");
        self.values.write().insert(key, value.into());
    }

    pub fn config_values(&self) -> BTreeMap<String, toml::Value> {
        self.values.read().clone()
    }

    /// Full path of `filename`, or `None` when it is nowhere to be found.
    ///
    /// Tried in order: the name as given, each include directory, and the
    /// directory of the root module; each with and without a `.ds` suffix.
    pub fn search_file(&self, filename: &str) -> Option<PathBuf> {
        if filename.is_empty() {
            return None;
        }

        let candidates = candidate_names(filename);

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.is_file() {
                return Some(absolute(path));
            }
        }

        for root in self.search_roots() {
            for candidate in &candidates {
                let path = root.join(candidate);
                if path.is_file() {
                    return Some(absolute(&path));
                }
            }
        }

        tracing::debug!(filename, "file not found in any search root");
        None
    }

    fn search_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::new();

        for dir in &self.config.session.include_directories {
            if dir.contains(['*', '?', '[']) {
                match glob::glob(dir) {
                    Ok(paths) => roots.extend(paths.flatten().filter(|p| p.is_dir())),
                    Err(e) => tracing::warn!("Invalid include pattern {}: {}", dir, e),
                }
            } else {
                roots.push(PathBuf::from(dir));
            }
        }

        if let Some(parent) = self
            .config
            .session
            .root_module_path
            .as_deref()
            .and_then(Path::parent)
        {
            roots.push(parent.to_path_buf());
        }

        roots
    }
}

impl Default for ExecutionSession {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

fn candidate_names(filename: &str) -> Vec<String> {
    let has_extension = Path::new(filename)
        .extension()
        .map_or(false, |ext| ext == SCRIPT_EXTENSION);

    if has_extension {
        vec![filename.to_string()]
    } else {
        vec![filename.to_string(), format!("{}.{}", filename, SCRIPT_EXTENSION)]
    }
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Notifications a host extension receives from the runner.
///
/// Begin/end bracket every mutating engine operation. They run outside the
/// engine lock, so a hook may read from the runner, but it must not start
/// another mutation. Suspend/resume are raised when a host pauses a runner
/// for inspection.
pub trait ExtensionApplication: Send + Sync {
    /// Called once, when the extension is registered.
    fn start_up(&self) {}

    fn on_begin_execution(&self, _session: &ExecutionSession) {}

    fn on_suspend_execution(&self, _session: &ExecutionSession) {}

    fn on_resume_execution(&self, _session: &ExecutionSession) {}

    fn on_end_execution(&self, _session: &ExecutionSession) {}

    /// Called when the owning runner is dropped.
    fn shut_down(&self) {}
}

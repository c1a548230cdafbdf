use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Well-known keys for application-defined configuration values.
pub struct ConfigurationKeys;

impl ConfigurationKeys {
    /// Name of the context data provider used when none is named.
    pub const GEOMETRY_PROVIDER: &'static str = "GeometryProvider";
    /// Session identifier a persistence layer uses to tell host documents apart.
    pub const SESSION_KEY: &'static str = "SessionKey";
    /// Request an explicit lock on host data before each execution (bool).
    pub const REQUEST_EXPLICIT_LOCK: &'static str = "RequestExplicitLock";
    /// Whether the host is recording user actions (bool).
    pub const RECORDING_USER_ACTIONS: &'static str = "RecordingUserActions";
    /// Clear persisted host objects before each run (bool).
    pub const CLEAR_PERSISTED_OBJECTS: &'static str = "ClearPersistedObjects";
    /// Enable geometric preview in the host (bool).
    pub const GEOMETRIC_PREVIEW_ENABLED: &'static str = "GeometricPreviewEnabled";
    /// `assembly;class;` pairs the host wants hidden.
    pub const FILTERED_CLASSES: &'static str = "FilteredClasses";
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunnerConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub runner: RunnerSection,

    /// Free-form application configuration, keyed by [`ConfigurationKeys`]
    /// or host-specific names.
    #[serde(default)]
    pub values: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// Path of the main executing script, if any.
    #[serde(default)]
    pub root_module_path: Option<PathBuf>,

    /// Directories searched for script libraries. Glob patterns allowed.
    #[serde(default)]
    pub include_directories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,

    /// Parsed segments kept for reuse; 0 disables the cache.
    #[serde(default = "default_parse_cache_size")]
    pub parse_cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSection {
    /// Async update mailbox capacity; 0 means unbounded.
    #[serde(default = "default_mailbox_size")]
    pub mailbox_size: usize,

    /// Prefix of generated node names (`var1`, `var2`, ...).
    #[serde(default = "default_node_prefix")]
    pub node_prefix: String,

    /// Worker threads of the runtime a runner creates when none is ambient.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: default_max_call_depth(),
            parse_cache_size: default_parse_cache_size(),
        }
    }
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            mailbox_size: default_mailbox_size(),
            node_prefix: default_node_prefix(),
            worker_threads: default_worker_threads(),
        }
    }
}

fn default_max_call_depth() -> usize { 256 }
fn default_parse_cache_size() -> usize { 64 }
fn default_mailbox_size() -> usize { 64 }
fn default_node_prefix() -> String { "var".to_string() }
fn default_worker_threads() -> usize { 1 }

const CONFIG_FILE_NAME: &str = ".liverunner.toml";

impl RunnerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config: {}", e))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content)
            .map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Find `.liverunner.toml` in the current directory or its parents
    pub fn discover() -> Self {
        let mut current = std::env::current_dir().ok();

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                match Self::load(&config_path) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Ignoring {}: {}", config_path.display(), e),
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Self::default()
    }

    pub fn with_include_directory(mut self, dir: impl Into<String>) -> Self {
        self.session.include_directories.push(dir.into());
        self
    }

    pub fn with_root_module(mut self, path: impl Into<PathBuf>) -> Self {
        self.session.root_module_path = Some(path.into());
        self
    }

    /// Application-defined configuration value.
    pub fn config_value(&self, key: &str) -> Option<&toml::Value> {
        self.values.get(key)
    }

    pub fn set_config_value(&mut self, key: impl Into<String>, value: impl Into<toml::Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.engine.max_call_depth, 256);
        assert_eq!(config.runner.node_prefix, "var");
        assert!(config.session.include_directories.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[session]
root_module_path = "scripts/main.ds"
include_directories = ["libs", "vendor/*"]

[engine]
max_call_depth = 32

[runner]
node_prefix = "n"

[values]
SessionKey = "doc-1"
RecordingUserActions = true
"#;

        let config = RunnerConfig::parse(toml).unwrap();
        assert_eq!(config.session.include_directories, vec!["libs", "vendor/*"]);
        assert_eq!(config.engine.max_call_depth, 32);
        assert_eq!(config.engine.parse_cache_size, 64);
        assert_eq!(config.runner.node_prefix, "n");
        assert_eq!(
            config.config_value(ConfigurationKeys::SESSION_KEY).and_then(|v| v.as_str()),
            Some("doc-1")
        );
        assert_eq!(
            config
                .config_value(ConfigurationKeys::RECORDING_USER_ACTIONS)
                .and_then(|v| v.as_bool()),
            Some(true)
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".liverunner.toml");

        let mut config = RunnerConfig::default().with_include_directory("libs");
        config.set_config_value(ConfigurationKeys::CLEAR_PERSISTED_OBJECTS, false);
        config.save(&path).unwrap();

        let loaded = RunnerConfig::load(&path).unwrap();
        assert_eq!(loaded.session.include_directories, vec!["libs"]);
        assert_eq!(
            loaded
                .config_value(ConfigurationKeys::CLEAR_PERSISTED_OBJECTS)
                .and_then(|v| v.as_bool()),
            Some(false)
        );
    }

    #[test]
    fn test_invalid_config() {
        let err = RunnerConfig::parse("[engine]\nmax_call_depth = \"deep\"").unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }
}

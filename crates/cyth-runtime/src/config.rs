use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::RuntimeError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub host: HostConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Enable the GC and function-references proposals so string handles
    /// may be reference types.
    #[serde(default = "default_true")]
    pub gc: bool,
    /// Capture wasm backtraces on traps. Without them crashes carry no frames.
    #[serde(default = "default_true")]
    pub backtraces: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gc: default_true(),
            backtraces: default_true(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    #[serde(default = "default_string_length_export")]
    pub string_length_export: String,
    #[serde(default = "default_string_at_export")]
    pub string_at_export: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            entry_point: default_entry_point(),
            string_length_export: default_string_length_export(),
            string_at_export: default_string_at_export(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Oldest console entries are dropped past this many. Unbounded if unset.
    pub log_capacity: Option<usize>,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_capacity: None,
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_entry_point() -> String {
    "<start>".into()
}
fn default_string_length_export() -> String {
    "string.length".into()
}
fn default_string_at_export() -> String {
    "string.at".into()
}
fn default_frame_interval_ms() -> u64 {
    16
}

impl SandboxConfig {
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, RuntimeError> {
        toml::from_str(content)
            .map_err(|e| RuntimeError::Config(format!("Failed to parse config: {e}")))
    }

    /// `~/.cyth/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cyth")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_matches_default() {
        let config = SandboxConfig::from_toml("").unwrap();
        let default = SandboxConfig::default();
        assert_eq!(config.runner.entry_point, default.runner.entry_point);
        assert_eq!(config.runner.entry_point, "<start>");
        assert_eq!(config.runner.string_length_export, "string.length");
        assert_eq!(config.runner.string_at_export, "string.at");
        assert!(config.engine.gc);
        assert!(config.engine.backtraces);
        assert_eq!(config.host.log_capacity, None);
        assert_eq!(config.host.frame_interval_ms, 16);
    }

    #[test]
    fn parses_full_config() {
        let toml_str = r#"
[engine]
gc = false
backtraces = true

[runner]
entry_point = "main"
string_length_export = "str.len"
string_at_export = "str.get"

[host]
log_capacity = 500
frame_interval_ms = 33
"#;
        let config = SandboxConfig::from_toml(toml_str).unwrap();
        assert!(!config.engine.gc);
        assert_eq!(config.runner.entry_point, "main");
        assert_eq!(config.runner.string_length_export, "str.len");
        assert_eq!(config.runner.string_at_export, "str.get");
        assert_eq!(config.host.log_capacity, Some(500));
        assert_eq!(config.host.frame_interval_ms, 33);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = SandboxConfig::from_toml("[host]\nlog_capacity = 10\n").unwrap();
        assert_eq!(config.host.log_capacity, Some(10));
        assert_eq!(config.host.frame_interval_ms, 16);
        assert_eq!(config.runner.entry_point, "<start>");
    }

    #[test]
    fn rejects_wrong_types() {
        let err = SandboxConfig::from_toml("[host]\nframe_interval_ms = \"fast\"\n").unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn reads_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[runner]\nentry_point = \"run\"\n").unwrap();

        let config = SandboxConfig::from_file(&path).unwrap();
        assert_eq!(config.runner.entry_point, "run");
    }
}

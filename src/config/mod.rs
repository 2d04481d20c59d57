//! Runtime configuration
//!
//! Values are layered, later layers winning field by field:
//! 1. built-in defaults
//! 2. the global file `<config dir>/dockhand/config.toml`
//! 3. a file passed with `--config`
//! 4. `DOCKHAND_*` environment variables

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DockhandError, ErrorCode};

pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub const ENV_DOCKER_BINARY: &str = "DOCKHAND_DOCKER_BINARY";
pub const ENV_SHELL: &str = "DOCKHAND_SHELL";
pub const ENV_KILL_GRACE_MS: &str = "DOCKHAND_KILL_GRACE_MS";
pub const ENV_EVENT_BUFFER: &str = "DOCKHAND_EVENT_BUFFER";
pub const ENV_COMMAND_TIMEOUT_SECS: &str = "DOCKHAND_COMMAND_TIMEOUT_SECS";
pub const ENV_LOG_LEVEL: &str = "DOCKHAND_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockhandConfig {
    /// Executable used for every docker command
    pub docker_binary: String,
    /// Shell that runs each command line with `-c`
    pub shell: String,
    /// Time between SIGTERM and SIGKILL when a command is cancelled
    pub kill_grace_ms: u64,
    /// Capacity of the decoded event channel
    pub event_buffer: usize,
    /// Upper bound for non-streaming commands
    pub command_timeout_secs: Option<u64>,
    pub log_level: String,
}

impl Default for DockhandConfig {
    fn default() -> Self {
        Self {
            docker_binary: "docker".to_string(),
            shell: "sh".to_string(),
            kill_grace_ms: 2000,
            event_buffer: 1000,
            command_timeout_secs: None,
            log_level: "info".to_string(),
        }
    }
}

/// One configuration file; absent keys leave the lower layer untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigLayer {
    docker_binary: Option<String>,
    shell: Option<String>,
    kill_grace_ms: Option<u64>,
    event_buffer: Option<usize>,
    command_timeout_secs: Option<u64>,
    log_level: Option<String>,
}

/// Path of the per-user configuration file, if a home directory can be determined
pub fn global_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "dockhand").map(|dirs| dirs.config_dir().join("config.toml"))
}

impl DockhandConfig {
    /// Load every layer and validate the result
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(global) = global_config_path() {
            if global.exists() {
                tracing::debug!("Loading global config from {}", global.display());
                config.merge_file(&global)?;
            }
        }

        if let Some(path) = explicit {
            tracing::debug!("Loading config from {}", path.display());
            config.merge_file(path)?;
        }

        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the keys present in a TOML file
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        self.merge_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn merge_toml(&mut self, content: &str) -> std::result::Result<(), DockhandError> {
        let layer: ConfigLayer = toml::from_str(content)?;
        self.apply(layer);
        Ok(())
    }

    fn apply(&mut self, layer: ConfigLayer) {
        if let Some(docker_binary) = layer.docker_binary {
            self.docker_binary = docker_binary;
        }
        if let Some(shell) = layer.shell {
            self.shell = shell;
        }
        if let Some(kill_grace_ms) = layer.kill_grace_ms {
            self.kill_grace_ms = kill_grace_ms;
        }
        if let Some(event_buffer) = layer.event_buffer {
            self.event_buffer = event_buffer;
        }
        if let Some(timeout) = layer.command_timeout_secs {
            self.command_timeout_secs = Some(timeout);
        }
        if let Some(log_level) = layer.log_level {
            self.log_level = log_level;
        }
    }

    /// Apply `DOCKHAND_*` variables from the process environment
    pub fn merge_env_vars(&mut self) -> std::result::Result<(), DockhandError> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    pub fn merge_env_from<F>(&mut self, lookup: F) -> std::result::Result<(), DockhandError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let layer = ConfigLayer {
            docker_binary: lookup(ENV_DOCKER_BINARY),
            shell: lookup(ENV_SHELL),
            kill_grace_ms: parse_env(&lookup, ENV_KILL_GRACE_MS)?,
            event_buffer: parse_env(&lookup, ENV_EVENT_BUFFER)?,
            command_timeout_secs: parse_env(&lookup, ENV_COMMAND_TIMEOUT_SECS)?,
            log_level: lookup(ENV_LOG_LEVEL),
        };
        self.apply(layer);
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), DockhandError> {
        let mut problems = Vec::new();

        if self.docker_binary.trim().is_empty() {
            problems.push("docker_binary cannot be empty".to_string());
        }
        if self.shell.trim().is_empty() {
            problems.push("shell cannot be empty".to_string());
        }
        if self.event_buffer == 0 {
            problems.push("event_buffer must be at least 1".to_string());
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            problems.push(format!(
                "log_level must be one of: {}",
                VALID_LOG_LEVELS.join(", ")
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DockhandError::config_with_code(
                ErrorCode::CONFIG_VALIDATION_FAILED,
                problems.join("; "),
            ))
        }
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_env<T, F>(lookup: &F, key: &str) -> std::result::Result<Option<T>, DockhandError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            DockhandError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                format!("{} has an invalid value: {}", key, raw),
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = DockhandConfig::default();
        assert_eq!(config.docker_binary, "docker");
        assert_eq!(config.shell, "sh");
        assert_eq!(config.kill_grace(), Duration::from_secs(2));
        assert_eq!(config.event_buffer, 1000);
        assert_eq!(config.command_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_layer_overrides_only_present_keys() {
        let mut config = DockhandConfig::default();
        config
            .merge_toml("docker_binary = \"/usr/local/bin/docker\"\ncommand_timeout_secs = 30\n")
            .unwrap();

        assert_eq!(config.docker_binary, "/usr/local/bin/docker");
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.shell, "sh");
        assert_eq!(config.event_buffer, 1000);
    }

    #[test]
    fn test_later_file_wins() {
        let mut first = NamedTempFile::new().unwrap();
        writeln!(first, "shell = \"bash\"\nevent_buffer = 10").unwrap();
        let mut second = NamedTempFile::new().unwrap();
        writeln!(second, "event_buffer = 20").unwrap();

        let mut config = DockhandConfig::default();
        config.merge_file(first.path()).unwrap();
        config.merge_file(second.path()).unwrap();

        assert_eq!(config.shell, "bash");
        assert_eq!(config.event_buffer, 20);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut config = DockhandConfig::default();
        let err = config.merge_toml("dockr_binary = \"x\"").unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_TOML);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = DockhandConfig::default();
        assert!(config.merge_file(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_env_layer_wins() {
        let mut config = DockhandConfig::default();
        config.merge_toml("log_level = \"warn\"").unwrap();
        config
            .merge_env_from(env(&[
                (ENV_LOG_LEVEL, "debug"),
                (ENV_KILL_GRACE_MS, "250"),
                (ENV_DOCKER_BINARY, "podman"),
            ]))
            .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.kill_grace(), Duration::from_millis(250));
        assert_eq!(config.docker_binary, "podman");
    }

    #[test]
    fn test_env_number_must_parse() {
        let mut config = DockhandConfig::default();
        let err = config
            .merge_env_from(env(&[(ENV_EVENT_BUFFER, "lots")]))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_VALUE);
        assert!(err.to_string().contains(ENV_EVENT_BUFFER));
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let config = DockhandConfig {
            docker_binary: " ".to_string(),
            shell: String::new(),
            event_buffer: 0,
            log_level: "loud".to_string(),
            ..DockhandConfig::default()
        };

        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_VALIDATION_FAILED);
        let message = err.to_string();
        assert!(message.contains("docker_binary"));
        assert!(message.contains("shell"));
        assert!(message.contains("event_buffer"));
        assert!(message.contains("log_level"));
    }

    #[test]
    fn test_load_with_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "kill_grace_ms = 500").unwrap();

        let config = DockhandConfig::load(Some(file.path())).unwrap();
        assert!(config.kill_grace_ms == 500 || std::env::var(ENV_KILL_GRACE_MS).is_ok());
    }
}

//! Configuration loading: a single TOML file with unknown-key detection.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use schemars::schema_for;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the default config file location.
pub const CONFIG_PATH_ENV: &str = "CATNIP_CONFIG";

const DEFAULT_CHECKPOINT_TIMEOUT_SECONDS: i64 = 30;

/// Whether the core is running natively on the host or inside a container,
/// which gates the push strategy's SSH→HTTPS URL rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Native,
    Containerized,
}

impl Default for RuntimeMode {
    fn default() -> Self {
        RuntimeMode::Native
    }
}

/// The four recognized configuration options.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default)]
pub struct Config {
    /// Minimum idle time before a Session Monitor checkpoint commit.
    /// Values ≤ 0 in the source TOML revert to the default at load time;
    /// signed so a negative value still deserializes instead of failing
    /// `Config::load` outright.
    pub checkpoint_timeout_seconds: i64,
    pub runtime_mode: RuntimeMode,
    pub workspace_dir: PathBuf,
    pub repos_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let workspace_dir = PathBuf::from("workspace");
        let repos_dir = workspace_dir.join("repos");
        Self {
            checkpoint_timeout_seconds: DEFAULT_CHECKPOINT_TIMEOUT_SECONDS,
            runtime_mode: RuntimeMode::default(),
            workspace_dir,
            repos_dir,
        }
    }
}

impl Config {
    /// Default config file path: `<workspace_dir>/config.toml`, unless
    /// overridden by `CATNIP_CONFIG`.
    pub fn resolve_path(workspace_dir: &Path) -> PathBuf {
        Self::resolve_path_with(workspace_dir, std::env::var(CONFIG_PATH_ENV).ok())
    }

    fn resolve_path_with(workspace_dir: &Path, env_override: Option<String>) -> PathBuf {
        match env_override {
            Some(path) => PathBuf::from(path),
            None => workspace_dir.join("config.toml"),
        }
    }

    /// Load configuration from `path`. A missing file is not an error and
    /// yields all-default config; malformed TOML is surfaced as an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let unknown = find_unknown_keys(&contents)?;
        for key in &unknown {
            log::warn!("ignoring unknown config key: {key}");
        }

        let mut config: Config = toml::from_str(&contents)?;
        if config.checkpoint_timeout_seconds <= 0 {
            config.checkpoint_timeout_seconds = DEFAULT_CHECKPOINT_TIMEOUT_SECONDS;
        }
        Ok(config)
    }
}

/// The set of top-level keys `Config` recognizes, derived from its schema.
fn valid_config_keys() -> BTreeSet<String> {
    let schema = schema_for!(Config);
    schema
        .as_object()
        .and_then(|obj| obj.get("properties"))
        .and_then(|props| props.as_object())
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default()
}

/// Parse `contents` as a generic TOML table and return any top-level keys
/// not recognized by [`Config`]'s schema.
fn find_unknown_keys(contents: &str) -> anyhow::Result<Vec<String>> {
    let table: toml::Value = toml::from_str(contents)?;
    let valid = valid_config_keys();

    let Some(map) = table.as_table() else {
        return Ok(Vec::new());
    };

    Ok(map
        .keys()
        .filter(|k| !valid.contains(k.as_str()))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.checkpoint_timeout_seconds, DEFAULT_CHECKPOINT_TIMEOUT_SECONDS);
        assert_eq!(config.runtime_mode, RuntimeMode::Native);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not [ valid toml").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn loads_recognized_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            checkpoint_timeout_seconds = 45
            runtime_mode = "containerized"
            workspace_dir = "/ws"
            repos_dir = "/ws/repos"
            "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.checkpoint_timeout_seconds, 45);
        assert_eq!(config.runtime_mode, RuntimeMode::Containerized);
        assert_eq!(config.workspace_dir, PathBuf::from("/ws"));
    }

    #[test]
    fn zero_checkpoint_timeout_reverts_to_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "checkpoint_timeout_seconds = 0\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.checkpoint_timeout_seconds, DEFAULT_CHECKPOINT_TIMEOUT_SECONDS);
    }

    #[test]
    fn negative_checkpoint_timeout_reverts_to_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "checkpoint_timeout_seconds = -5\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.checkpoint_timeout_seconds, DEFAULT_CHECKPOINT_TIMEOUT_SECONDS);
    }

    #[test]
    fn unknown_keys_are_detected_but_do_not_fail_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "checkpoint_timeout_seconds = 20\nnonsense_option = true\n").unwrap();
        assert!(Config::load(&path).is_ok());

        let contents = std::fs::read_to_string(&path).unwrap();
        let unknown = find_unknown_keys(&contents).unwrap();
        assert_eq!(unknown, vec!["nonsense_option".to_string()]);
    }

    #[test]
    fn config_path_resolution_honours_env_override() {
        let override_path = PathBuf::from("/custom/config.toml");
        let resolved = Config::resolve_path_with(Path::new("/ws"), Some("/custom/config.toml".to_string()));
        assert_eq!(resolved, override_path);
    }

    #[test]
    fn config_path_resolution_defaults_under_workspace() {
        let resolved = Config::resolve_path_with(Path::new("/ws"), None);
        assert_eq!(resolved, PathBuf::from("/ws/config.toml"));
    }
}

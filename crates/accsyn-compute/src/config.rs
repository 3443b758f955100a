//! Configuration management for accsyn-compute.
//!
//! This module provides configuration loading and validation using figment,
//! supporting a TOML config file, environment variables, and defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging;
use crate::platform::Priority;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "compute.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "accsyn";

/// Node configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables prefixed with `ACCSYN_` (nested keys split on `__`)
/// 2. TOML config file at `<config dir>/accsyn/compute.toml`
/// 3. Default values
///
/// `dev` and `debug` are switched on by `ACCSYN_DEV`/`FILMHUB_DEV` and
/// `ACCSYN_DEBUG`/`FILMHUB_DEBUG` set to `1` or `true`; any other value
/// leaves them as configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Development mode.
    pub dev: bool,
    /// Debug logging.
    pub debug: bool,
    /// Process execution settings.
    pub execution: ExecutionConfig,
    /// Per-engine overrides keyed by engine name.
    pub engines: BTreeMap<String, EngineOverride>,
}

/// Process execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Name of the sidecar file the runner PID is written to.
    pub pid_file_name: String,
    /// Seconds a render may keep running after reporting it finished.
    pub hung_render_grace_secs: u64,
    /// Whether to verify `mounts` before computing.
    pub check_mounts: bool,
    /// Network mounts that must be present before computing.
    pub mounts: Vec<PathBuf>,
}

/// Site specific overrides for one engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOverride {
    /// Use this executable instead of searching the default install location.
    pub executable: Option<PathBuf>,
    /// Search this directory for versioned installs instead of the platform default.
    pub install_root: Option<PathBuf>,
    /// Additional environment variables for the engine process.
    pub envs: BTreeMap<String, String>,
    /// Process priority, overriding the engine's own choice.
    pub priority: Option<Priority>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            pid_file_name: "process.pid".to_string(),
            hung_render_grace_secs: 5,
            check_mounts: true,
            mounts: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            // ACCSYN_ITEM and friends describe the task, not the node.
            .merge(Env::prefixed("ACCSYN_").split("__").filter(|key| {
                let key = key.as_str().to_ascii_lowercase();
                key.starts_with("execution") || key.starts_with("engines")
            }));

        let mut config: Config = figment.extract()?;
        config.dev |= logging::dev_from_env();
        config.debug |= logging::debug_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let pid_file_name = self.execution.pid_file_name.trim();
        if pid_file_name.is_empty() || pid_file_name.contains(['/', '\\']) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "pid_file_name must be a plain file name, got '{}'",
                    self.execution.pid_file_name
                ),
            });
        }

        for name in self.engines.keys() {
            if crate::engines::lookup(name).is_none() {
                return Err(Error::ConfigValidation {
                    message: format!("override for unknown engine '{name}'"),
                });
            }
        }

        Ok(())
    }

    /// Overrides for the named engine, if any.
    #[must_use]
    pub fn engine_override(&self, name: &str) -> Option<&EngineOverride> {
        self.engines.get(name)
    }

    /// Get the hung render grace period as a Duration.
    #[must_use]
    pub fn hung_render_grace(&self) -> Duration {
        Duration::from_secs(self.execution.hung_render_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(!config.dev);
        assert!(!config.debug);
        assert!(config.engines.is_empty());
        assert_eq!(config.execution.pid_file_name, "process.pid");
        assert_eq!(config.execution.hung_render_grace_secs, 5);
        assert!(config.execution.check_mounts);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_pid_file_name() {
        let mut config = Config::default();
        config.execution.pid_file_name = "sub/process.pid".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("pid_file_name"));

        config.execution.pid_file_name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_engine_override() {
        let mut config = Config::default();
        config
            .engines
            .insert("houdini-99".to_string(), EngineOverride::default());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("houdini-99"));
    }

    #[test]
    fn test_hung_render_grace() {
        let mut config = Config::default();
        config.execution.hung_render_grace_secs = 12;
        assert_eq!(config.hung_render_grace(), Duration::from_secs(12));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("accsyn"));
        assert!(path.to_string_lossy().ends_with("compute.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/compute.toml"))).unwrap();
        assert_eq!(config.execution, ExecutionConfig::default());
        assert!(config.engines.is_empty());
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[execution]
hung_render_grace_secs = 30
mounts = ["/mnt/projects"]

[engines."nuke-13"]
executable = "/opt/Nuke13.1v2/Nuke13.1"
priority = "below_normal"

[engines."nuke-13".envs]
NUKE_PATH = "/mnt/pipeline/nuke"
"#
        )
        .unwrap();

        let config = Config::load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.execution.hung_render_grace_secs, 30);
        assert_eq!(config.execution.mounts, vec![PathBuf::from("/mnt/projects")]);

        let nuke = config.engine_override("nuke-13").unwrap();
        assert_eq!(
            nuke.executable,
            Some(PathBuf::from("/opt/Nuke13.1v2/Nuke13.1"))
        );
        assert_eq!(nuke.priority, Some(Priority::BelowNormal));
        assert_eq!(nuke.envs["NUKE_PATH"], "/mnt/pipeline/nuke");
    }

    #[test]
    fn test_load_rejects_unknown_engine() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engines.maya]\nexecutable = \"/usr/bin/maya\"").unwrap();
        assert!(Config::load_from(Some(file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_env_flags_only_accept_one_or_true() {
        let load = || Config::load_from(Some(PathBuf::from("/nonexistent/compute.toml")));
        let cases = [
            ("", false),
            ("yes", false),
            ("TRUE", false),
            ("0", false),
            ("1", true),
            ("true", true),
        ];
        for (value, expected) in cases {
            std::env::set_var("ACCSYN_DEBUG", value);
            let config = load().unwrap_or_else(|e| panic!("ACCSYN_DEBUG={value:?}: {e}"));
            assert_eq!(config.debug, expected, "ACCSYN_DEBUG={value:?}");
        }
        std::env::remove_var("ACCSYN_DEBUG");

        std::env::set_var("FILMHUB_DEV", "");
        assert!(!load().unwrap().dev);
        std::env::remove_var("FILMHUB_DEV");
    }

    #[test]
    fn test_execution_config_serialize() {
        let json = serde_json::to_string(&ExecutionConfig::default()).unwrap();
        assert!(json.contains("hung_render_grace_secs"));
    }
}

//! Layered application configuration

use std::path::Path;

use anyhow::Context;
use capture_session::{SessionConfig, SimulatedDeviceConfig};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Default configuration file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "lidar-capture";

const ENV_PREFIX: &str = "LIDAR";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Maximum log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Emit JSON log lines
    pub log_json: bool,

    /// Number of captures issued by the demo run
    pub demo_captures: u32,

    /// Delay between demo captures (milliseconds)
    pub capture_interval_ms: u64,

    /// Capture session settings
    pub session: SessionConfig,

    /// Simulated camera settings
    pub device: SimulatedDeviceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            demo_captures: 3,
            capture_interval_ms: 200,
            session: SessionConfig::default(),
            device: SimulatedDeviceConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Sources, lowest priority first: built-in defaults, the config file
    /// (`path`, or an optional `lidar-capture.*` in the working directory),
    /// then `LIDAR_*` environment variables with `__` between nested keys.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with(path: Option<&Path>, environment: Environment) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        // LIDAR_DEMO_CAPTURES, LIDAR_SESSION__OUTPUT_DIR
        let environment = environment
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true);

        Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_session::DepthEncoding;
    use config::Map;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.demo_captures, 3);
        assert!(config.session.depth_delivery);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lidar-capture.toml");
        std::fs::write(
            &path,
            r#"
demo_captures = 5

[session]
output_dir = "/tmp/depth-out"
depth_encoding = "png"

[device]
depth_supported = false
depth_delivery = "before_photo"
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.demo_captures, 5);
        assert_eq!(config.session.output_dir, Path::new("/tmp/depth-out"));
        assert_eq!(config.session.depth_encoding, DepthEncoding::Png);
        assert!(config.session.auto_start);
        assert!(!config.device.depth_supported);
    }

    #[test]
    fn test_environment_overrides() {
        let vars: Map<String, String> = [
            ("LIDAR_DEMO_CAPTURES", "7"),
            ("LIDAR_LOG_JSON", "true"),
            ("LIDAR_SESSION__DEPTH_ENCODING", "png"),
            ("LIDAR_SESSION__OUTPUT_DIR", "/srv/depth"),
            ("OTHER_DEMO_CAPTURES", "99"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let environment = Environment::with_prefix(ENV_PREFIX).source(Some(vars));
        let config = AppConfig::load_with(None, environment).unwrap();

        assert_eq!(config.demo_captures, 7);
        assert!(config.log_json);
        assert_eq!(config.session.depth_encoding, DepthEncoding::Png);
        assert_eq!(config.session.output_dir, Path::new("/srv/depth"));
        assert!(config.session.depth_delivery);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/lidar.toml"))).is_err());
    }
}

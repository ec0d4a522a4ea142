//! Configuration System using Figment
//!
//! Strongly-typed configuration for the tracker. Values are layered from:
//! 1. Built-in defaults (every field has one, so an empty file is valid)
//! 2. A TOML file (default `config/tracker.toml`, optional)
//! 3. Environment variables prefixed with `UVC_TRACKER_`
//!
//! Nested keys are separated by a double underscore so that field names can keep
//! their own underscores:
//!
//! ```text
//! UVC_TRACKER_TELEMETRY__POLL_INTERVAL_MS=20
//! UVC_TRACKER_CONTROL__TARGET_POLICY=center
//! ```
//!
//! # Example
//! ```no_run
//! use uvc_tracker::config::TrackerConfig;
//!
//! let config = TrackerConfig::load()?;
//! config.validate()?;
//! println!("Reporting every {:?}", config.telemetry.report_interval());
//! # Ok::<(), uvc_tracker::config::ConfigError>(())
//! ```

use crate::control::{ControlParameters, PidGains, TargetPolicy};
use crate::error::SessionError;
use crate::logging::{parse_log_level, OutputFormat};
use crate::profile::StreamProfile;
use crate::telemetry::TelemetrySettings;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/tracker.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "UVC_TRACKER_";

/// Upper bound on the worker poll interval; `stop` must observe the flag within it.
pub const MAX_POLL_INTERVAL_MS: u64 = 100;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A provider failed or a value had the wrong type.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Values parsed but are semantically invalid.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        SessionError::Configuration(err.to_string())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackerConfig {
    /// Throughput telemetry
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Optional demonstration tracking path
    #[serde(default)]
    pub tracking: TrackingConfig,
    /// Initial control parameters
    #[serde(default)]
    pub control: ControlConfig,
    /// Stream format negotiation
    #[serde(default)]
    pub negotiation: NegotiationConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telemetry worker timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// Worker wake-up interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Length of one throughput window in milliseconds
    #[serde(default = "default_report_interval")]
    pub report_interval_ms: u64,
    /// `source` field of `stream` events
    #[serde(default = "default_source")]
    pub source: String,
}

/// Synthetic tracking tick
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Interval between tracking ticks in milliseconds
    #[serde(default = "default_tick")]
    pub tick_ms: u64,
}

/// Initial gains and target policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlConfig {
    #[serde(default = "default_kp")]
    pub kp_x: f32,
    #[serde(default)]
    pub ki_x: f32,
    #[serde(default = "default_kd")]
    pub kd_x: f32,
    #[serde(default = "default_kp")]
    pub kp_y: f32,
    #[serde(default)]
    pub ki_y: f32,
    #[serde(default = "default_kd")]
    pub kd_y: f32,
    /// largest, center or confidence
    #[serde(default = "default_policy")]
    pub target_policy: String,
}

/// Profile preference override
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NegotiationConfig {
    /// Ordered profile names such as `mjpeg_720p30`. Empty means the built-in list.
    #[serde(default)]
    pub profiles: Vec<String>,
}

/// Log level and format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_level")]
    pub level: String,
    /// pretty, compact or json
    #[serde(default = "default_format")]
    pub format: String,
}

// Default value functions
fn default_poll_interval() -> u64 {
    40
}

fn default_report_interval() -> u64 {
    1000
}

fn default_source() -> String {
    "uvc".to_string()
}

fn default_tick() -> u64 {
    67
}

fn default_kp() -> f32 {
    0.015
}

fn default_kd() -> f32 {
    0.004
}

fn default_policy() -> String {
    TargetPolicy::default().as_str().to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            report_interval_ms: default_report_interval(),
            source: default_source(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tick_ms: default_tick(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            kp_x: default_kp(),
            ki_x: 0.0,
            kd_x: default_kd(),
            kp_y: default_kp(),
            ki_y: 0.0,
            kd_y: default_kd(),
            target_policy: default_policy(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl TelemetryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}

impl TrackingConfig {
    /// Tick interval, or `None` when tracking is disabled.
    pub fn tick(&self) -> Option<Duration> {
        self.enabled.then(|| Duration::from_millis(self.tick_ms))
    }
}

impl ControlConfig {
    pub fn gains(&self) -> PidGains {
        PidGains::new(self.kp_x, self.ki_x, self.kd_x, self.kp_y, self.ki_y, self.kd_y)
    }
}

impl TrackerConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Ok(Self::figment(path).extract()?)
    }

    /// The provider stack used by [`load_from`](Self::load_from), for callers that
    /// want to merge further providers on top.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let telemetry = &self.telemetry;
        if telemetry.poll_interval_ms == 0 || telemetry.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "telemetry.poll_interval_ms must be in 1..={}, got {}",
                MAX_POLL_INTERVAL_MS, telemetry.poll_interval_ms
            )));
        }
        if telemetry.report_interval_ms < telemetry.poll_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "telemetry.report_interval_ms ({}) must not be shorter than poll_interval_ms ({})",
                telemetry.report_interval_ms, telemetry.poll_interval_ms
            )));
        }
        if self.tracking.tick_ms == 0 {
            return Err(ConfigError::Invalid(
                "tracking.tick_ms must be positive".to_string(),
            ));
        }

        parse_log_level(&self.logging.level)?;
        self.logging.format.parse::<OutputFormat>()?;

        self.preferences()?;
        self.control_parameters()?;
        Ok(())
    }

    /// Profile preference list, falling back to the built-in order.
    pub fn preferences(&self) -> Result<Vec<StreamProfile>, ConfigError> {
        if self.negotiation.profiles.is_empty() {
            return Ok(StreamProfile::default_preferences());
        }
        self.negotiation
            .profiles
            .iter()
            .map(|name| {
                name.parse::<StreamProfile>()
                    .map_err(|e| ConfigError::Invalid(format!("negotiation.profiles: {e}")))
            })
            .collect()
    }

    /// Initial control parameters.
    pub fn control_parameters(&self) -> Result<ControlParameters, ConfigError> {
        let target_policy = self
            .control
            .target_policy
            .parse::<TargetPolicy>()
            .map_err(|e| ConfigError::Invalid(format!("control.target_policy: {e}")))?;
        Ok(ControlParameters {
            gains: self.control.gains(),
            target_policy,
        })
    }

    /// Worker settings derived from the telemetry and tracking sections.
    pub fn telemetry_settings(&self) -> TelemetrySettings {
        TelemetrySettings {
            poll_interval: self.telemetry.poll_interval(),
            report_interval: self.telemetry.report_interval(),
            source: self.telemetry.source.clone(),
            tracking_tick: self.tracking.tick(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_file_yields_defaults() {
        let config = TrackerConfig::figment("does/not/exist.toml")
            .extract::<TrackerConfig>()
            .unwrap();
        assert_eq!(config.telemetry.poll_interval_ms, 40);
        assert_eq!(config.telemetry.report_interval_ms, 1000);
        assert_eq!(config.telemetry.source, "uvc");
        assert!(!config.tracking.enabled);
        assert_eq!(config.control.gains(), PidGains::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[telemetry]
poll_interval_ms = 20

[tracking]
enabled = true
tick_ms = 50

[control]
kp_x = 0.5
target_policy = "confidence"

[negotiation]
profiles = ["yuyv_480p30", "any"]
"#
        )
        .unwrap();

        let config = TrackerConfig::load_from(file.path()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.telemetry.poll_interval(), Duration::from_millis(20));
        // Untouched fields keep their defaults
        assert_eq!(config.telemetry.report_interval_ms, 1000);
        assert_eq!(config.tracking.tick(), Some(Duration::from_millis(50)));
        let params = config.control_parameters().unwrap();
        assert_eq!(params.gains.kp_x, 0.5);
        assert_eq!(params.gains.kd_y, 0.004);
        assert_eq!(params.target_policy, TargetPolicy::Confidence);
        assert_eq!(
            config.preferences().unwrap(),
            vec![StreamProfile::yuyv(640, 480, 30), StreamProfile::any()]
        );
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let config = TrackerConfig::load_from(path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.preferences().unwrap(), StreamProfile::default_preferences());
        assert_eq!(config.control.gains(), PidGains::default());
        assert_eq!(config.telemetry, TelemetryConfig::default());
    }

    #[test]
    fn later_providers_win() {
        let config: TrackerConfig = TrackerConfig::figment("does/not/exist.toml")
            .merge(Serialized::default("logging.level", "debug"))
            .extract()
            .unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn poll_interval_is_bounded() {
        let mut config = TrackerConfig::default();
        config.telemetry.poll_interval_ms = 0;
        assert!(config.validate().is_err());
        config.telemetry.poll_interval_ms = 150;
        assert!(config.validate().is_err());
        config.telemetry.poll_interval_ms = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn report_interval_must_cover_poll_interval() {
        let mut config = TrackerConfig::default();
        config.telemetry.report_interval_ms = 10;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("report_interval_ms"));
    }

    #[test]
    fn rejects_unknown_names() {
        let mut config = TrackerConfig::default();
        config.logging.level = "verbose".into();
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.control.target_policy = "nearest".into();
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.negotiation.profiles = vec!["mjpeg_999p30".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_file_is_a_load_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[telemetry]\npoll_interval_ms = \"fast\"").unwrap();
        assert!(matches!(
            TrackerConfig::load_from(file.path()),
            Err(ConfigError::Load(_))
        ));
    }
}

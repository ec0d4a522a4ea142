//! Environment layer of the configuration.
//!
//! Kept in its own binary: `Jail` mutates process environment variables, which
//! would leak into unit tests that load configuration concurrently.

use figment::Jail;
use std::time::Duration;
use uvc_tracker::config::TrackerConfig;
use uvc_tracker::control::TargetPolicy;
use uvc_tracker::profile::StreamProfile;

#[test]
fn env_overrides_nested_keys() {
    Jail::expect_with(|jail| {
        jail.set_env("UVC_TRACKER_TELEMETRY__POLL_INTERVAL_MS", "20");
        jail.set_env("UVC_TRACKER_CONTROL__TARGET_POLICY", "center");

        let config = TrackerConfig::load_from("absent.toml").map_err(|e| e.to_string())?;
        config.validate().map_err(|e| e.to_string())?;

        assert_eq!(config.telemetry.poll_interval(), Duration::from_millis(20));
        assert_eq!(config.telemetry.report_interval_ms, 1000);
        let params = config.control_parameters().map_err(|e| e.to_string())?;
        assert_eq!(params.target_policy, TargetPolicy::Center);
        Ok(())
    });
}

#[test]
fn env_wins_over_file() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "tracker.toml",
            r#"
[telemetry]
poll_interval_ms = 60
report_interval_ms = 500

[negotiation]
profiles = ["yuyv_480p30"]
"#,
        )?;
        jail.set_env("UVC_TRACKER_TELEMETRY__POLL_INTERVAL_MS", "25");
        jail.set_env("UVC_TRACKER_TRACKING__ENABLED", "true");

        let config = TrackerConfig::load_from("tracker.toml").map_err(|e| e.to_string())?;
        assert_eq!(config.telemetry.poll_interval_ms, 25);
        // File values the environment does not touch survive
        assert_eq!(config.telemetry.report_interval_ms, 500);
        assert!(config.tracking.enabled);
        assert_eq!(
            config.preferences().map_err(|e| e.to_string())?,
            vec![StreamProfile::yuyv(640, 480, 30)]
        );
        Ok(())
    });
}

#[test]
fn single_underscore_does_not_nest() {
    Jail::expect_with(|jail| {
        // Split on `__` only, so this names a top-level key that does not exist
        jail.set_env("UVC_TRACKER_TELEMETRY_POLL_INTERVAL_MS", "5");

        let config = TrackerConfig::load_from("absent.toml").map_err(|e| e.to_string())?;
        assert_eq!(config.telemetry.poll_interval_ms, 40);
        Ok(())
    });
}

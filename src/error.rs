//! Error types for the session manager.
//!
//! `SessionError` is the single error type produced by session internals. Using
//! `thiserror`, each variant carries a human-readable message that is forwarded
//! verbatim to the host in `state` events (`status = "error"`).
//!
//! ## Error Kinds
//!
//! - **`NoDeviceAttached`**: an operation needed a device handle but none is attached
//!   (or the attached descriptor is the invalid sentinel).
//! - **`DriverInitFailure`**: the driver collaborator could not build a stream context
//!   for the attached descriptor.
//! - **`NoCompatibleProfile`**: every profile in the preference list was rejected.
//! - **`StreamStartFailure`**: the driver refused to begin frame delivery, or the
//!   telemetry worker thread could not be spawned.
//!
//! Public session operations never surface these as `Err`: they return `bool` and
//! report the failure through the event sink. Collaborator traits return
//! `anyhow::Result`, which the session maps into one of the kinds above.

use thiserror::Error;

/// Convenience alias for results using the session error type.
pub type AppResult<T> = std::result::Result<T, SessionError>;

/// Coarse classification of a [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoDeviceAttached,
    DriverInitFailure,
    NoCompatibleProfile,
    StreamStartFailure,
    InvalidInput,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::NoDeviceAttached => "no_device_attached",
            ErrorKind::DriverInitFailure => "driver_init_failure",
            ErrorKind::NoCompatibleProfile => "no_compatible_profile",
            ErrorKind::StreamStartFailure => "stream_start_failure",
            ErrorKind::InvalidInput => "invalid_input",
        };
        write!(f, "{}", label)
    }
}

/// Primary error type for session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No usable device handle is attached.
    #[error("No USB device attached.")]
    NoDeviceAttached,

    /// The driver could not build a stream context for the descriptor.
    #[error("Driver initialization failed: {0}")]
    DriverInitFailure(String),

    /// The whole preference list was exhausted without an acknowledged profile.
    #[error("No compatible stream profile ({attempted} profiles rejected).")]
    NoCompatibleProfile {
        /// Number of profiles offered to the device.
        attempted: usize,
    },

    /// The driver refused to start frame delivery.
    #[error("Stream start failed: {0}")]
    StreamStartFailure(String),

    /// The telemetry worker thread could not be allocated.
    #[error("Stream start failed: could not spawn telemetry worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// A target policy name did not match any known policy.
    #[error("Unknown target policy '{0}'. Expected one of: largest, center, confidence.")]
    InvalidTargetPolicy(String),

    /// Manual pan/tilt values must be finite numbers.
    #[error("Invalid manual control input (pan={pan}, tilt={tilt}).")]
    InvalidManualControl {
        /// Requested pan.
        pan: f32,
        /// Requested tilt.
        tilt: f32,
    },

    /// A stream profile name could not be parsed.
    #[error("Invalid stream profile '{0}'.")]
    InvalidProfile(String),

    /// Configuration values failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl SessionError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NoDeviceAttached => ErrorKind::NoDeviceAttached,
            SessionError::DriverInitFailure(_) => ErrorKind::DriverInitFailure,
            SessionError::NoCompatibleProfile { .. } => ErrorKind::NoCompatibleProfile,
            SessionError::StreamStartFailure(_) | SessionError::WorkerSpawn(_) => {
                ErrorKind::StreamStartFailure
            }
            SessionError::InvalidTargetPolicy(_)
            | SessionError::InvalidManualControl { .. }
            | SessionError::InvalidProfile(_)
            | SessionError::Configuration(_) => ErrorKind::InvalidInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_device_message_matches_host_contract() {
        assert_eq!(
            SessionError::NoDeviceAttached.to_string(),
            "No USB device attached."
        );
    }

    #[test]
    fn worker_spawn_is_a_stream_start_failure() {
        let err = SessionError::WorkerSpawn(std::io::Error::other("out of threads"));
        assert_eq!(err.kind(), ErrorKind::StreamStartFailure);
        assert!(err.to_string().contains("out of threads"));
    }

    #[test]
    fn kinds_render_as_snake_case() {
        assert_eq!(
            SessionError::NoCompatibleProfile { attempted: 6 }.kind().to_string(),
            "no_compatible_profile"
        );
        assert_eq!(ErrorKind::DriverInitFailure.to_string(), "driver_init_failure");
    }
}

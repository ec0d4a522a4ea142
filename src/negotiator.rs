//! Stream format negotiation.
//!
//! Walks an ordered preference list and accepts the first profile the device
//! acknowledges. Probe errors are treated like rejections so that a flaky
//! control transfer on one profile does not abort the whole negotiation.

use crate::driver::StreamContext;
use crate::error::{AppResult, SessionError};
use crate::profile::StreamProfile;

/// Selects a supported profile from an ordered preference list.
#[derive(Debug, Clone)]
pub struct FormatNegotiator {
    preferences: Vec<StreamProfile>,
}

impl FormatNegotiator {
    /// Create a negotiator over `preferences`, most desirable first.
    pub fn new(preferences: Vec<StreamProfile>) -> Self {
        Self { preferences }
    }

    pub fn preferences(&self) -> &[StreamProfile] {
        &self.preferences
    }

    /// Offer each profile in order and return the first acknowledged one.
    pub fn negotiate(&self, context: &mut dyn StreamContext) -> AppResult<StreamProfile> {
        for profile in &self.preferences {
            match context.probe(profile) {
                Ok(true) => {
                    tracing::info!(profile = %profile, "Stream profile accepted");
                    return Ok(*profile);
                }
                Ok(false) => {
                    tracing::debug!(profile = %profile, "Stream profile rejected by device");
                }
                Err(e) => {
                    tracing::debug!(profile = %profile, error = %e, "Stream profile probe failed");
                }
            }
        }

        tracing::warn!(
            attempted = self.preferences.len(),
            "No compatible stream profile"
        );
        Err(SessionError::NoCompatibleProfile {
            attempted: self.preferences.len(),
        })
    }
}

impl Default for FormatNegotiator {
    fn default() -> Self {
        Self::new(StreamProfile::default_preferences())
    }
}

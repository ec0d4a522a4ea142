//! Control parameters and the demonstration tracking path.
//!
//! [`ControlParameters`] are owned by the session and read by the telemetry
//! worker as a snapshot taken under the session lock, so the worker never sees a
//! half-updated gain set.
//!
//! The tracking path is pluggable: a [`TargetEstimator`] yields candidate faces,
//! [`TargetPolicy`] picks one and [`PdController`] turns its offset from the frame
//! centre into pan/tilt. [`SyntheticTrajectory`] is the deterministic mock
//! estimator; a real detector can be swapped in without touching the worker.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// PID gains for both axes. The integral terms are carried for the host but
/// not used by the PD law.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp_x: f32,
    pub ki_x: f32,
    pub kd_x: f32,
    pub kp_y: f32,
    pub ki_y: f32,
    pub kd_y: f32,
}

impl PidGains {
    pub fn new(kp_x: f32, ki_x: f32, kd_x: f32, kp_y: f32, ki_y: f32, kd_y: f32) -> Self {
        Self {
            kp_x,
            ki_x,
            kd_x,
            kp_y,
            ki_y,
            kd_y,
        }
    }
}

impl Default for PidGains {
    fn default() -> Self {
        Self::new(0.015, 0.0, 0.004, 0.015, 0.0, 0.004)
    }
}

/// Which candidate the tracker follows when several are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPolicy {
    /// Largest bounding box.
    #[default]
    Largest,
    /// Closest to the frame centre.
    Center,
    /// Highest detector score.
    Confidence,
}

impl TargetPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetPolicy::Largest => "largest",
            TargetPolicy::Center => "center",
            TargetPolicy::Confidence => "confidence",
        }
    }

    /// Pick the candidate to follow.
    pub fn select<'a>(&self, candidates: &'a [FaceObservation]) -> Option<&'a FaceObservation> {
        let by = |f: fn(&FaceObservation) -> f64| {
            candidates
                .iter()
                .max_by(|a, b| f(a).total_cmp(&f(b)))
        };
        match self {
            TargetPolicy::Largest => by(|c| c.w * c.h),
            TargetPolicy::Confidence => by(|c| c.score),
            TargetPolicy::Center => by(|c| {
                let (dx, dy) = (c.x - 0.5, c.y - 0.5);
                -(dx * dx + dy * dy)
            }),
        }
    }
}

impl fmt::Display for TargetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetPolicy {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "largest" => Ok(TargetPolicy::Largest),
            "center" | "centre" => Ok(TargetPolicy::Center),
            "confidence" | "score" => Ok(TargetPolicy::Confidence),
            _ => Err(SessionError::InvalidTargetPolicy(s.to_string())),
        }
    }
}

/// Mutable control state owned by the session.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlParameters {
    pub gains: PidGains,
    pub target_policy: TargetPolicy,
}

/// A detected target, normalised to [0, 1] frame coordinates (x/y are the centre).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceObservation {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub score: f64,
}

/// Source of target candidates for the tracking tick.
pub trait TargetEstimator: Send {
    /// Candidates visible at tick `tick`. May be empty.
    fn estimate(&mut self, tick: u64) -> Vec<FaceObservation>;
}

/// Deterministic demonstration trajectory: a single target drifting on a
/// Lissajous-like path around the upper half of the frame.
#[derive(Debug, Clone)]
pub struct SyntheticTrajectory {
    /// Phase advance per tick, in radians.
    pub step: f64,
}

impl Default for SyntheticTrajectory {
    fn default() -> Self {
        Self { step: 0.07 }
    }
}

impl SyntheticTrajectory {
    /// Target position at tick `tick`.
    pub fn position(&self, tick: u64) -> FaceObservation {
        let t = tick as f64 * self.step;
        FaceObservation {
            x: 0.45 + 0.15 * t.sin(),
            y: 0.35 + 0.10 * (t * 0.8).cos(),
            w: 0.20,
            h: 0.25,
            score: 0.92,
        }
    }
}

impl TargetEstimator for SyntheticTrajectory {
    fn estimate(&mut self, tick: u64) -> Vec<FaceObservation> {
        vec![self.position(tick)]
    }
}

/// Pan/tilt actuation computed for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Actuation {
    pub pan: f64,
    pub tilt: f64,
}

/// Proportional-derivative law on the target's offset from the frame centre.
#[derive(Debug, Clone, Default)]
pub struct PdController {
    previous_error: Option<(f64, f64)>,
}

impl PdController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous error, e.g. when the target is lost.
    pub fn reset(&mut self) {
        self.previous_error = None;
    }

    /// Compute pan/tilt for `target` using `gains`, `dt` after the previous update.
    pub fn update(
        &mut self,
        target: &FaceObservation,
        gains: &PidGains,
        dt: Duration,
    ) -> Actuation {
        let err = (target.x - 0.5, target.y - 0.5);
        let dt_s = dt.as_secs_f64();
        let rate = match self.previous_error {
            Some(prev) if dt_s > 0.0 => ((err.0 - prev.0) / dt_s, (err.1 - prev.1) / dt_s),
            _ => (0.0, 0.0),
        };
        self.previous_error = Some(err);

        Actuation {
            pan: -(f64::from(gains.kp_x) * err.0 + f64::from(gains.kd_x) * rate.0),
            tilt: -(f64::from(gains.kp_y) * err.1 + f64::from(gains.kd_y) * rate.1),
        }
    }
}

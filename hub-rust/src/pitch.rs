//! Quaternion → pitch conversion.
//!
//! Pitch is the arm's tilt about its lateral axis, reported as integer degrees on
//! [0,180] with 90 = level. Hanging arm reads low, arm raised overhead reads high.

use std::f64::consts::PI;

use armband_types::Quat;
use serde::Serialize;

/// Integer pitch in degrees, always within [0,180].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PitchAngle(u8);

impl PitchAngle {
    pub const MIN: PitchAngle = PitchAngle(0);
    pub const MAX: PitchAngle = PitchAngle(180);
    /// Level arm; a tracker reads this until its first orientation sample
    pub const NEUTRAL: PitchAngle = PitchAngle(90);

    /// Saturating constructor.
    pub fn from_degrees(deg: i32) -> Self {
        PitchAngle(deg.clamp(0, 180) as u8)
    }

    pub fn degrees(self) -> i32 {
        self.0 as i32
    }
}

impl Default for PitchAngle {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Pitch of a unit attitude quaternion.
///
/// `asin(clamp(2(wy - zx), -1, 1))` shifted by π/2 and scaled onto [0,180], rounded.
/// A NaN result reads as level; infinities clamp like any other out-of-domain value.
pub fn pitch_of(q: &Quat) -> PitchAngle {
    let (w, x, y, z) = (q.w as f64, q.x as f64, q.y as f64, q.z as f64);
    let s = 2.0 * (w * y - z * x);
    if s.is_nan() {
        return PitchAngle::NEUTRAL;
    }
    let pitch_rad = s.clamp(-1.0, 1.0).asin();
    let deg = ((pitch_rad + PI / 2.0) / PI * 180.0).round();
    PitchAngle::from_degrees(deg as i32)
}

//! # tracker
//!
//! Per-armband gesture state machine.
//!
//! ```text
//!            pitch leaves band                 counter hits timeout / matched
//!   Idle <──────────────────── Raising        ┌──────────────────────────────┐
//!    │  pitch in band            │            │                              │
//!    └──────────────────────────>│ warm-up    v                              │
//!                                └────────> Analyzing ── ready while fist ───┘
//!                                            and counter in window
//! ```
//!
//! Counting is in ticks, never wall-clock. One counter drives both phases: it counts
//! consecutive in-band ticks until warm-up completes, then keeps counting through the
//! analysis phase where it gates readiness and the timeout.

use armband_types::Pose;
use serde::Serialize;

use crate::config::GestureConfig;
use crate::pitch::PitchAngle;

/// Coarse phase, derived from the state fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GesturePhase {
    Idle,
    Raising,
    Analyzing,
}

/// Bounds of the pitch observed during one analysis phase. `high >= low` always.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwingRange {
    pub high: i32,
    pub low: i32,
}

impl SwingRange {
    pub fn amplitude(&self) -> i32 {
        self.high - self.low
    }
}

/// What a single `advance` did, for logging by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Steady,
    AnalysisStarted,
    TimedOut,
}

#[derive(Debug, Clone, Default)]
pub struct GestureState {
    pitch: PitchAngle,
    pose: Pose,
    arc_counter: u32,
    analyzing: bool,
    range: Option<SwingRange>,
    ready: bool,
}

impl GestureState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_pitch(&mut self, pitch: PitchAngle) {
        self.pitch = pitch;
    }

    pub fn observe_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn pitch(&self) -> PitchAngle {
        self.pitch
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn arc_counter(&self) -> u32 {
        self.arc_counter
    }

    pub fn is_analyzing(&self) -> bool {
        self.analyzing
    }

    pub fn range(&self) -> Option<SwingRange> {
        self.range
    }

    /// Pitch swing of the current analysis; 0 when not analyzing.
    pub fn swing_amplitude(&self) -> i32 {
        self.range.map_or(0, |r| r.amplitude())
    }

    /// Ready to be matched on the tick most recently advanced.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn phase(&self) -> GesturePhase {
        if self.analyzing {
            GesturePhase::Analyzing
        } else if self.arc_counter > 0 {
            GesturePhase::Raising
        } else {
            GesturePhase::Idle
        }
    }

    /// Back to idle. Last pitch and pose are kept; they describe the arm, not the gesture.
    pub fn reset(&mut self) {
        self.analyzing = false;
        self.arc_counter = 0;
        self.range = None;
        self.ready = false;
    }

    /// Advance one tick.
    pub fn advance(&mut self, cfg: &GestureConfig) -> StepOutcome {
        let mut outcome = StepOutcome::Steady;
        let pitch = self.pitch.degrees();

        if !self.analyzing {
            if pitch > cfg.raise_band_low && pitch < cfg.raise_band_high {
                self.arc_counter += 1;
            } else {
                // No partial credit for a raise that dipped out of the band
                self.arc_counter = 0;
            }
            if self.arc_counter < cfg.warmup_ticks {
                self.ready = false;
                return outcome;
            }
            // Warm-up done: this same tick is the first analysis tick
            self.analyzing = true;
            outcome = StepOutcome::AnalysisStarted;
        }

        self.range = Some(match self.range {
            None => SwingRange { high: pitch, low: pitch },
            Some(mut r) => {
                if pitch > r.high && pitch < cfg.range_clip_high {
                    r.high = pitch;
                }
                if pitch < r.low && pitch > cfg.range_clip_low {
                    r.low = pitch;
                }
                r
            }
        });

        self.ready = self.pose == Pose::Fist
            && self.arc_counter > cfg.ready_after_ticks
            && self.arc_counter < cfg.analysis_timeout_ticks;

        if !self.ready && self.arc_counter >= cfg.analysis_timeout_ticks {
            self.reset();
            return StepOutcome::TimedOut;
        }

        self.arc_counter += 1;
        outcome
    }
}

/// Drive a fresh tracker through warm-up and a swing of `amplitude` degrees
/// (at most 78) until it is ready with a fist, 60 ticks in.
#[cfg(test)]
pub(crate) fn ready_with_amplitude(cfg: &GestureConfig, amplitude: i32) -> GestureState {
    let high = 90 + amplitude.min(39);
    let low = 90 - (amplitude - (high - 90));
    let mut s = GestureState::new();
    s.observe_pose(Pose::Fist);
    s.observe_pitch(PitchAngle::NEUTRAL);
    for tick in 1..=60 {
        let deg = match tick {
            30 => high,
            31 => low,
            _ => 90,
        };
        s.observe_pitch(PitchAngle::from_degrees(deg));
        s.advance(cfg);
    }
    debug_assert!(s.is_ready());
    debug_assert_eq!(s.swing_amplitude(), amplitude);
    s
}

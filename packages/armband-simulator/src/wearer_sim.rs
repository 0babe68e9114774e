//! wearer_sim.rs — Synthetic armband wearers
//!
//! Simulates N people wearing an armband each. Every wearer follows a scripted
//! routine measured in ticks:
//! - Rest: arm hanging down
//! - Raise: pitch ramps from the rest angle up to level
//! - Swing: sinusoidal pitch about level, fist closed after a delay
//! - Lower: pitch ramps back down, hand opens
//!
//! The armband side is modelled too: it pairs on the first tick, starts locked,
//! reports poses only while unlocked and obeys the hub's unlock / lock / vibrate
//! commands. Disconnecting relocks the armband.

use armband_types::{CommandEnvelope, DeviceCommand, DeviceHandle, FirmwareVersion, HubEvent, Pose, Quat};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::scenarios::{Scenario, WearerScript};

/// Level arm, on the hub's 0–180 pitch scale.
pub const LEVEL_DEG: f32 = 90.0;

/// Steps until a timed unlock (`hold: false`) relocks, counted from the first step after it was applied.
pub const TIMED_UNLOCK_TICKS: u64 = 200;

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Arm-down pitch on the 0–180 scale
    pub rest_pitch_deg: f32,
    /// Gaussian pitch noise, 1σ degrees (0 = exact)
    pub noise_deg: f32,
    /// Gaussian roll wobble, 1σ degrees
    pub roll_jitter_deg: f32,
    /// Emit an orientation sample every N ticks (Myo streams at 50 Hz)
    pub orientation_every_ticks: u64,
    /// Skip the lock model and report poses from the start
    pub start_unlocked: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            rest_pitch_deg: 20.0,
            noise_deg: 1.0,
            roll_jitter_deg: 3.0,
            orientation_every_ticks: 2,
            start_unlocked: false,
        }
    }
}

// ── Routine ───────────────────────────────────────────────────────────────────

/// Where a wearer is in their routine. The payload is ticks into that step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", content = "tick", rename_all = "snake_case")]
pub enum Motion {
    Rest,
    Raise(u64),
    Swing(u64),
    Lower(u64),
}

impl WearerScript {
    /// Routine step at `elapsed` ticks since the script started.
    pub fn motion_at(&self, elapsed: u64) -> Motion {
        let mut t = elapsed;
        if t < self.raise_ticks {
            return Motion::Raise(t);
        }
        t -= self.raise_ticks;
        if t < self.swing_ticks {
            return Motion::Swing(t);
        }
        t -= self.swing_ticks;
        if t < self.lower_ticks {
            return Motion::Lower(t);
        }
        Motion::Rest
    }

    /// Noise-free pitch (0–180 scale) for a routine step.
    pub fn pitch_at(&self, motion: Motion, rest_deg: f32) -> f32 {
        let span = LEVEL_DEG - rest_deg;
        match motion {
            Motion::Rest => rest_deg,
            Motion::Raise(k) => rest_deg + span * (k + 1) as f32 / self.raise_ticks as f32,
            Motion::Swing(k) => {
                let phase = std::f32::consts::TAU * k as f32 / self.swing_period_ticks.max(1) as f32;
                LEVEL_DEG + self.amplitude_deg / 2.0 * phase.sin()
            }
            Motion::Lower(k) => LEVEL_DEG - span * (k + 1) as f32 / self.lower_ticks as f32,
        }
    }

    pub fn pose_at(&self, motion: Motion) -> Pose {
        match motion {
            Motion::Swing(k) if k >= self.fist_after_ticks => Pose::Fist,
            _ => Pose::Rest,
        }
    }

    /// Whether the armband is in radio range at `elapsed` ticks since start.
    pub fn online_at(&self, elapsed: u64) -> bool {
        self.offline.map_or(true, |(from, to)| elapsed < from || elapsed >= to)
    }
}

/// Attitude quaternion for a 0–180 pitch with the given roll and yaw (radians).
pub fn quat_for_pitch(pitch_deg: f32, roll: f32, yaw: f32) -> Quat {
    Quat::from_euler(roll, (pitch_deg - LEVEL_DEG).to_radians(), yaw)
}

// ── Wearer ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lock {
    Locked,
    /// `None` = held until told otherwise
    Unlocked { until: Option<u64> },
}

#[derive(Debug, Clone)]
pub struct Wearer {
    pub handle: DeviceHandle,
    pub firmware: FirmwareVersion,
    pub script: WearerScript,
    paired: bool,
    connected: bool,
    lock: Lock,
    reported_pose: Option<Pose>,
    /// Facing direction, fixed per wearer
    yaw: f32,
    motion: Motion,
    pitch_deg: f32,
    buzzes: u32,
}

/// Per-wearer row for the control panel.
#[derive(Debug, Clone, Serialize)]
pub struct WearerStatus {
    pub handle: DeviceHandle,
    pub connected: bool,
    pub locked: bool,
    pub motion: Motion,
    pub pitch_deg: f32,
    pub pose: Option<Pose>,
    pub buzzes: u32,
}

impl Wearer {
    fn new(script: WearerScript, yaw: f32, unlocked: bool) -> Self {
        Self {
            handle: DeviceHandle(script.handle),
            firmware: FirmwareVersion { major: 1, minor: 5, patch: 1970, hardware_rev: 2 },
            script,
            paired: false,
            connected: false,
            lock: if unlocked { Lock::Unlocked { until: None } } else { Lock::Locked },
            reported_pose: None,
            yaw,
            motion: Motion::Rest,
            pitch_deg: 0.0,
            buzzes: 0,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock == Lock::Locked
    }

    pub fn status(&self) -> WearerStatus {
        WearerStatus {
            handle: self.handle,
            connected: self.connected,
            locked: self.is_locked(),
            motion: self.motion,
            pitch_deg: self.pitch_deg,
            pose: self.reported_pose,
            buzzes: self.buzzes,
        }
    }
}

// ── Fleet ─────────────────────────────────────────────────────────────────────

pub struct WearerSim {
    pub wearers: Vec<Wearer>,
    /// Ticks stepped so far
    pub tick: u64,
    cycle_ticks: u64,
    motion: MotionConfig,
    pitch_noise: Option<Normal<f32>>,
    roll_noise: Option<Normal<f32>>,
    rng: StdRng,
}

impl WearerSim {
    pub fn new(scenario: &Scenario, motion: &MotionConfig, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let wearers = scenario
            .wearers
            .iter()
            .map(|script| {
                let yaw = rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);
                Wearer::new(script.clone(), yaw, motion.start_unlocked)
            })
            .collect();
        let gaussian = |sigma: f32| (sigma > 0.0).then(|| Normal::new(0.0, sigma).ok()).flatten();
        Self {
            wearers,
            tick: 0,
            cycle_ticks: scenario.cycle_ticks,
            pitch_noise: gaussian(motion.noise_deg),
            roll_noise: gaussian(motion.roll_jitter_deg.to_radians()),
            motion: motion.clone(),
            rng,
        }
    }

    /// Position of the current tick inside the scenario cycle.
    fn scenario_time(&self) -> u64 {
        if self.cycle_ticks > 0 {
            self.tick % self.cycle_ticks
        } else {
            self.tick
        }
    }

    /// Advance every wearer one tick and return the device events it produced.
    pub fn step(&mut self) -> Vec<HubEvent> {
        let now = self.tick;
        let t = self.scenario_time();
        let every = self.motion.orientation_every_ticks.max(1);
        let mut events = Vec::new();

        for w in &mut self.wearers {
            if !w.paired {
                events.push(HubEvent::Paired { handle: w.handle, firmware: w.firmware });
                w.paired = true;
            }

            let elapsed = t.checked_sub(w.script.start_tick);
            let online = elapsed.map_or(true, |e| w.script.online_at(e));
            if w.connected && !online {
                events.push(HubEvent::Disconnected { handle: w.handle });
                w.connected = false;
                w.lock = Lock::Locked;
                w.reported_pose = None;
                info!("📴 Wearer {} out of range", w.handle);
            } else if !w.connected && online {
                events.push(HubEvent::Connected { handle: w.handle, firmware: w.firmware });
                w.connected = true;
                if self.motion.start_unlocked {
                    w.lock = Lock::Unlocked { until: None };
                }
            }
            if !w.connected {
                continue;
            }

            if let Lock::Unlocked { until: Some(end) } = w.lock {
                if now >= end {
                    w.lock = Lock::Locked;
                    debug!("Wearer {}: timed unlock expired", w.handle);
                }
            }

            w.motion = elapsed.map_or(Motion::Rest, |e| w.script.motion_at(e));
            w.pitch_deg = w.script.pitch_at(w.motion, self.motion.rest_pitch_deg);

            if now % every == 0 {
                let noise = self.pitch_noise.map_or(0.0, |n| n.sample(&mut self.rng));
                let roll = self.roll_noise.map_or(0.0, |n| n.sample(&mut self.rng));
                let pitch = (w.pitch_deg + noise).clamp(0.0, 180.0);
                events.push(HubEvent::Orientation { handle: w.handle, quat: quat_for_pitch(pitch, roll, w.yaw) });
            }

            let pose = w.script.pose_at(w.motion);
            if !w.is_locked() && w.reported_pose != Some(pose) {
                events.push(HubEvent::PoseChanged { handle: w.handle, pose });
                w.reported_pose = Some(pose);
            }
        }

        self.tick += 1;
        events
    }

    /// Apply a command from the hub. Returns `false` if no connected wearer has that handle.
    pub fn apply(&mut self, cmd: &CommandEnvelope) -> bool {
        let now = self.tick;
        let Some(w) = self.wearers.iter_mut().find(|w| w.handle == cmd.handle && w.connected) else {
            return false;
        };
        match cmd.command {
            DeviceCommand::NotifyUserAction => {
                w.buzzes += 1;
                info!("📳 Wearer {} buzzed (handshake #{})", w.handle, w.buzzes);
            }
            DeviceCommand::Unlock { hold } => {
                let until = (!hold).then_some(now + TIMED_UNLOCK_TICKS - 1);
                if w.is_locked() {
                    debug!("Wearer {} unlocked (hold: {hold})", w.handle);
                }
                w.lock = Lock::Unlocked { until };
            }
            DeviceCommand::Lock => {
                w.lock = Lock::Locked;
                debug!("Wearer {} locked", w.handle);
            }
        }
        true
    }

    pub fn snapshot(&self) -> Vec<WearerStatus> {
        self.wearers.iter().map(Wearer::status).collect()
    }
}

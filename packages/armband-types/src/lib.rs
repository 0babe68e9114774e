//! # armband-types
//!
//! Shared wire vocabulary for the MyoMeet handshake system.
//!
//! These types are used by:
//! - `hub-rust`: receiving device events over UDP and sending commands back
//! - `packages/armband-simulator`: producing device events for synthetic wearers
//! - observers of the hub's `/ws` endpoint, which receive [`HandshakeNotice`] JSON
//!
//! ## Orientation conventions
//!
//! - Quaternions are unit attitude quaternions `(w, x, y, z)` as reported by the armband IMU.
//! - Euler decomposition is ZYX (yaw, then pitch, then roll); pitch is rotation about the
//!   lateral axis and is what the hub scores.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Device handle ─────────────────────────────────────────────────────────────

/// Opaque per-armband handle. In practice the 48-bit radio address.
///
/// Two handles refer to the same physical armband iff they compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceHandle(pub u64);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// Firmware reported by an armband when it pairs or connects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    /// Hardware revision (1 = rev C, 2 = rev D)
    pub hardware_rev: u16,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ── Quaternion ────────────────────────────────────────────────────────────────

/// Orientation quaternion (IMU output, normalized)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quat {
    pub fn identity() -> Self {
        Self { w: 1.0, x: 0.0, y: 0.0, z: 0.0 }
    }

    /// Build from Euler angles (roll, pitch, yaw), radians, applied in ZYX order.
    pub fn from_euler(roll: f32, pitch: f32, yaw: f32) -> Self {
        let (cr, sr) = ((roll / 2.0).cos(), (roll / 2.0).sin());
        let (cp, sp) = ((pitch / 2.0).cos(), (pitch / 2.0).sin());
        let (cy, sy) = ((yaw / 2.0).cos(), (yaw / 2.0).sin());
        Self {
            w: cr * cp * cy + sr * sp * sy,
            x: sr * cp * cy - cr * sp * sy,
            y: cr * sp * cy + sr * cp * sy,
            z: cr * cp * sy - sr * sp * cy,
        }
    }

    pub fn norm(&self) -> f32 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

// ── Hand pose ─────────────────────────────────────────────────────────────────

/// Discrete hand pose classified on the armband.
///
/// Only [`Pose::Fist`] takes part in handshake detection; the others are carried through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pose {
    Rest,
    Fist,
    WaveIn,
    WaveOut,
    FingersSpread,
    DoubleTap,
    #[default]
    Unknown,
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Pose::Rest => "rest",
            Pose::Fist => "fist",
            Pose::WaveIn => "waveIn",
            Pose::WaveOut => "waveOut",
            Pose::FingersSpread => "fingersSpread",
            Pose::DoubleTap => "doubleTap",
            Pose::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

// ── Device → hub ──────────────────────────────────────────────────────────────

/// One inbound event from the device hub.
///
/// `Tick` never travels on the wire from a device; the hub's own driver loop produces it.
/// It appears in recordings so a replay reproduces the recorded tick boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    /// Fired exactly once per armband, before any other event for that handle.
    Paired { handle: DeviceHandle, firmware: FirmwareVersion },
    Connected { handle: DeviceHandle, firmware: FirmwareVersion },
    Disconnected { handle: DeviceHandle },
    Orientation { handle: DeviceHandle, quat: Quat },
    PoseChanged { handle: DeviceHandle, pose: Pose },
    Tick,
}

impl HubEvent {
    /// Handle of the armband this event concerns; `None` for `Tick`.
    pub fn handle(&self) -> Option<DeviceHandle> {
        match self {
            HubEvent::Paired { handle, .. }
            | HubEvent::Connected { handle, .. }
            | HubEvent::Disconnected { handle }
            | HubEvent::Orientation { handle, .. }
            | HubEvent::PoseChanged { handle, .. } => Some(*handle),
            HubEvent::Tick => None,
        }
    }
}

/// UDP datagram from a device link to the hub (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Monotonically increasing per-link sequence number.
    /// Hub drops duplicates and large backward jumps.
    pub seq_num: u32,
    pub event: HubEvent,
}

// ── Hub → device ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DeviceCommand {
    /// Short haptic pulse acknowledging a recognized handshake
    NotifyUserAction,
    /// Keep the armband unlocked so pose events keep flowing.
    /// `hold = false` relocks after the next pose.
    Unlock { hold: bool },
    Lock,
}

/// UDP datagram from the hub back to a device link (JSON).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub handle: DeviceHandle,
    pub command: DeviceCommand,
}

// ── Handshake notice (hub → observers) ───────────────────────────────────────

/// One side of a recognized handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeParty {
    /// Hub-assigned sequential id (1-based, order of pairing)
    pub device_id: u32,
    pub handle: DeviceHandle,
    /// Pitch swing (degrees) measured for this side during the gesture
    pub swing_amplitude: i32,
}

/// Published by the hub every time two armbands are matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeNotice {
    pub id: Uuid,
    /// Hub tick on which the match was made
    pub tick: u64,
    pub first: NoticeParty,
    pub second: NoticeParty,
    /// Wall-clock time of recognition, for reporting only
    pub recognized_at: DateTime<Utc>,
}

//! # meet-hub
//!
//! Two-party handshake detection across independent motion-sensing armbands.
//!
//! Each armband streams orientation and hand-pose events. A per-armband state machine
//! ([`tracker`]) watches for a sustained arm raise, then measures the pitch swing that
//! follows; once the wearer closes a fist inside the matching window the armband is
//! *ready*. Once per tick the [`correlator`] pairs ready armbands whose swings agree and
//! signals both.
//!
//! ```text
//!  UDP datagrams ─▶ hub ─▶ mpsc ─▶ tick loop ─▶ HandshakeEngine ─▶ feedback ─▶ armbands
//!                                      │          (registry, trackers,      └─▶ /ws observers
//!                      recording ─▶ replay        correlator)
//! ```
//!
//! All timing is counted in ticks of the driver loop; nothing here reads a clock to make
//! a matching decision.

pub mod config;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod hub;
pub mod pitch;
pub mod registry;
pub mod replay;
pub mod tracker;

#[cfg(test)]
mod integration_tests;

pub use config::{DetectorConfig, DisconnectPolicy, GestureConfig, HubConfig, MatchConfig};
pub use correlator::Handshake;
pub use engine::{DeviceStatus, EventConsumer, HandshakeEngine};
pub use error::{MeetError, MeetResult};
pub use pitch::{pitch_of, PitchAngle};
pub use registry::{DeviceId, DeviceRegistry};
pub use tracker::{GesturePhase, GestureState};

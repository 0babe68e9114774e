//! # engine
//!
//! The handshake engine: registry + per-device trackers + correlator behind one
//! event-consumer interface.
//!
//! Event delivery only writes tracker inputs (pitch, pose, connection flag). All state
//! machine progress happens on `Tick`, which advances every tracker in registry order
//! and then runs one correlation pass. The driver must deliver a tick's events before
//! the tick itself.

use armband_types::{DeviceHandle, FirmwareVersion, HubEvent, Pose, Quat};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DetectorConfig, DisconnectPolicy, GestureConfig, MatchConfig};
use crate::correlator::{correlate, Handshake};
use crate::error::{MeetError, MeetResult};
use crate::pitch::{pitch_of, PitchAngle};
use crate::registry::{DeviceId, DeviceRegistry};
use crate::tracker::{GesturePhase, StepOutcome};

/// Anything that accepts hub events. `Tick` returns the handshakes it produced;
/// every other event returns an empty list.
pub trait EventConsumer {
    fn consume(&mut self, event: HubEvent) -> MeetResult<Vec<Handshake>>;
}

/// Per-device row for status output.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub id: DeviceId,
    pub handle: DeviceHandle,
    pub connected: bool,
    pub phase: GesturePhase,
    pub pitch: PitchAngle,
    pub pose: Pose,
    pub arc_counter: u32,
    pub swing_amplitude: i32,
    pub ready: bool,
}

#[derive(Debug, Clone)]
pub struct HandshakeEngine {
    registry: DeviceRegistry<DeviceHandle>,
    gesture: GestureConfig,
    matching: MatchConfig,
    disconnect_policy: DisconnectPolicy,
    tick: u64,
}

impl HandshakeEngine {
    pub fn new(cfg: &DetectorConfig) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            gesture: cfg.gesture.clone(),
            matching: cfg.matching.clone(),
            disconnect_policy: cfg.disconnect_policy,
            tick: 0,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry<DeviceHandle> {
        &self.registry
    }

    /// Ticks processed so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    fn require(&self, handle: DeviceHandle) -> MeetResult<DeviceId> {
        self.registry.lookup(&handle).ok_or(MeetError::UnknownDevice(handle))
    }

    /// Register a newly paired armband. Pairing twice is harmless.
    pub fn pair(&mut self, handle: DeviceHandle, firmware: FirmwareVersion) -> DeviceId {
        let known = self.registry.is_known(&handle);
        let id = self.registry.identify(&handle);
        if known {
            debug!("Armband {handle} paired again (id {id})");
        } else {
            info!("Paired with {handle} as armband {id} (firmware {firmware})");
        }
        id
    }

    pub fn connect(&mut self, handle: DeviceHandle, firmware: FirmwareVersion) -> MeetResult<DeviceId> {
        let id = self.require(handle)?;
        if let Some(slot) = self.registry.slot_mut(id) {
            slot.connected = true;
        }
        info!("Armband {id} has connected (firmware {firmware})");
        Ok(id)
    }

    pub fn disconnect(&mut self, handle: DeviceHandle) -> MeetResult<DeviceId> {
        let id = self.require(handle)?;
        let policy = self.disconnect_policy;
        if let Some(slot) = self.registry.slot_mut(id) {
            slot.connected = false;
            if policy == DisconnectPolicy::Reset {
                slot.state.reset();
                slot.state.observe_pose(Pose::Unknown);
            }
        }
        info!("Armband {id} has disconnected ({policy:?} gesture state)");
        Ok(id)
    }

    pub fn orientation(&mut self, handle: DeviceHandle, quat: &Quat) -> MeetResult<PitchAngle> {
        let id = self.require(handle)?;
        let pitch = pitch_of(quat);
        if let Some(state) = self.registry.state_mut(id) {
            state.observe_pitch(pitch);
        }
        Ok(pitch)
    }

    pub fn pose(&mut self, handle: DeviceHandle, pose: Pose) -> MeetResult<()> {
        let id = self.require(handle)?;
        if let Some(state) = self.registry.state_mut(id) {
            state.observe_pose(pose);
        }
        debug!("Armband {id} pose → {pose}");
        Ok(())
    }

    /// Advance every tracker one tick, then correlate.
    pub fn tick(&mut self) -> Vec<Handshake> {
        self.tick += 1;
        let gesture = &self.gesture;
        for (id, slot) in self.registry.iter_mut() {
            match slot.state.advance(gesture) {
                StepOutcome::AnalysisStarted => {
                    debug!("Armband {id}: arm raised, tracking swing from {}°", slot.state.pitch().degrees());
                }
                StepOutcome::TimedOut => {
                    debug!("Armband {id}: gesture window expired without a partner");
                }
                StepOutcome::Steady => {}
            }
        }

        let matches = correlate(&mut self.registry, &self.matching, self.tick);
        for m in &matches {
            info!(
                "🤝 Handshake recognized: armband {} ({}°) ↔ armband {} ({}°) at tick {}",
                m.first, m.first_amplitude, m.second, m.second_amplitude, m.tick
            );
        }
        matches
    }

    pub fn snapshot(&self) -> Vec<DeviceStatus> {
        self.registry
            .iter()
            .map(|(id, slot)| DeviceStatus {
                id,
                handle: slot.handle,
                connected: slot.connected,
                phase: slot.state.phase(),
                pitch: slot.state.pitch(),
                pose: slot.state.pose(),
                arc_counter: slot.state.arc_counter(),
                swing_amplitude: slot.state.swing_amplitude(),
                ready: slot.state.is_ready(),
            })
            .collect()
    }
}

impl EventConsumer for HandshakeEngine {
    fn consume(&mut self, event: HubEvent) -> MeetResult<Vec<Handshake>> {
        match event {
            HubEvent::Paired { handle, firmware } => {
                self.pair(handle, firmware);
            }
            HubEvent::Connected { handle, firmware } => {
                self.connect(handle, firmware)?;
            }
            HubEvent::Disconnected { handle } => {
                self.disconnect(handle)?;
            }
            HubEvent::Orientation { handle, quat } => {
                self.orientation(handle, &quat)?;
            }
            HubEvent::PoseChanged { handle, pose } => {
                self.pose(handle, pose)?;
            }
            HubEvent::Tick => return Ok(self.tick()),
        }
        Ok(Vec::new())
    }
}

/// Deliver a batch of events, logging and skipping the ones the engine rejects.
/// Returns every handshake produced by ticks in the batch.
pub fn deliver_all<C: EventConsumer>(consumer: &mut C, events: impl IntoIterator<Item = HubEvent>) -> Vec<Handshake> {
    let mut out = Vec::new();
    for event in events {
        match consumer.consume(event) {
            Ok(mut matches) => out.append(&mut matches),
            Err(e) => warn!("Dropped event: {e}"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEFT: DeviceHandle = DeviceHandle(0xa1);
    const RIGHT: DeviceHandle = DeviceHandle(0xb2);

    fn engine(policy: DisconnectPolicy) -> HandshakeEngine {
        let cfg = DetectorConfig { disconnect_policy: policy, ..Default::default() };
        HandshakeEngine::new(&cfg)
    }

    fn level() -> Quat {
        Quat::identity()
    }

    #[test]
    fn events_for_unpaired_device_are_rejected() {
        let mut e = engine(DisconnectPolicy::Persist);
        let err = e.orientation(LEFT, &level()).unwrap_err();
        assert!(matches!(err, MeetError::UnknownDevice(h) if h == LEFT));
        assert!(e.pose(LEFT, Pose::Fist).is_err());
        assert!(e.connect(LEFT, FirmwareVersion::default()).is_err());
        assert!(e.registry().is_empty());
    }

    #[test]
    fn pairing_assigns_ids_in_order() {
        let mut e = engine(DisconnectPolicy::Persist);
        assert_eq!(e.pair(RIGHT, FirmwareVersion::default()).get(), 1);
        assert_eq!(e.pair(LEFT, FirmwareVersion::default()).get(), 2);
        assert_eq!(e.pair(RIGHT, FirmwareVersion::default()).get(), 1);
        assert_eq!(e.registry().len(), 2);
    }

    #[test]
    fn orientation_and_pose_update_inputs_only() {
        let mut e = engine(DisconnectPolicy::Persist);
        let id = e.pair(LEFT, FirmwareVersion::default());
        let raised = Quat::from_euler(0.0, 10f32.to_radians(), 0.0);
        assert_eq!(e.orientation(LEFT, &raised).unwrap().degrees(), 100);
        e.pose(LEFT, Pose::WaveIn).unwrap();
        let s = e.registry().state(id).unwrap();
        assert_eq!(s.pitch().degrees(), 100);
        assert_eq!(s.pose(), Pose::WaveIn);
        assert_eq!(s.arc_counter(), 0);
    }

    #[test]
    fn tick_counts_and_advances() {
        let mut e = engine(DisconnectPolicy::Persist);
        let id = e.pair(LEFT, FirmwareVersion::default());
        for _ in 0..3 {
            assert!(e.consume(HubEvent::Tick).unwrap().is_empty());
        }
        assert_eq!(e.ticks(), 3);
        // Neutral pitch is inside the raise band
        assert_eq!(e.registry().state(id).unwrap().arc_counter(), 3);
    }

    fn raise_for(e: &mut HandshakeEngine, ticks: usize) {
        for _ in 0..ticks {
            e.orientation(LEFT, &level()).unwrap();
            e.tick();
        }
    }

    #[test]
    fn persist_policy_keeps_gesture_across_disconnect() {
        let mut e = engine(DisconnectPolicy::Persist);
        let id = e.pair(LEFT, FirmwareVersion::default());
        e.connect(LEFT, FirmwareVersion::default()).unwrap();
        e.pose(LEFT, Pose::Fist).unwrap();
        raise_for(&mut e, 40);
        e.disconnect(LEFT).unwrap();
        let slot = e.registry().slot(id).unwrap();
        assert!(!slot.connected);
        assert!(slot.state.is_analyzing());
        assert_eq!(slot.state.pose(), Pose::Fist);
    }

    #[test]
    fn reset_policy_clears_gesture_on_disconnect() {
        let mut e = engine(DisconnectPolicy::Reset);
        let id = e.pair(LEFT, FirmwareVersion::default());
        e.pose(LEFT, Pose::Fist).unwrap();
        raise_for(&mut e, 40);
        e.disconnect(LEFT).unwrap();
        let s = e.registry().state(id).unwrap();
        assert_eq!(s.phase(), GesturePhase::Idle);
        assert_eq!(s.pose(), Pose::Unknown);
        // Identity survives
        assert_eq!(e.pair(LEFT, FirmwareVersion::default()), id);
    }

    #[test]
    fn deliver_all_skips_bad_events() {
        let mut e = engine(DisconnectPolicy::Persist);
        let out = deliver_all(
            &mut e,
            vec![
                HubEvent::PoseChanged { handle: RIGHT, pose: Pose::Fist },
                HubEvent::Paired { handle: LEFT, firmware: FirmwareVersion::default() },
                HubEvent::Tick,
            ],
        );
        assert!(out.is_empty());
        assert_eq!(e.registry().len(), 1);
        assert_eq!(e.ticks(), 1);
    }

    #[test]
    fn snapshot_lists_devices_in_order() {
        let mut e = engine(DisconnectPolicy::Persist);
        e.pair(RIGHT, FirmwareVersion::default());
        e.pair(LEFT, FirmwareVersion::default());
        e.connect(LEFT, FirmwareVersion::default()).unwrap();
        let snap = e.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].handle, RIGHT);
        assert!(!snap[0].connected);
        assert!(snap[1].connected);
        assert_eq!(snap[1].phase, GesturePhase::Idle);
    }
}

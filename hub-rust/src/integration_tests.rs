/// End-to-end gesture scenarios through the engine and the replay path.
/// Each scenario is a scripted event stream (orientation samples, pose transitions,
/// connection events and ticks) built the way the driver loop delivers it.

#[cfg(test)]
mod integration_tests {
    use armband_types::{DeviceHandle, FirmwareVersion, HubEvent, Pose, Quat};

    use crate::config::{DetectorConfig, DisconnectPolicy};
    use crate::correlator::Handshake;
    use crate::engine::{deliver_all, EventConsumer, HandshakeEngine};
    use crate::registry::DeviceId;
    use crate::replay::{replay, replay_events};
    use crate::tracker::GesturePhase;

    const ARM_DOWN: i32 = 20;
    const LEVEL: i32 = 90;

    /// Helper: quaternion for an arm pitched to `deg` on the 0–180 scale, with some
    /// roll and yaw that must not matter.
    fn quat_at(deg: i32) -> Quat {
        Quat::from_euler(0.35, ((deg - LEVEL) as f32).to_radians(), -1.2)
    }

    /// One scripted wearer.
    #[derive(Clone)]
    struct Arm {
        handle: DeviceHandle,
        /// Peak-to-peak swing in degrees (≤ 78)
        amplitude: i32,
        /// Tick the arm starts rising; before it the arm hangs down
        start: u64,
        /// Tick the arm drops again
        stop: u64,
        /// Tick the fist closes (stays closed)
        fist_from: u64,
        /// Disconnected during [from, to): no samples, disconnect/connect events at the edges
        offline: Option<(u64, u64)>,
    }

    impl Arm {
        fn new(handle: u64, amplitude: i32) -> Self {
            Self {
                handle: DeviceHandle(handle),
                amplitude,
                start: 1,
                stop: u64::MAX,
                fist_from: 45,
                offline: None,
            }
        }

        /// Level for 30 ticks, then swing in 5-tick half cycles.
        fn pitch(&self, t: u64) -> i32 {
            if t < self.start || t >= self.stop {
                return ARM_DOWN;
            }
            let into = t - self.start;
            if into < 30 {
                return LEVEL;
            }
            let up = self.amplitude / 2;
            if ((into - 30) / 5) % 2 == 0 {
                LEVEL + up
            } else {
                LEVEL - (self.amplitude - up)
            }
        }

        fn pose(&self, t: u64) -> Pose {
            if t >= self.fist_from {
                Pose::Fist
            } else {
                Pose::Rest
            }
        }

        fn online(&self, t: u64) -> bool {
            self.offline.map_or(true, |(from, to)| t < from || t >= to)
        }
    }

    /// Helper: build the full event stream for `ticks` ticks.
    fn script(arms: &[Arm], ticks: u64) -> Vec<HubEvent> {
        let fw = FirmwareVersion { major: 1, minor: 5, patch: 1970, hardware_rev: 2 };
        let mut events = Vec::new();
        for arm in arms {
            events.push(HubEvent::Paired { handle: arm.handle, firmware: fw });
            events.push(HubEvent::Connected { handle: arm.handle, firmware: fw });
        }
        let mut last_pose: Vec<Option<Pose>> = vec![None; arms.len()];
        for t in 1..=ticks {
            for (i, arm) in arms.iter().enumerate() {
                if let Some((from, to)) = arm.offline {
                    if t == from {
                        events.push(HubEvent::Disconnected { handle: arm.handle });
                    }
                    if t == to {
                        events.push(HubEvent::Connected { handle: arm.handle, firmware: fw });
                    }
                }
                if !arm.online(t) {
                    continue;
                }
                events.push(HubEvent::Orientation { handle: arm.handle, quat: quat_at(arm.pitch(t)) });
                let pose = arm.pose(t);
                if last_pose[i] != Some(pose) {
                    events.push(HubEvent::PoseChanged { handle: arm.handle, pose });
                    last_pose[i] = Some(pose);
                }
            }
            events.push(HubEvent::Tick);
        }
        events
    }

    fn engine_with(policy: DisconnectPolicy) -> HandshakeEngine {
        HandshakeEngine::new(&DetectorConfig { disconnect_policy: policy, ..Default::default() })
    }

    fn run(arms: &[Arm], ticks: u64) -> (HandshakeEngine, Vec<Handshake>) {
        let mut engine = engine_with(DisconnectPolicy::Persist);
        let out = deliver_all(&mut engine, script(arms, ticks));
        (engine, out)
    }

    fn id(raw: u32) -> DeviceId {
        DeviceId::new(raw).unwrap()
    }

    #[test]
    fn test_single_wearer_ready_window() {
        let mut engine = engine_with(DisconnectPolicy::Persist);
        let handle = DeviceHandle(0x01);
        engine.pair(handle, FirmwareVersion::default());
        let dev = id(1);

        for t in 1..=230u64 {
            engine.orientation(handle, &quat_at(LEVEL)).unwrap();
            if t == 31 {
                engine.pose(handle, Pose::Fist).unwrap();
            }
            assert!(engine.consume(HubEvent::Tick).unwrap().is_empty());

            let s = engine.registry().state(dev).unwrap();
            if t == 25 {
                assert!(s.is_analyzing(), "analyzing by tick 25");
            }
            match t {
                1..=50 => assert!(!s.is_ready(), "tick {t}"),
                51..=199 => assert!(s.is_ready(), "tick {t}"),
                200 => {
                    // Window closed with no partner
                    assert_eq!(s.phase(), GesturePhase::Idle);
                    assert_eq!(s.swing_amplitude(), 0);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_two_wearers_shake_hands() {
        let arms = [Arm::new(0x0a, 40), Arm::new(0x0b, 30)];
        let (engine, out) = run(&arms, 60);

        assert_eq!(
            out,
            vec![Handshake { tick: 51, first: id(1), second: id(2), first_amplitude: 40, second_amplitude: 30 }]
        );
        for (_, slot) in engine.registry().iter() {
            // Both re-warming from zero after the match
            assert!(!slot.state.is_analyzing());
            assert!(!slot.state.is_ready());
            assert!(slot.connected);
        }
    }

    #[test]
    fn test_weak_swings_never_match() {
        let arms = [Arm::new(0x0a, 10), Arm::new(0x0b, 12)];
        let (_, out) = run(&arms, 250);
        assert!(out.is_empty());
    }

    #[test]
    fn test_mismatched_swings_never_match() {
        let arms = [Arm::new(0x0a, 20), Arm::new(0x0b, 60)];
        let (_, out) = run(&arms, 250);
        assert!(out.is_empty());
    }

    #[test]
    fn test_fist_is_required() {
        let mut a = Arm::new(0x0a, 40);
        a.fist_from = u64::MAX;
        let arms = [a, Arm::new(0x0b, 40)];
        let (_, out) = run(&arms, 250);
        assert!(out.is_empty());
    }

    #[test]
    fn test_partner_too_late() {
        let mut early = Arm::new(0x0a, 40);
        early.stop = 100;
        let mut late = Arm::new(0x0b, 40);
        late.start = 230;
        let (_, out) = run(&[early, late], 400);
        assert!(out.is_empty());
    }

    #[test]
    fn test_crowd_one_pair_per_tick() {
        let arms = [Arm::new(0x0a, 30), Arm::new(0x0b, 35), Arm::new(0x0c, 60)];
        let (engine, out) = run(&arms, 52);
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].first, out[0].second), (id(1), id(2)));
        assert!(out.iter().all(|m| !m.involves(id(3))));

        let c = engine.registry().state(id(3)).unwrap();
        assert!(c.is_ready(), "third wearer still waiting for a partner");
        assert_eq!(c.swing_amplitude(), 60);
    }

    #[test]
    fn test_two_pairs_same_tick() {
        let arms = [Arm::new(1, 20), Arm::new(2, 70), Arm::new(3, 25), Arm::new(4, 65)];
        let (_, out) = run(&arms, 51);
        let pairs: Vec<_> = out.iter().map(|m| (m.first.get(), m.second.get(), m.tick)).collect();
        assert_eq!(pairs, vec![(1, 3, 51), (2, 4, 51)]);
    }

    #[test]
    fn test_repeated_pairing_is_idempotent() {
        let mut engine = engine_with(DisconnectPolicy::Persist);
        let mut events = script(&[Arm::new(0x0a, 40)], 0);
        events.extend(script(&[Arm::new(0x0a, 40)], 0));
        deliver_all(&mut engine, events);
        assert_eq!(engine.registry().len(), 1);
        assert_eq!(engine.snapshot().len(), 1);
    }

    #[test]
    fn test_reconnect_resumes_gesture_when_persisting() {
        let mut a = Arm::new(0x0a, 40);
        a.fist_from = 35;
        a.offline = Some((40, 46));
        let arms = [a, Arm::new(0x0b, 30)];
        let (_, out) = run(&arms, 60);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tick, 51);
    }

    #[test]
    fn test_reconnect_starts_over_when_resetting() {
        let mut a = Arm::new(0x0a, 40);
        a.fist_from = 35;
        a.offline = Some((40, 46));
        let arms = [a, Arm::new(0x0b, 30)];
        let mut engine = engine_with(DisconnectPolicy::Reset);
        let out = deliver_all(&mut engine, script(&arms, 150));
        // Pose was forgotten and the fist is not re-announced
        assert!(out.is_empty());
        assert_eq!(engine.registry().state(id(1)).unwrap().pose(), Pose::Unknown);
    }

    #[test]
    fn test_replay_reproduces_live_run() {
        let arms = [Arm::new(0x0a, 40), Arm::new(0x0b, 30), Arm::new(0x0c, 70)];
        let events = script(&arms, 400);

        let mut live = engine_with(DisconnectPolicy::Persist);
        let live_out = deliver_all(&mut live, events.clone());
        assert!(!live_out.is_empty());

        let jsonl: String = events
            .iter()
            .map(|e| serde_json::to_string(e).unwrap() + "\n")
            .collect();
        let summary = replay(jsonl.as_bytes(), &DetectorConfig::default()).unwrap();

        assert_eq!(summary.handshakes, live_out);
        assert_eq!(summary.ticks, 400);
        assert_eq!(summary.devices, 3);
        assert_eq!(summary.rejected, 0);
        assert_eq!(replay_events(events, &DetectorConfig::default()).handshakes, live_out);
    }

    #[test]
    fn test_custom_thresholds_apply() {
        let mut cfg = DetectorConfig::default();
        cfg.matching.max_amplitude_gap = 5;
        let arms = [Arm::new(0x0a, 40), Arm::new(0x0b, 30)];
        let mut engine = HandshakeEngine::new(&cfg);
        assert!(deliver_all(&mut engine, script(&arms, 120)).is_empty());
    }
}

//! # correlator
//!
//! Cross-device matching, run once per tick after every tracker has advanced.
//!
//! Ordered pairs (A, B) of distinct ready devices are tried in registry order. A pair
//! matches when A swung more than the minimum and the two swings are within tolerance.
//! A device takes part in at most one match per tick; both partners go back to idle.

use std::hash::Hash;

use serde::Serialize;

use crate::config::MatchConfig;
use crate::registry::{DeviceId, DeviceRegistry};

/// A recognized handshake between two devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Handshake {
    pub tick: u64,
    /// Side whose swing cleared the minimum (the `A` of the pair)
    pub first: DeviceId,
    pub second: DeviceId,
    pub first_amplitude: i32,
    pub second_amplitude: i32,
}

impl Handshake {
    pub fn involves(&self, id: DeviceId) -> bool {
        self.first == id || self.second == id
    }
}

/// Match rule for the ordered pair (a, b).
pub fn swings_compatible(amp_a: i32, amp_b: i32, cfg: &MatchConfig) -> bool {
    amp_a > cfg.min_swing_amplitude && (amp_a - amp_b).abs() < cfg.max_amplitude_gap
}

/// One correlation pass. Matched devices are reset before returning.
pub fn correlate<H: Eq + Hash + Clone>(
    registry: &mut DeviceRegistry<H>,
    cfg: &MatchConfig,
    tick: u64,
) -> Vec<Handshake> {
    let candidates: Vec<(DeviceId, i32)> = registry
        .iter()
        .filter(|(_, slot)| slot.state.is_ready())
        .map(|(id, slot)| (id, slot.state.swing_amplitude()))
        .collect();

    if candidates.len() < 2 {
        return Vec::new();
    }

    let mut consumed = vec![false; candidates.len()];
    let mut matches = Vec::new();

    for i in 0..candidates.len() {
        if consumed[i] {
            continue;
        }
        let (a, amp_a) = candidates[i];
        for j in 0..candidates.len() {
            if i == j || consumed[j] {
                continue;
            }
            let (b, amp_b) = candidates[j];
            if swings_compatible(amp_a, amp_b, cfg) {
                consumed[i] = true;
                consumed[j] = true;
                matches.push(Handshake {
                    tick,
                    first: a,
                    second: b,
                    first_amplitude: amp_a,
                    second_amplitude: amp_b,
                });
                break;
            }
        }
    }

    for m in &matches {
        for id in [m.first, m.second] {
            if let Some(state) = registry.state_mut(id) {
                state.reset();
            }
        }
    }

    matches
}

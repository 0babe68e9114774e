//! scenarios.rs — Scripted wearer line-ups for the armband simulator
//!
//! Each preset exercises one outcome of the hub's matching rules. Presets are
//! selectable at startup (`--preset`) and at runtime via the control WebSocket.
//!
//! All scripts share the same routine shape, so partners starting on the same tick
//! close their fists on the same tick and are ready together.

use serde::{Deserialize, Serialize};

/// One wearer's routine. All times in ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WearerScript {
    /// Radio address of the simulated armband
    pub handle: u64,
    /// Scenario tick the arm starts rising
    pub start_tick: u64,
    pub raise_ticks: u64,
    pub swing_ticks: u64,
    pub swing_period_ticks: u64,
    /// Peak-to-peak swing, degrees
    pub amplitude_deg: f32,
    /// Fist closes this long into the swing and stays closed until lowering
    pub fist_after_ticks: u64,
    pub lower_ticks: u64,
    /// Out of radio range during [from, to), relative to `start_tick`
    #[serde(default)]
    pub offline: Option<(u64, u64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub wearers: Vec<WearerScript>,
    /// Scenario restarts every N ticks (0 = play once)
    pub cycle_ticks: u64,
}

pub const PRESETS: &[&str] = &["meet", "mismatch", "weak", "crowd", "dropout"];

const HANDLE_BASE: u64 = 0xc8_2f_a1_00_00_00;

/// Standard routine: 0.4 s raise, 0.9 s swing (fist after 0.6 s), 0.4 s lower.
fn wearer(n: u64, start_tick: u64, amplitude_deg: f32) -> WearerScript {
    WearerScript {
        handle: HANDLE_BASE + n,
        start_tick,
        raise_ticks: 40,
        swing_ticks: 90,
        swing_period_ticks: 40,
        amplitude_deg,
        fist_after_ticks: 60,
        lower_ticks: 40,
        offline: None,
    }
}

fn scenario(name: &str, cycle_ticks: u64, wearers: Vec<WearerScript>) -> Scenario {
    Scenario { name: name.to_string(), wearers, cycle_ticks }
}

/// Two pairs shaking hands one after the other.
pub fn preset_meet() -> Scenario {
    scenario(
        "meet",
        600,
        vec![wearer(1, 20, 40.0), wearer(2, 20, 34.0), wearer(3, 300, 36.0), wearer(4, 300, 30.0)],
    )
}

/// Both swing hard enough, but one far harder than the other.
pub fn preset_mismatch() -> Scenario {
    scenario("mismatch", 400, vec![wearer(1, 20, 18.0), wearer(2, 20, 56.0)])
}

/// Matching swings, both under the minimum.
pub fn preset_weak() -> Scenario {
    scenario("weak", 400, vec![wearer(1, 20, 6.0), wearer(2, 20, 8.0)])
}

/// Three wearers ready on the same tick; only one pair can form.
pub fn preset_crowd() -> Scenario {
    scenario("crowd", 400, vec![wearer(1, 20, 30.0), wearer(2, 20, 34.0), wearer(3, 20, 50.0)])
}

/// First wearer drops out of range mid-swing and comes back before the fist.
pub fn preset_dropout() -> Scenario {
    let mut first = wearer(1, 20, 40.0);
    first.offline = Some((75, 90));
    scenario("dropout", 400, vec![first, wearer(2, 20, 34.0)])
}

pub fn preset(name: &str) -> Option<Scenario> {
    match name {
        "meet" => Some(preset_meet()),
        "mismatch" => Some(preset_mismatch()),
        "weak" => Some(preset_weak()),
        "crowd" => Some(preset_crowd()),
        "dropout" => Some(preset_dropout()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_preset_resolves() {
        for name in PRESETS {
            let sc = preset(name).unwrap();
            assert_eq!(sc.name, *name);
            assert!(sc.wearers.len() >= 2);
        }
        assert!(preset("parade").is_none());
    }

    #[test]
    fn handles_are_distinct() {
        for name in PRESETS {
            let sc = preset(name).unwrap();
            let mut handles: Vec<_> = sc.wearers.iter().map(|w| w.handle).collect();
            handles.dedup();
            assert_eq!(handles.len(), sc.wearers.len(), "{name}");
        }
    }

    #[test]
    fn routines_fit_in_cycle() {
        for name in PRESETS {
            let sc = preset(name).unwrap();
            for w in &sc.wearers {
                let end = w.start_tick + w.raise_ticks + w.swing_ticks + w.lower_ticks;
                assert!(end < sc.cycle_ticks, "{name}: {end} >= {}", sc.cycle_ticks);
                assert!(w.fist_after_ticks < w.swing_ticks);
                // Swing stays inside the 0–180 scale and clear of the range clip
                assert!(w.amplitude_deg / 2.0 < 39.0);
            }
        }
    }

    #[test]
    fn script_round_trips_through_toml() {
        let sc = preset_dropout();
        let text = toml::to_string(&sc).unwrap();
        let back: Scenario = toml::from_str(&text).unwrap();
        assert_eq!(back.wearers, sc.wearers);
    }
}

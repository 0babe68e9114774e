//! # config
//!
//! Hub configuration: gesture thresholds, match tolerances, disconnect policy and the
//! network/tick settings of the driver loop.
//!
//! Layering (lowest to highest precedence):
//!   1. Built-in defaults (the values the gesture was tuned with)
//!   2. `config.toml` (embedded copy used when the file is missing)
//!   3. Environment: `MEET_UDP_PORT`, `MEET_CTRL_PORT`, `MEET_TICK_MS`
//!   4. CLI flags (applied by `main.rs`)

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{MeetError, MeetResult};

pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml");

// ── Gesture tracker thresholds ────────────────────────────────────────────────

/// Per-device state machine thresholds. All pitch values in degrees on [0,180],
/// all durations in ticks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Raised-arm band, exclusive on both ends
    pub raise_band_low: i32,
    pub raise_band_high: i32,
    /// Consecutive in-band ticks before amplitude tracking starts
    pub warmup_ticks: u32,
    /// Counter must exceed this to be ready to match
    pub ready_after_ticks: u32,
    /// Counter value at which an unmatched analysis is abandoned
    pub analysis_timeout_ticks: u32,
    /// Readings at or above this never raise the tracked maximum
    pub range_clip_high: i32,
    /// Readings at or below this never lower the tracked minimum
    pub range_clip_low: i32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            raise_band_low: 60,
            raise_band_high: 120,
            warmup_ticks: 25,
            ready_after_ticks: 50,
            analysis_timeout_ticks: 200,
            range_clip_high: 130,
            range_clip_low: 50,
        }
    }
}

// ── Cross-device match tolerances ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Initiating side must swing strictly more than this
    pub min_swing_amplitude: i32,
    /// Partners' swings must differ by strictly less than this
    pub max_amplitude_gap: i32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self { min_swing_amplitude: 15, max_amplitude_gap: 20 }
    }
}

// ── Disconnect policy ─────────────────────────────────────────────────────────

/// What a disconnect does to the device's gesture state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// Keep tracking state; a reconnecting armband resumes mid-gesture
    #[default]
    Persist,
    /// Return the tracker to idle and forget the last pose
    Reset,
}

// ── Driver loop / network ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// UDP port device links send events to
    pub udp_port: u16,
    /// HTTP port for /health, /status and /ws
    pub ctrl_port: u16,
    /// Tick cadence in milliseconds
    pub tick_ms: u64,
    /// Refresh the /status snapshot every N ticks
    pub status_every_ticks: u64,
    /// Inbound event queue capacity between the UDP task and the tick loop
    pub event_queue: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            udp_port: 7000,
            ctrl_port: 7080,
            tick_ms: 10,
            status_every_ticks: 50,
            event_queue: 4096,
        }
    }
}

impl HubConfig {
    fn apply_env(&mut self) {
        if let Some(v) = std::env::var("MEET_UDP_PORT").ok().and_then(|v| v.parse().ok()) {
            self.udp_port = v;
        }
        if let Some(v) = std::env::var("MEET_CTRL_PORT").ok().and_then(|v| v.parse().ok()) {
            self.ctrl_port = v;
        }
        if let Some(v) = std::env::var("MEET_TICK_MS").ok().and_then(|v| v.parse().ok()) {
            self.tick_ms = v;
        }
    }
}

// ── Full config ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub hub: HubConfig,
    pub gesture: GestureConfig,
    pub matching: MatchConfig,
    pub disconnect_policy: DisconnectPolicy,
}

impl DetectorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(src: &str) -> MeetResult<Self> {
        let cfg: DetectorConfig = toml::from_str(src)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `path`, falling back to the embedded default when the file is absent,
    /// then apply environment overrides.
    pub fn load(path: &Path) -> MeetResult<Self> {
        let src = match std::fs::read_to_string(path) {
            Ok(s) => {
                info!("Loaded config from {}", path.display());
                s
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found, using embedded defaults", path.display());
                DEFAULT_CONFIG_TOML.to_string()
            }
            Err(e) => return Err(e.into()),
        };
        let mut cfg = Self::from_toml(&src)?;
        cfg.hub.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> MeetResult<()> {
        let g = &self.gesture;
        if g.raise_band_low >= g.raise_band_high {
            return Err(MeetError::Config(format!(
                "raise band {}..{} is empty",
                g.raise_band_low, g.raise_band_high
            )));
        }
        if g.warmup_ticks == 0 {
            return Err(MeetError::Config("warmup_ticks must be at least 1".into()));
        }
        if !(g.warmup_ticks <= g.ready_after_ticks && g.ready_after_ticks < g.analysis_timeout_ticks) {
            return Err(MeetError::Config(format!(
                "need warmup ({}) <= ready_after ({}) < timeout ({})",
                g.warmup_ticks, g.ready_after_ticks, g.analysis_timeout_ticks
            )));
        }
        if g.range_clip_low >= g.range_clip_high {
            return Err(MeetError::Config(format!(
                "range clip {}..{} is empty",
                g.range_clip_low, g.range_clip_high
            )));
        }
        if self.matching.max_amplitude_gap <= 0 {
            return Err(MeetError::Config("max_amplitude_gap must be positive".into()));
        }
        if self.hub.tick_ms == 0 {
            return Err(MeetError::Config("tick_ms must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_config_matches_defaults() {
        let cfg = DetectorConfig::from_toml(DEFAULT_CONFIG_TOML).unwrap();
        let d = GestureConfig::default();
        assert_eq!(cfg.gesture.warmup_ticks, d.warmup_ticks);
        assert_eq!(cfg.gesture.analysis_timeout_ticks, d.analysis_timeout_ticks);
        assert_eq!(cfg.matching.min_swing_amplitude, 15);
        assert_eq!(cfg.disconnect_policy, DisconnectPolicy::Persist);
        assert_eq!(cfg.hub.tick_ms, 10);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = DetectorConfig::from_toml(
            r#"
            disconnect_policy = "reset"
            [matching]
            max_amplitude_gap = 10
            "#,
        )
        .unwrap();
        assert_eq!(cfg.disconnect_policy, DisconnectPolicy::Reset);
        assert_eq!(cfg.matching.max_amplitude_gap, 10);
        assert_eq!(cfg.matching.min_swing_amplitude, 15);
        assert_eq!(cfg.gesture.raise_band_low, 60);
    }

    #[test]
    fn rejects_inverted_window() {
        let err = DetectorConfig::from_toml(
            r#"
            [gesture]
            ready_after_ticks = 250
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, MeetError::Config(_)));
    }

    #[test]
    fn rejects_zero_warmup() {
        let err = DetectorConfig::from_toml(
            r#"
            [gesture]
            warmup_ticks = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, MeetError::Config(ref m) if m.contains("warmup_ticks")));
    }

    #[test]
    fn rejects_bad_toml() {
        let err = DetectorConfig::from_toml("disconnect_policy = 3").unwrap_err();
        assert!(matches!(err, MeetError::ConfigParse(_)));
    }
}

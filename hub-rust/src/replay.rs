//! # replay
//!
//! Offline driver. Feeds a JSON-lines recording of [`HubEvent`]s through a fresh engine.
//!
//! Recordings carry explicit `{"type":"tick"}` lines, so a replay reproduces the tick
//! boundaries of the live run exactly and yields the same handshakes. Blank lines and
//! lines starting with `#` are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use armband_types::HubEvent;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::DetectorConfig;
use crate::correlator::Handshake;
use crate::engine::{EventConsumer, HandshakeEngine};
use crate::error::{MeetError, MeetResult};

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub ticks: u64,
    pub devices: usize,
    pub events: usize,
    /// Events the engine refused (e.g. pose from an unpaired handle)
    pub rejected: usize,
    pub handshakes: Vec<Handshake>,
}

/// Parse a whole recording. Fails on the first malformed line.
pub fn read_recording<R: BufRead>(reader: R) -> MeetResult<Vec<HubEvent>> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str(trimmed)
            .map_err(|source| MeetError::Recording { line: idx + 1, source })?;
        events.push(event);
    }
    Ok(events)
}

pub fn replay_events(events: Vec<HubEvent>, cfg: &DetectorConfig) -> ReplaySummary {
    let mut engine = HandshakeEngine::new(cfg);
    let total = events.len();
    let mut rejected = 0;
    let mut handshakes = Vec::new();

    for event in events {
        match engine.consume(event) {
            Ok(mut matches) => handshakes.append(&mut matches),
            Err(e) => {
                warn!("Replay: {e}");
                rejected += 1;
            }
        }
    }

    ReplaySummary {
        ticks: engine.ticks(),
        devices: engine.registry().len(),
        events: total,
        rejected,
        handshakes,
    }
}

pub fn replay<R: BufRead>(reader: R, cfg: &DetectorConfig) -> MeetResult<ReplaySummary> {
    Ok(replay_events(read_recording(reader)?, cfg))
}

pub fn replay_file(path: &Path, cfg: &DetectorConfig) -> MeetResult<ReplaySummary> {
    let file = File::open(path)?;
    let summary = replay(BufReader::new(file), cfg)?;
    info!(
        "Replayed {}: {} events, {} ticks, {} armbands, {} handshakes",
        path.display(),
        summary.events,
        summary.ticks,
        summary.devices,
        summary.handshakes.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_and_comment_lines() {
        let src = "# recorded by armband-sim\n\n{\"type\":\"tick\"}\n   \n{\"type\":\"tick\"}\n";
        let events = read_recording(src.as_bytes()).unwrap();
        assert_eq!(events, vec![HubEvent::Tick, HubEvent::Tick]);
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let src = "{\"type\":\"tick\"}\n{\"type\":\"wave\"}\n";
        match read_recording(src.as_bytes()) {
            Err(MeetError::Recording { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected recording error, got {other:?}"),
        }
    }

    #[test]
    fn unpaired_events_are_counted_not_fatal() {
        let src = r#"
{"type":"pose_changed","handle":5,"pose":"fist"}
{"type":"paired","handle":5,"firmware":{"major":1,"minor":5,"patch":1970,"hardware_rev":2}}
{"type":"tick"}
"#;
        let summary = replay(src.as_bytes(), &DetectorConfig::default()).unwrap();
        assert_eq!(summary.events, 3);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.devices, 1);
        assert_eq!(summary.ticks, 1);
        assert!(summary.handshakes.is_empty());
    }
}

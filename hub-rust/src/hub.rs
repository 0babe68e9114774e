//! # hub
//!
//! Device hub adapter. Receives [`EventEnvelope`]s from armband links over UDP,
//! validates them and queues the events for the tick loop.
//!
//! ## Architecture
//! Runs as its own Tokio task beside the tick loop. It:
//!   1. Reads datagrams from the shared hub socket (also used for commands back)
//!   2. Parses the JSON envelope
//!   3. Drops duplicate / stale sequence numbers per link (replay guard)
//!   4. Drops `tick` events: ticks only come from the local driver loop
//!   5. Forwards `(event, source)` into the mpsc queue drained at each tick
//!
//! Nothing here touches gesture state; malformed input and socket errors are logged
//! and never end the task.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use armband_types::{EventEnvelope, HubEvent};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One queued inbound event with the link it came from.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub event: HubEvent,
    pub src: SocketAddr,
}

// ── Sequence Number Tracker (replay protection) ───────────────────────────────

/// Tracks the last seen sequence number per link.
/// Rejects exact duplicates and large backward jumps; accepts forward gaps (loss).
#[derive(Debug, Default)]
pub struct SeqTracker {
    last_seq: HashMap<SocketAddr, u32>,
}

impl SeqTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, src: SocketAddr, seq_num: u32) -> bool {
        match self.last_seq.get_mut(&src) {
            None => {
                self.last_seq.insert(src, seq_num);
                true
            }
            Some(last) => {
                let diff = seq_num.wrapping_sub(*last);
                if diff == 0 || diff > 1000 {
                    warn!("Hub: rejected datagram from {src}: seq {seq_num} (last: {last})");
                    return false;
                }
                *last = seq_num;
                true
            }
        }
    }
}

/// Parse and validate one datagram. `None` when it should be dropped.
pub fn accept_datagram(data: &[u8], src: SocketAddr, seq_tracker: &mut SeqTracker) -> Option<Inbound> {
    let env: EventEnvelope = match serde_json::from_slice(data) {
        Ok(e) => e,
        Err(e) => {
            debug!("Hub: malformed datagram from {src}: {e}");
            return None;
        }
    };

    if !seq_tracker.accept(src, env.seq_num) {
        return None;
    }

    if env.event == HubEvent::Tick {
        warn!("Hub: ignoring tick from {src} (ticks are local)");
        return None;
    }

    Some(Inbound { event: env.event, src })
}

// ── Main UDP listener task ────────────────────────────────────────────────────

pub async fn bind(port: u16) -> std::io::Result<Arc<UdpSocket>> {
    let addr = format!("0.0.0.0:{port}");
    let socket = UdpSocket::bind(&addr).await?;
    info!("📡 Armband hub listening on UDP {addr}");
    Ok(Arc::new(socket))
}

/// Receive loop. Returns only when the tick loop has gone away.
pub async fn run_listener(socket: Arc<UdpSocket>, tx: mpsc::Sender<Inbound>) {
    let mut seq_tracker = SeqTracker::new();
    let mut buf = vec![0u8; 4096];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => {
                let Some(inbound) = accept_datagram(&buf[..len], src, &mut seq_tracker) else {
                    continue;
                };
                if let Err(e) = tx.try_send(inbound) {
                    match e {
                        mpsc::error::TrySendError::Full(dropped) => {
                            warn!("Hub: event queue full, dropped {:?}", dropped.event.handle());
                        }
                        mpsc::error::TrySendError::Closed(_) => {
                            info!("Hub: tick loop gone, listener stopping");
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                // Never crash; log and continue
                warn!("Hub: UDP recv error: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armband_types::{DeviceHandle, Pose};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn datagram(seq: u32, event: HubEvent) -> Vec<u8> {
        serde_json::to_vec(&EventEnvelope { seq_num: seq, event }).unwrap()
    }

    #[test]
    fn first_datagram_from_a_link_is_accepted() {
        let mut t = SeqTracker::new();
        assert!(t.accept(addr(1), 0));
        assert!(t.accept(addr(2), 500));
    }

    #[test]
    fn duplicates_and_backward_jumps_are_rejected() {
        let mut t = SeqTracker::new();
        assert!(t.accept(addr(1), 10));
        assert!(!t.accept(addr(1), 10));
        assert!(!t.accept(addr(1), 9));
        assert!(t.accept(addr(1), 14)); // gap from loss
        assert!(t.accept(addr(2), 10)); // links are independent
    }

    #[test]
    fn sequence_wraps() {
        let mut t = SeqTracker::new();
        assert!(t.accept(addr(1), u32::MAX));
        assert!(t.accept(addr(1), 0));
    }

    #[test]
    fn accepts_pose_datagram() {
        let mut t = SeqTracker::new();
        let ev = HubEvent::PoseChanged { handle: DeviceHandle(9), pose: Pose::Fist };
        let inbound = accept_datagram(&datagram(1, ev.clone()), addr(1), &mut t).unwrap();
        assert_eq!(inbound.event, ev);
        assert_eq!(inbound.src, addr(1));
    }

    #[test]
    fn drops_garbage_and_remote_ticks() {
        let mut t = SeqTracker::new();
        assert!(accept_datagram(b"not json", addr(1), &mut t).is_none());
        assert!(accept_datagram(&datagram(1, HubEvent::Tick), addr(1), &mut t).is_none());
    }
}

//! link.rs — UDP link between the simulated armbands and the hub
//!
//! Outbound: every device event goes to the hub as an `EventEnvelope` JSON datagram
//! stamped with this link's sequence number.
//! Inbound: `CommandEnvelope`s from the hub are drained without blocking once per tick.
//!
//! Optionally every sent event is also appended to a JSON-lines recording, with a
//! `{"type":"tick"}` line closing each simulator tick, so `meet-hub --replay` can
//! re-run the session offline.
//!
//! Send errors are logged and never stop the simulator.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::UdpSocket;
use std::path::Path;

use armband_types::{CommandEnvelope, EventEnvelope, HubEvent};
use tracing::{debug, info, warn};

const MAX_DATAGRAM: usize = 2048;

pub struct Recorder {
    out: BufWriter<File>,
}

impl Recorder {
    pub fn create(path: &Path) -> io::Result<Self> {
        let out = BufWriter::new(File::create(path)?);
        info!("📼 Recording device events to {}", path.display());
        Ok(Self { out })
    }

    pub fn record(&mut self, event: &HubEvent) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, event)?;
        self.out.write_all(b"\n")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

pub struct ArmbandLink {
    socket: UdpSocket,
    hub_addr: String,
    seq_num: u32,
    recorder: Option<Recorder>,
}

impl ArmbandLink {
    /// Bind an ephemeral local port for talking to `hub_addr`.
    pub fn new(hub_addr: &str, recorder: Option<Recorder>) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket, hub_addr: hub_addr.to_string(), seq_num: 0, recorder })
    }

    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    pub fn send(&mut self, event: HubEvent) {
        if let Some(rec) = self.recorder.as_mut() {
            if let Err(e) = rec.record(&event) {
                warn!("Recorder: write failed, recording stopped: {e}");
                self.recorder = None;
            }
        }

        let envelope = EventEnvelope { seq_num: self.seq_num, event };
        self.seq_num = self.seq_num.wrapping_add(1);

        let bytes = match serde_json::to_vec(&envelope) {
            Ok(b) => b,
            Err(e) => {
                warn!("UDP: serialize failed: {e}");
                return;
            }
        };
        match self.socket.send_to(&bytes, &self.hub_addr) {
            Ok(_) => debug!("UDP → {} seq={}", self.hub_addr, envelope.seq_num),
            // A full send buffer drops the sample, like a lossy radio would
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => debug!("UDP: send buffer full, sample dropped"),
            Err(e) => warn!("UDP: send to {} failed: {e}", self.hub_addr),
        }
    }

    pub fn send_all(&mut self, events: Vec<HubEvent>) {
        for event in events {
            self.send(event);
        }
    }

    /// Close the current tick in the recording.
    pub fn end_tick(&mut self) {
        if let Some(rec) = self.recorder.as_mut() {
            let res = rec.record(&HubEvent::Tick).and_then(|_| rec.flush());
            if let Err(e) = res {
                warn!("Recorder: write failed, recording stopped: {e}");
                self.recorder = None;
            }
        }
    }

    /// Drain every command the hub has sent since the last poll.
    pub fn poll_commands(&self) -> Vec<CommandEnvelope> {
        let mut buf = [0u8; MAX_DATAGRAM];
        let mut out = Vec::new();
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, src)) => match serde_json::from_slice::<CommandEnvelope>(&buf[..len]) {
                    Ok(cmd) => out.push(cmd),
                    Err(e) => debug!("UDP: bad command from {src}: {e}"),
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    // ICMP port unreachable surfaces here on some platforms while the hub is down
                    debug!("UDP: recv error: {e}");
                    break;
                }
            }
        }
        out
    }
}

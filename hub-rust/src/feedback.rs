//! # feedback
//!
//! The way back to the armbands and out to observers.
//!
//! - Commands go out on the hub's own UDP socket to the last address each handle was
//!   heard from: an unlock-hold when an armband pairs or connects (so pose events keep
//!   flowing), a haptic pulse to both partners of a handshake.
//! - Every handshake is published as [`HandshakeNotice`] JSON on a broadcast channel
//!   that `/ws` subscribers read.
//!
//! Send failures are logged; they never reach the gesture core.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use armband_types::{CommandEnvelope, DeviceCommand, DeviceHandle, HandshakeNotice, NoticeParty};
use chrono::Utc;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::correlator::Handshake;
use crate::registry::DeviceRegistry;

/// Build the observer notice for a handshake. `None` if either id is unknown.
pub fn notice_for(registry: &DeviceRegistry<DeviceHandle>, hs: &Handshake) -> Option<HandshakeNotice> {
    let first = *registry.handle_of(hs.first)?;
    let second = *registry.handle_of(hs.second)?;
    Some(HandshakeNotice {
        id: Uuid::new_v4(),
        tick: hs.tick,
        first: NoticeParty {
            device_id: hs.first.get(),
            handle: first,
            swing_amplitude: hs.first_amplitude,
        },
        second: NoticeParty {
            device_id: hs.second.get(),
            handle: second,
            swing_amplitude: hs.second_amplitude,
        },
        recognized_at: Utc::now(),
    })
}

pub struct FeedbackLink {
    socket: Arc<UdpSocket>,
    routes: HashMap<DeviceHandle, SocketAddr>,
    notices: broadcast::Sender<String>,
}

impl FeedbackLink {
    pub fn new(socket: Arc<UdpSocket>, notices: broadcast::Sender<String>) -> Self {
        Self { socket, routes: HashMap::new(), notices }
    }

    /// Remember where `handle` was last heard from.
    pub fn learn(&mut self, handle: DeviceHandle, src: SocketAddr) {
        if self.routes.insert(handle, src) != Some(src) {
            debug!("Feedback: {handle} reachable at {src}");
        }
    }

    pub fn route(&self, handle: DeviceHandle) -> Option<SocketAddr> {
        self.routes.get(&handle).copied()
    }

    pub async fn send(&self, handle: DeviceHandle, command: DeviceCommand) {
        let Some(dest) = self.route(handle) else {
            warn!("Feedback: no route to {handle}, dropping {command:?}");
            return;
        };
        let bytes = match serde_json::to_vec(&CommandEnvelope { handle, command }) {
            Ok(b) => b,
            Err(e) => {
                warn!("Feedback: serialize failed: {e}");
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&bytes, dest).await {
            warn!("Feedback: send to {dest} failed: {e}");
        }
    }

    /// Buzz both partners and publish the notice.
    pub async fn handshake(&self, registry: &DeviceRegistry<DeviceHandle>, hs: &Handshake) {
        let Some(notice) = notice_for(registry, hs) else {
            warn!("Feedback: handshake {hs:?} names an unknown armband");
            return;
        };
        self.send(notice.first.handle, DeviceCommand::NotifyUserAction).await;
        self.send(notice.second.handle, DeviceCommand::NotifyUserAction).await;

        match serde_json::to_string(&notice) {
            // No subscribers is fine
            Ok(json) => {
                let _ = self.notices.send(json);
            }
            Err(e) => warn!("Feedback: notice serialize failed: {e}"),
        }
    }
}

//! Central fanout policy
//!
//! One task owns the [`SensorStore`] and [`ConnectionRegistry`] and consumes
//! inbound events from every connection task over a single mpsc channel.
//! Each event is handled to completion before the next is taken, so derived
//! messages are emitted in arrival order without any locking.
//!
//! The two inbound paths are asymmetric on purpose:
//!
//! - WebSocket payloads are *relayed, not interpreted*: framed to every mesh
//!   client, verbatim to every other WebSocket client. State mutation only
//!   originates from the mesh side of the observed protocol.
//! - Mesh frames are relayed verbatim to the other mesh clients regardless
//!   of parse outcome, then parsed and interpreted: sensor updates mutate
//!   the store and fan out one line per pair, broadcasts fan out one line
//!   per name, a snapshot request is answered to the sender alone.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::framing::{self, Frame};
use crate::protocol::{self, MeshEvent, KW_BROADCAST, KW_SENSOR_UPDATE};
use crate::registry::{ClientId, ConnectionRegistry};
use crate::store::SensorStore;

/// Inbound event from a connection task.
#[derive(Debug)]
pub enum Event {
    WsJoined {
        id: ClientId,
        tx: mpsc::Sender<String>,
    },
    WsMessage {
        id: ClientId,
        text: String,
    },
    WsLeft {
        id: ClientId,
    },
    MeshJoined {
        id: ClientId,
        tx: mpsc::Sender<Bytes>,
    },
    MeshFrame {
        id: ClientId,
        frame: Frame,
    },
    MeshLeft {
        id: ClientId,
    },
}

/// Owns all shared relay state; see module docs.
#[derive(Debug, Default)]
pub struct Dispatcher {
    store: SensorStore,
    registry: ConnectionRegistry,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            store: SensorStore::new(),
            registry: ConnectionRegistry::new(),
        }
    }

    /// Drain events until every connection task is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Event>) {
        while let Some(event) = rx.recv().await {
            self.handle(event);
        }
    }

    /// Handle one inbound event to completion.
    pub fn handle(&mut self, event: Event) {
        match event {
            Event::WsJoined { id, tx } => {
                self.registry.ws.add(id.clone(), tx);
                info!(client = %id, pool_size = self.registry.ws.len(), "turbowarp client joined");
            }
            Event::WsMessage { id, text } => self.handle_ws_message(&id, &text),
            Event::WsLeft { id } => {
                self.registry.ws.remove(&id);
                info!(client = %id, pool_size = self.registry.ws.len(), "turbowarp client left");
            }
            Event::MeshJoined { id, tx } => {
                self.registry.mesh.add(id.clone(), tx);
                info!(client = %id, pool_size = self.registry.mesh.len(), "mesh client joined");
            }
            Event::MeshFrame { id, frame } => self.handle_mesh_frame(&id, frame),
            Event::MeshLeft { id } => {
                self.registry.mesh.remove(&id);
                info!(client = %id, pool_size = self.registry.mesh.len(), "mesh client left");
            }
        }
    }

    /// WebSocket payloads are relayed, never parsed: framed to every mesh
    /// client, verbatim to every other WebSocket client.
    fn handle_ws_message(&mut self, id: &ClientId, text: &str) {
        debug!(client = %id, payload = text, "websocket message");
        match framing::encode(text.as_bytes()) {
            Ok(frame) => self.registry.mesh.broadcast(&frame),
            Err(e) => warn!(client = %id, error = %e, "cannot frame websocket payload"),
        }
        self.registry.ws.broadcast_except(id, &text.to_string());
    }

    fn handle_mesh_frame(&mut self, id: &ClientId, frame: Frame) {
        // Verbatim relay to the other mesh clients happens first and is
        // independent of whether the payload parses.
        self.registry.mesh.broadcast_except(id, frame.raw());

        let payload = String::from_utf8_lossy(frame.payload());
        debug!(client = %id, payload = %payload, "mesh frame");
        for event in protocol::parse(&payload) {
            match event {
                MeshEvent::SensorUpdate { pairs } => {
                    if pairs.is_empty() {
                        warn!(client = %id, payload = %payload, "sensor-update with no parseable pairs");
                    }
                    for (name, value) in pairs {
                        self.store.set(&name, &value);
                        let line = format!("{} \"{}\" {}", KW_SENSOR_UPDATE, name, value);
                        self.registry.ws.broadcast(&line);
                    }
                }
                MeshEvent::Broadcast { names } => {
                    for name in names {
                        let line = format!("{} {}", KW_BROADCAST, name);
                        self.registry.ws.broadcast(&line);
                    }
                }
                MeshEvent::SnapshotRequest => self.send_snapshot(id),
                MeshEvent::Unrecognized { raw } => {
                    debug!(client = %id, payload = %raw, "message ignored");
                }
            }
        }
    }

    /// Answer a snapshot request: the whole store as one frame, delivered to
    /// the requesting mesh client only.
    fn send_snapshot(&mut self, id: &ClientId) {
        let payload = self.store.snapshot_payload();
        match framing::encode(payload.as_bytes()) {
            Ok(frame) => {
                debug!(client = %id, payload = %payload, "sending snapshot");
                self.registry.mesh.send_to(id, frame);
            }
            Err(e) => warn!(client = %id, error = %e, "cannot frame snapshot"),
        }
    }
}

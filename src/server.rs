//! Relay server: two listeners, per-connection tasks, dispatcher wiring
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        mesh-bridged                           │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  ws://0.0.0.0:8080          tcp://0.0.0.0:42001               │
//! │  TurboWarp clients          Scratch 1.4 Mesh clients          │
//! │        │                          │                           │
//! │   reader task ──► Event ◄── reader task (FrameDecoder)        │
//! │   writer task ◄─┐   │    ┌─► writer task                      │
//! │                 │   ▼    │                                    │
//! │              Dispatcher task                                  │
//! │         (SensorStore + ConnectionRegistry)                    │
//! │                                                               │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every accepted connection runs as its own pair of tasks, so a failing or
//! misbehaving client tears down only itself: its tasks log, send a leave
//! event, and end. Only startup failures (a port already bound) abort the
//! process.

use std::net::SocketAddr;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::dispatch::{Dispatcher, Event};
use crate::error::Result;
use crate::framing::FrameDecoder;
use crate::registry::{ClientId, OUTBOUND_QUEUE_DEPTH};

/// Default port for the TurboWarp WebSocket endpoint.
pub const DEFAULT_WS_PORT: u16 = 8080;
/// Default port for the Scratch 1.4 Mesh TCP endpoint.
pub const DEFAULT_MESH_PORT: u16 = 42001;

/// Depth of the event channel feeding the dispatcher task.
const EVENT_QUEUE_DEPTH: usize = 256;
/// Chunk size for mesh TCP reads.
const READ_CHUNK_SIZE: usize = 4096;

/// Listen addresses for the two endpoints.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ws_addr: SocketAddr,
    pub mesh_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_WS_PORT)),
            mesh_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_MESH_PORT)),
        }
    }
}

/// The relay server, bound but not yet serving.
pub struct Server {
    ws_listener: TcpListener,
    mesh_listener: TcpListener,
}

impl Server {
    /// Bind both listeners. A failure here (port already in use) is the one
    /// error class that should abort startup.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let ws_listener = TcpListener::bind(config.ws_addr).await?;
        let mesh_listener = TcpListener::bind(config.mesh_addr).await?;
        Ok(Self {
            ws_listener,
            mesh_listener,
        })
    }

    /// Actual WebSocket listen address (tests bind port 0).
    pub fn ws_addr(&self) -> Result<SocketAddr> {
        Ok(self.ws_listener.local_addr()?)
    }

    /// Actual mesh TCP listen address.
    pub fn mesh_addr(&self) -> Result<SocketAddr> {
        Ok(self.mesh_listener.local_addr()?)
    }

    /// Run the dispatcher and both accept loops. Never returns in normal
    /// operation.
    pub async fn run(self) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        tokio::spawn(Dispatcher::new().run(event_rx));

        tokio::join!(
            accept_ws_loop(self.ws_listener, event_tx.clone()),
            accept_mesh_loop(self.mesh_listener, event_tx),
        );
    }
}

async fn accept_ws_loop(listener: TcpListener, event_tx: mpsc::Sender<Event>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let event_tx = event_tx.clone();
                tokio::spawn(handle_ws_connection(stream, addr, event_tx));
            }
            Err(e) => error!(error = %e, "failed to accept websocket connection"),
        }
    }
}

async fn accept_mesh_loop(listener: TcpListener, event_tx: mpsc::Sender<Event>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let event_tx = event_tx.clone();
                tokio::spawn(handle_mesh_connection(stream, addr, event_tx));
            }
            Err(e) => error!(error = %e, "failed to accept mesh connection"),
        }
    }
}

/// One TurboWarp client: WebSocket handshake, then a reader loop feeding the
/// dispatcher and a writer task draining this connection's outbound queue.
async fn handle_ws_connection(stream: TcpStream, addr: SocketAddr, event_tx: mpsc::Sender<Event>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%addr, error = %e, "websocket handshake failed");
            return;
        }
    };

    let id = ClientId::new("ws");
    info!(client = %id, %addr, "turbowarp client connected");

    let (mut sink, mut source) = ws.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_DEPTH);
    if event_tx
        .send(Event::WsJoined {
            id: id.clone(),
            tx: out_tx,
        })
        .await
        .is_err()
    {
        return;
    }

    // Writer: ends when the dispatcher drops this connection's sender.
    tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!(error = %e, "websocket send failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(msg) = source.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if event_tx
                    .send(Event::WsMessage {
                        id: id.clone(),
                        text,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                // Some clients send text payloads in binary frames.
                let text = String::from_utf8_lossy(&data).into_owned();
                if event_tx
                    .send(Event::WsMessage {
                        id: id.clone(),
                        text,
                    })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(client = %id, error = %e, "websocket error");
                break;
            }
        }
    }

    let _ = event_tx.send(Event::WsLeft { id: id.clone() }).await;
    info!(client = %id, "turbowarp client disconnected");
}

/// One Scratch 1.4 Mesh client: raw TCP split into a reader loop (stream
/// decoder feeding the dispatcher) and a writer task draining framed bytes.
async fn handle_mesh_connection(
    stream: TcpStream,
    addr: SocketAddr,
    event_tx: mpsc::Sender<Event>,
) {
    let id = ClientId::new("mesh");
    info!(client = %id, %addr, "scratch mesh client connected");

    let (mut read_half, mut write_half) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE_DEPTH);
    if event_tx
        .send(Event::MeshJoined {
            id: id.clone(),
            tx: out_tx,
        })
        .await
        .is_err()
    {
        return;
    }

    tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = write_half.write_all(&frame).await {
                debug!(error = %e, "mesh write failed");
                break;
            }
        }
    });

    let mut decoder = FrameDecoder::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        match read_half.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                decoder.push(&chunk[..n]);
                while let Some(frame) = decoder.next_frame() {
                    if event_tx
                        .send(Event::MeshFrame {
                            id: id.clone(),
                            frame,
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            Err(e) => {
                debug!(client = %id, error = %e, "mesh read error");
                break;
            }
        }
    }

    let _ = event_tx.send(Event::MeshLeft { id: id.clone() }).await;
    info!(client = %id, "scratch mesh client disconnected");
}

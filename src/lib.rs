//! mesh-bridge: relay between TurboWarp and Scratch 1.4 Mesh clients
//!
//! This library implements a relay server that lets two incompatible client
//! populations share one sensor-variable and broadcast space: TurboWarp
//! clients speak discrete WebSocket text messages, Scratch 1.4 Mesh clients
//! speak a raw TCP stream of 4-byte length-prefixed frames. Both carry the
//! same ad hoc Mesh text grammar (`sensor-update`, `broadcast`, `send-vars`).
//!
//! # Architecture
//!
//! - [`framing`] — length-prefixed frame codec with stream buffering
//! - [`protocol`] — quote-aware Mesh grammar parser
//! - [`store`] — insertion-ordered last-write-wins sensor variable store
//! - [`registry`] — the two connection pools with fanout operations
//! - [`dispatch`] — the single task owning all shared state and applying
//!   the relay policy
//! - [`server`] — listeners and per-connection task wiring
//!
//! # Example
//!
//! ```ignore
//! use mesh_bridge::{Server, ServerConfig};
//!
//! let server = Server::bind(&ServerConfig::default()).await?;
//! server.run().await;
//! ```

pub mod dispatch;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use dispatch::{Dispatcher, Event};
pub use error::{RelayError, Result};
pub use framing::{encode, Frame, FrameDecoder, HEADER_LEN};
pub use protocol::{parse, MeshEvent};
pub use registry::{ClientId, ConnectionRegistry, Pool};
pub use server::{Server, ServerConfig, DEFAULT_MESH_PORT, DEFAULT_WS_PORT};
pub use store::SensorStore;

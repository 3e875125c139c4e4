//! mesh-bridged binary
//!
//! Relay daemon bridging TurboWarp WebSocket clients and Scratch 1.4 Mesh
//! TCP clients.
//!
//! # Usage
//!
//! ```bash
//! mesh-bridged
//! mesh-bridged --ws-port 8080 --mesh-port 42001 --host 0.0.0.0
//! ```

use std::net::SocketAddr;

use clap::Parser;

use mesh_bridge::{Server, ServerConfig, DEFAULT_MESH_PORT, DEFAULT_WS_PORT};

/// Mesh relay daemon
#[derive(Parser, Debug)]
#[command(name = "mesh-bridged")]
#[command(about = "Relay bridging TurboWarp WebSocket and Scratch 1.4 Mesh clients")]
struct Args {
    /// Host to bind both endpoints to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port for the TurboWarp WebSocket endpoint
    #[arg(long, default_value_t = DEFAULT_WS_PORT)]
    ws_port: u16,

    /// Port for the Scratch 1.4 Mesh TCP endpoint
    #[arg(long, default_value_t = DEFAULT_MESH_PORT)]
    mesh_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mesh_bridge=info".parse()?)
                .add_directive("mesh_bridged=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        ws_addr: format!("{}:{}", args.host, args.ws_port).parse::<SocketAddr>()?,
        mesh_addr: format!("{}:{}", args.host, args.mesh_port).parse::<SocketAddr>()?,
    };

    let server = Server::bind(&config).await?;
    tracing::info!("turbowarp endpoint listening on ws://{}", server.ws_addr()?);
    tracing::info!("mesh endpoint listening on {}", server.mesh_addr()?);

    server.run().await;
    Ok(())
}

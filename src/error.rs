//! Error types for mesh-bridge

use thiserror::Error;

/// Main error type for relay operations
///
/// Two conditions from the wire layer are deliberately *not* errors:
/// an incomplete frame is a suspension signal (`FrameDecoder::next_frame`
/// returns `None` until more bytes arrive), and an unparseable payload is a
/// logged no-op (`MeshEvent::Unrecognized`) because the protocol has no
/// error-reply channel.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Frame payload too large for 32-bit length field: {len} bytes")]
    FrameTooLarge { len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

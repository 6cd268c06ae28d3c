/// Errors that can occur during message encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared message size disagrees with the bytes received.
    #[error("malformed frame (declared {declared} bytes, received {received})")]
    Malformed { declared: usize, received: usize },

    /// The message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },

    /// An SVC message is truncated or internally inconsistent.
    #[error("malformed svc message: {0}")]
    MalformedSvc(String),

    /// An SVC message the simulator does not understand.
    #[error("unsupported svc message (function {function_id:#04x}, kind {kind:#04x})")]
    UnsupportedSvc { function_id: u8, kind: u8 },

    /// A module manifest with an inconsistent size header.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The endpoint was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

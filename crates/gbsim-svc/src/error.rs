/// Errors that can occur in the SVC control plane and the simulator loop.
#[derive(Debug, thiserror::Error)]
pub enum SvcError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] gbsim_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] gbsim_frame::FrameError),

    /// CPort binding or handler error.
    #[error("handler error: {0}")]
    Handler(#[from] gbsim_protocol::HandlerError),

    /// The AP handshake did not match, or the session is latched as errored.
    #[error("handshake invalid: {0}")]
    HandshakeInvalid(String),

    /// The request needs a completed handshake.
    #[error("svc session not ready (handshake incomplete)")]
    NotReady,

    /// No module is plugged at this interface.
    #[error("no module at interface {0}")]
    UnknownModule(u8),

    /// A module is already plugged at this interface.
    #[error("interface {0} already has a module")]
    DuplicateModule(u8),

    /// An SVC message only the SVC may send arrived from the AP.
    #[error("unexpected svc message from AP: {0}")]
    UnexpectedMessage(&'static str),

    /// Invalid module configuration.
    #[error("config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The control endpoint or command queue went away.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// I/O error outside an endpoint (threads, config files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SvcError>;

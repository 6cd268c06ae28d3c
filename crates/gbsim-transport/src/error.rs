use std::path::PathBuf;

/// Errors that can occur on simulator endpoints.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open an endpoint file.
    #[error("failed to open endpoint {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on an endpoint.
    #[error("endpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The other side of the endpoint source has gone away.
    #[error("endpoint source shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;

use gbsim_frame::Status;

use crate::protocol::ProtocolClass;

/// Errors raised by protocol handlers and the CPort binding table.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler does not implement this request type.
    #[error("operation type {0:#04x} not supported")]
    Unsupported(u8),

    /// The request payload is shorter than the operation requires.
    #[error("{operation} needs {expected} payload bytes, got {got}")]
    InvalidPayload {
        operation: &'static str,
        expected: usize,
        got: usize,
    },

    /// A request field is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No handler implementation exists for the protocol class.
    #[error("no handler for protocol {0}")]
    NoHandler(ProtocolClass),

    /// The AP-side CPort id is already bound.
    #[error("host cport {0} is already bound")]
    AlreadyBound(u16),
}

impl HandlerError {
    /// Status reported to the AP when a request fails with this error.
    pub fn status(&self) -> Status {
        match self {
            HandlerError::Unsupported(_)
            | HandlerError::InvalidPayload { .. }
            | HandlerError::InvalidArgument(_) => Status::Invalid,
            HandlerError::NoHandler(_) | HandlerError::AlreadyBound(_) => Status::Bad,
        }
    }
}

pub type Result<T> = std::result::Result<T, HandlerError>;

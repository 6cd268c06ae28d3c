use bytes::Bytes;
use gbsim_frame::{Status, GREYBUS_VERSION_MAJOR, GREYBUS_VERSION_MINOR};

use crate::error::{HandlerError, Result};
use crate::protocol::ProtocolClass;

/// Request type every protocol answers with its version.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Addressing of the CPort an operation arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationContext {
    /// Interface id of the module owning the CPort.
    pub module_id: u8,
    /// Module-side CPort id.
    pub cport_id: u16,
    /// AP-side CPort id.
    pub host_cport_id: u16,
}

/// Outcome of a handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub payload: Bytes,
}

impl Response {
    /// Successful response with an empty payload.
    pub fn ack() -> Self {
        Self::with_status(Status::Success)
    }

    /// Response carrying only a status.
    pub fn with_status(status: Status) -> Self {
        Self {
            status,
            payload: Bytes::new(),
        }
    }

    /// Successful response carrying `payload`.
    pub fn with_payload(payload: impl Into<Bytes>) -> Self {
        Self {
            status: Status::Success,
            payload: payload.into(),
        }
    }

    /// Protocol version response.
    pub fn version() -> Self {
        Self::with_payload(vec![GREYBUS_VERSION_MAJOR, GREYBUS_VERSION_MINOR])
    }
}

/// One device-class implementation bound to a CPort.
///
/// Implementations own their per-CPort state. The binding table serializes
/// calls for a CPort, so `handle` takes `&mut self` and never races with
/// itself. State changes happen only after the request has been validated.
pub trait OperationHandler: Send {
    /// Protocol class this handler implements.
    fn protocol(&self) -> ProtocolClass;

    /// Handle one request of type `op_type` (response flag already cleared).
    fn handle(
        &mut self,
        ctx: &OperationContext,
        op_type: u8,
        payload: &[u8],
    ) -> Result<Response>;
}

/// Fail with `InvalidPayload` unless `payload` holds at least `expected` bytes.
pub(crate) fn require_len(operation: &'static str, payload: &[u8], expected: usize) -> Result<()> {
    if payload.len() < expected {
        return Err(HandlerError::InvalidPayload {
            operation,
            expected,
            got: payload.len(),
        });
    }
    Ok(())
}

/// Read the leading `which` selector and range-check it against `count`.
pub(crate) fn selector(operation: &'static str, payload: &[u8], count: usize) -> Result<usize> {
    require_len(operation, payload, 1)?;
    let which = payload[0] as usize;
    if which >= count {
        return Err(HandlerError::InvalidArgument(format!(
            "{operation}: index {which} out of range (0..{count})"
        )));
    }
    Ok(which)
}

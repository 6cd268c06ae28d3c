//! FunctionFS control endpoint (`ep0`) events.
//!
//! Every event is 12 bytes: the 8-byte USB setup packet (meaningful only for
//! SETUP events), the event type, and 3 pad bytes. AP->SVC messages arrive
//! as vendor SETUP requests whose data stage follows on the same endpoint.

use std::io::{ErrorKind, Read};

use crate::error::{Result, SvcError};

/// Size of one FunctionFS event.
pub const EVENT_SIZE: usize = 12;

/// Size of the USB setup packet at the start of an event.
pub const SETUP_SIZE: usize = 8;

/// `bRequest` carrying an AP->SVC message.
pub const SVC_MESSAGE_REQUEST: u8 = 0x01;

/// Vendor request type bit of `bRequestType`.
pub const USB_TYPE_VENDOR: u8 = 0x40;

const EVENT_BIND: u8 = 0;
const EVENT_UNBIND: u8 = 1;
const EVENT_ENABLE: u8 = 2;
const EVENT_DISABLE: u8 = 3;
const EVENT_SETUP: u8 = 4;
const EVENT_SUSPEND: u8 = 5;
const EVENT_RESUME: u8 = 6;

/// USB control request from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetupRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupRequest {
    /// Vendor request announcing an AP->SVC message of `length` bytes.
    pub fn svc_message(length: u16) -> Self {
        Self {
            request_type: USB_TYPE_VENDOR,
            request: SVC_MESSAGE_REQUEST,
            value: 0,
            index: 0,
            length,
        }
    }

    /// Whether the data stage of this request is an SVC message.
    pub fn is_svc_message(&self) -> bool {
        self.request == SVC_MESSAGE_REQUEST && self.request_type & USB_TYPE_VENDOR != 0
    }

    fn parse(src: &[u8]) -> Self {
        Self {
            request_type: src[0],
            request: src[1],
            value: u16::from_le_bytes([src[2], src[3]]),
            index: u16::from_le_bytes([src[4], src[5]]),
            length: u16::from_le_bytes([src[6], src[7]]),
        }
    }

    fn put(&self, dst: &mut [u8]) {
        dst[0] = self.request_type;
        dst[1] = self.request;
        dst[2..4].copy_from_slice(&self.value.to_le_bytes());
        dst[4..6].copy_from_slice(&self.index.to_le_bytes());
        dst[6..8].copy_from_slice(&self.length.to_le_bytes());
    }
}

/// Event read from the control endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Bind,
    Unbind,
    Enable,
    Disable,
    Setup(SetupRequest),
    Suspend,
    Resume,
    Unknown(u8),
}

impl ControlEvent {
    /// Decode one 12-byte event.
    pub fn decode(src: &[u8; EVENT_SIZE]) -> Self {
        match src[SETUP_SIZE] {
            EVENT_BIND => ControlEvent::Bind,
            EVENT_UNBIND => ControlEvent::Unbind,
            EVENT_ENABLE => ControlEvent::Enable,
            EVENT_DISABLE => ControlEvent::Disable,
            EVENT_SETUP => ControlEvent::Setup(SetupRequest::parse(&src[..SETUP_SIZE])),
            EVENT_SUSPEND => ControlEvent::Suspend,
            EVENT_RESUME => ControlEvent::Resume,
            other => ControlEvent::Unknown(other),
        }
    }

    /// Wire form of this event, as the kernel would deliver it.
    pub fn to_bytes(&self) -> [u8; EVENT_SIZE] {
        let mut buf = [0u8; EVENT_SIZE];
        let kind = match self {
            ControlEvent::Bind => EVENT_BIND,
            ControlEvent::Unbind => EVENT_UNBIND,
            ControlEvent::Enable => EVENT_ENABLE,
            ControlEvent::Disable => EVENT_DISABLE,
            ControlEvent::Setup(setup) => {
                setup.put(&mut buf[..SETUP_SIZE]);
                EVENT_SETUP
            }
            ControlEvent::Suspend => EVENT_SUSPEND,
            ControlEvent::Resume => EVENT_RESUME,
            ControlEvent::Unknown(kind) => *kind,
        };
        buf[SETUP_SIZE] = kind;
        buf
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlEvent::Bind => "BIND",
            ControlEvent::Unbind => "UNBIND",
            ControlEvent::Enable => "ENABLE",
            ControlEvent::Disable => "DISABLE",
            ControlEvent::Setup(_) => "SETUP",
            ControlEvent::Suspend => "SUSPEND",
            ControlEvent::Resume => "RESUME",
            ControlEvent::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Reads events and SETUP data stages from the control endpoint.
///
/// Every `fill_*` call is a single read that never goes past the event or
/// data stage being assembled. Partial items stay buffered, so a caller that
/// waits for readability first never blocks on a half-received event.
pub struct ControlReader<T> {
    inner: T,
    buf: Vec<u8>,
}

impl<T: Read> ControlReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(EVENT_SIZE),
        }
    }

    /// Take one event from buffered bytes.
    pub fn take_event(&mut self) -> Option<ControlEvent> {
        let raw: [u8; EVENT_SIZE] = self.buf.get(..EVENT_SIZE)?.try_into().ok()?;
        self.buf.drain(..EVENT_SIZE);
        Some(ControlEvent::decode(&raw))
    }

    /// Take a complete `length`-byte data stage from buffered bytes.
    pub fn take_data(&mut self, length: u16) -> Option<Vec<u8>> {
        let length = usize::from(length);
        if self.buf.len() < length {
            return None;
        }
        Some(self.buf.drain(..length).collect())
    }

    /// One read toward the next event.
    pub fn fill_event(&mut self) -> Result<usize> {
        self.fill(EVENT_SIZE)
    }

    /// One read toward a `length`-byte data stage.
    pub fn fill_data(&mut self, length: u16) -> Result<usize> {
        self.fill(usize::from(length))
    }

    fn fill(&mut self, target: usize) -> Result<usize> {
        // Never read past the item being assembled.
        let mut chunk = vec![0u8; target.saturating_sub(self.buf.len()).max(1)];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    return Err(SvcError::Disconnected(
                        "control endpoint closed".to_string(),
                    ))
                }
                Ok(read) => {
                    self.buf.extend_from_slice(&chunk[..read]);
                    return Ok(read);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(SvcError::Io(err)),
            }
        }
    }

    /// Bytes received but not yet returned.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop a partially received event or data stage.
    pub fn discard_buffered(&mut self) {
        self.buf.clear();
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

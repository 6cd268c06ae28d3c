use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Operation header: size (2) + id (2) + type (1) + result (1) + pad (2).
pub const HEADER_SIZE: usize = 8;

/// Response flag in the operation type byte.
pub const OP_RESPONSE: u8 = 0x80;

/// Largest message the 16-bit size field can describe.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Greybus protocol version advertised by the simulator.
pub const GREYBUS_VERSION_MAJOR: u8 = 0x00;
pub const GREYBUS_VERSION_MINOR: u8 = 0x01;

/// Decoded operation header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationHeader {
    /// Total message size including this header.
    pub size: u16,
    /// Correlates a response with its request.
    pub operation_id: u16,
    /// Operation type; the high bit marks a response.
    pub op_type: u8,
    /// Result status, meaningful on responses.
    pub result: u8,
    /// Out-of-band CPort tag.
    pub pad: [u8; 2],
}

impl OperationHeader {
    /// Returns true if the response flag is set.
    pub fn is_response(&self) -> bool {
        self.op_type & OP_RESPONSE != 0
    }

    /// Operation type with the response flag cleared.
    pub fn request_type(&self) -> u8 {
        self.op_type & !OP_RESPONSE
    }

    /// AP-side CPort id carried in the pad bytes.
    pub fn cport_tag(&self) -> u16 {
        u16::from_le_bytes(self.pad)
    }

    /// Payload length implied by `size`.
    pub fn payload_len(&self) -> usize {
        (self.size as usize).saturating_sub(HEADER_SIZE)
    }

    fn parse(src: &[u8]) -> Self {
        Self {
            size: u16::from_le_bytes([src[0], src[1]]),
            operation_id: u16::from_le_bytes([src[2], src[3]]),
            op_type: src[4],
            result: src[5],
            pad: [src[6], src[7]],
        }
    }

    fn response_header(&self, size: u16, result: u8, pad: [u8; 2]) -> OperationHeader {
        OperationHeader {
            size,
            operation_id: self.operation_id,
            op_type: OP_RESPONSE | self.op_type,
            result,
            pad,
        }
    }

    fn put(&self, dst: &mut BytesMut) {
        dst.put_u16_le(self.size);
        dst.put_u16_le(self.operation_id);
        dst.put_u8(self.op_type);
        dst.put_u8(self.result);
        dst.put_slice(&self.pad);
    }
}

/// A complete operation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: OperationHeader,
    pub payload: Bytes,
}

impl Message {
    /// Build a request addressed to the AP-side CPort `cport_tag`.
    pub fn request(
        operation_id: u16,
        op_type: u8,
        cport_tag: u16,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let payload = payload.into();
        let size = message_size(payload.len())?;
        Ok(Self {
            header: OperationHeader {
                size,
                operation_id,
                op_type: op_type & !OP_RESPONSE,
                result: 0,
                pad: cport_tag.to_le_bytes(),
            },
            payload,
        })
    }

    /// Build the response to `request`, tagged for the AP-side CPort `cport_tag`.
    pub fn response_to(
        request: &OperationHeader,
        result: u8,
        cport_tag: u16,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let payload = payload.into();
        let size = message_size(payload.len())?;
        Ok(Self {
            header: request.response_header(size, result, cport_tag.to_le_bytes()),
            payload,
        })
    }

    /// Empty response carrying `result`, with the request's pad bytes echoed.
    pub fn error_response(request: &OperationHeader, result: u8) -> Self {
        Self {
            header: request.response_header(HEADER_SIZE as u16, result, request.pad),
            payload: Bytes::new(),
        }
    }

    /// The total wire size of this message (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Append the wire form of this message to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        self.header.put(dst);
        dst.put_slice(&self.payload);
    }

    /// Wire form of this message.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        self.encode(&mut buf);
        buf.freeze()
    }
}

fn message_size(payload_len: usize) -> Result<u16> {
    let size = HEADER_SIZE + payload_len;
    u16::try_from(size).map_err(|_| FrameError::TooLarge {
        size,
        max: MAX_MESSAGE_SIZE,
    })
}

/// Decode an operation header from one complete transfer.
///
/// Returns the header and the payload bytes it declares. Bytes past the
/// declared size are not part of the message and are not returned.
///
/// Wire format:
/// ```text
/// ┌────────────┬────────────┬──────┬────────┬──────────┬─────────┐
/// │ Size       │ Op ID      │ Type │ Result │ Pad      │ Payload │
/// │ (2B LE)    │ (2B LE)    │ (1B) │ (1B)   │ (2B LE)  │         │
/// └────────────┴────────────┴──────┴────────┴──────────┴─────────┘
/// ```
pub fn decode_header(src: &[u8]) -> Result<(OperationHeader, &[u8])> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::Malformed {
            declared: HEADER_SIZE,
            received: src.len(),
        });
    }

    let header = OperationHeader::parse(src);
    let declared = header.size as usize;
    if declared < HEADER_SIZE || declared > src.len() {
        return Err(FrameError::Malformed {
            declared,
            received: src.len(),
        });
    }

    Ok((header, &src[HEADER_SIZE..declared]))
}

/// Decode one complete transfer into an owned message.
pub fn decode_message(src: &[u8]) -> Result<Message> {
    let (header, payload) = decode_header(src)?;
    Ok(Message {
        header,
        payload: Bytes::copy_from_slice(payload),
    })
}

/// Decode a message from a byte stream buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// On success, consumes the message bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_message_size: usize) -> Result<Option<Message>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let header = OperationHeader::parse(src);
    let declared = header.size as usize;

    if declared < HEADER_SIZE {
        return Err(FrameError::Malformed {
            declared,
            received: src.len(),
        });
    }
    if declared > max_message_size {
        return Err(FrameError::TooLarge {
            size: declared,
            max: max_message_size,
        });
    }
    if src.len() < declared {
        return Ok(None); // Need more data
    }

    let frame = src.split_to(declared).freeze();
    Ok(Some(Message {
        header,
        payload: frame.slice(HEADER_SIZE..),
    }))
}

/// Space-separated hex rendering used for verbose frame dumps.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum message size in bytes. Default: 65535.
    pub max_message_size: usize,
    /// Treat every read as exactly one transfer (FunctionFS endpoints).
    pub packetized: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
            packetized: false,
        }
    }
}

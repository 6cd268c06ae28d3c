//! Greybus operation and SVC message framing.
//!
//! Every CPort message starts with an 8-byte little-endian operation header:
//! - total message size (2 bytes)
//! - operation id correlating a response with its request (2 bytes)
//! - operation type, high bit set on responses (1 byte)
//! - result status, meaningful on responses (1 byte)
//! - two pad bytes carrying the AP-side CPort id
//!
//! SVC control-plane messages use their own 4-byte header and are defined in
//! [`svc`]. Module manifests are relayed opaquely; [`manifest`] only reads
//! their size header.

pub mod codec;
pub mod error;
pub mod manifest;
pub mod reader;
pub mod status;
pub mod svc;
pub mod writer;

pub use codec::{
    decode_frame, decode_header, decode_message, hex_dump, FrameConfig, Message, OperationHeader,
    GREYBUS_VERSION_MAJOR, GREYBUS_VERSION_MINOR, HEADER_SIZE, MAX_MESSAGE_SIZE, OP_RESPONSE,
};
pub use error::{FrameError, Result};
pub use manifest::{Manifest, ManifestHeader, MANIFEST_HEADER_SIZE};
pub use reader::FrameReader;
pub use status::Status;
pub use svc::{decode_svc_message, HandshakeType, SvcFunction, SvcMessage, SVC_HEADER_SIZE};
pub use writer::FrameWriter;

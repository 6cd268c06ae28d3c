//! SVC control-plane messages.
//!
//! Wire format:
//! ```text
//! ┌─────────────┬──────────────┬────────────────┬──────────────────────┐
//! │ Function ID │ Message type │ Payload length │ Function payload     │
//! │ (1B)        │ (1B)         │ (2B LE)        │ (payload length B)   │
//! └─────────────┴──────────────┴────────────────┴──────────────────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{GREYBUS_VERSION_MAJOR, GREYBUS_VERSION_MINOR};
use crate::error::{FrameError, Result};

/// SVC header: function id (1) + message type (1) + payload length (2).
pub const SVC_HEADER_SIZE: usize = 4;

const MSG_DATA: u8 = 0x00;
const MSG_ERROR: u8 = 0xff;

const MGMT_AP_ID: u8 = 0x00;
const MGMT_LINK_UP: u8 = 0x01;
const MGMT_SET_ROUTE: u8 = 0x02;

const HOTPLUG_EVENT: u8 = 0x00;
const HOTUNPLUG_EVENT: u8 = 0x01;

const HANDSHAKE_PAYLOAD_SIZE: usize = 3;
const MANAGEMENT_PAYLOAD_SIZE: usize = 3;
const HOTPLUG_BASE_PAYLOAD_SIZE: usize = 2;

/// SVC function identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SvcFunction {
    Handshake = 0x00,
    UniproNetworkManagement = 0x01,
    Hotplug = 0x02,
    Power = 0x03,
    Epm = 0x04,
    Suspend = 0x05,
}

impl SvcFunction {
    pub fn name(self) -> &'static str {
        match self {
            SvcFunction::Handshake => "HANDSHAKE",
            SvcFunction::UniproNetworkManagement => "UNIPRO_NETWORK_MANAGEMENT",
            SvcFunction::Hotplug => "HOTPLUG",
            SvcFunction::Power => "POWER",
            SvcFunction::Epm => "EPM",
            SvcFunction::Suspend => "SUSPEND",
        }
    }
}

impl TryFrom<u8> for SvcFunction {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x00 => Ok(SvcFunction::Handshake),
            0x01 => Ok(SvcFunction::UniproNetworkManagement),
            0x02 => Ok(SvcFunction::Hotplug),
            0x03 => Ok(SvcFunction::Power),
            0x04 => Ok(SvcFunction::Epm),
            0x05 => Ok(SvcFunction::Suspend),
            other => Err(other),
        }
    }
}

/// Handshake message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    SvcHello = 0x00,
    ApHello = 0x01,
    ModulesHello = 0x02,
}

/// A decoded SVC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SvcMessage {
    /// Version handshake. `handshake_type` is kept raw so mismatches can be
    /// reported as received.
    Handshake {
        version_major: u8,
        version_minor: u8,
        handshake_type: u8,
    },
    /// Device id assigned to the AP interface.
    ApId { interface_id: u8, device_id: u8 },
    /// UniPro link to an interface came up.
    LinkUp { interface_id: u8, device_id: u8 },
    /// AP request to route to a device.
    SetRoute { device_id: u8 },
    /// Module inserted, with its manifest relayed verbatim.
    Hotplug { interface_id: u8, manifest: Bytes },
    /// Module removed.
    HotUnplug { interface_id: u8 },
    /// Message flagged as a session error by the sender.
    Error { function_id: u8 },
}

impl SvcMessage {
    /// The SVC->AP opening handshake.
    pub fn svc_hello() -> Self {
        SvcMessage::Handshake {
            version_major: GREYBUS_VERSION_MAJOR,
            version_minor: GREYBUS_VERSION_MINOR,
            handshake_type: HandshakeType::SvcHello as u8,
        }
    }

    /// The AP->SVC handshake reply the simulator expects.
    pub fn ap_hello() -> Self {
        SvcMessage::Handshake {
            version_major: GREYBUS_VERSION_MAJOR,
            version_minor: GREYBUS_VERSION_MINOR,
            handshake_type: HandshakeType::ApHello as u8,
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            SvcMessage::Handshake { .. } => "handshake",
            SvcMessage::ApId { .. } => "ap_id",
            SvcMessage::LinkUp { .. } => "link_up",
            SvcMessage::SetRoute { .. } => "set_route",
            SvcMessage::Hotplug { .. } => "hotplug",
            SvcMessage::HotUnplug { .. } => "hot_unplug",
            SvcMessage::Error { .. } => "error",
        }
    }

    /// Append the wire form of this message to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            SvcMessage::Handshake {
                version_major,
                version_minor,
                handshake_type,
            } => {
                put_header(dst, SvcFunction::Handshake as u8, MSG_DATA, HANDSHAKE_PAYLOAD_SIZE);
                dst.put_u8(*version_major);
                dst.put_u8(*version_minor);
                dst.put_u8(*handshake_type);
            }
            SvcMessage::ApId {
                interface_id,
                device_id,
            } => put_management(dst, MGMT_AP_ID, *interface_id, *device_id),
            SvcMessage::LinkUp {
                interface_id,
                device_id,
            } => put_management(dst, MGMT_LINK_UP, *interface_id, *device_id),
            SvcMessage::SetRoute { device_id } => {
                put_management(dst, MGMT_SET_ROUTE, *device_id, 0)
            }
            SvcMessage::Hotplug {
                interface_id,
                manifest,
            } => {
                let payload_len = HOTPLUG_BASE_PAYLOAD_SIZE + manifest.len();
                if payload_len > u16::MAX as usize {
                    return Err(FrameError::TooLarge {
                        size: payload_len,
                        max: u16::MAX as usize,
                    });
                }
                put_header(dst, SvcFunction::Hotplug as u8, MSG_DATA, payload_len);
                dst.put_u8(HOTPLUG_EVENT);
                dst.put_u8(*interface_id);
                dst.put_slice(manifest);
            }
            SvcMessage::HotUnplug { interface_id } => {
                put_header(
                    dst,
                    SvcFunction::Hotplug as u8,
                    MSG_DATA,
                    HOTPLUG_BASE_PAYLOAD_SIZE,
                );
                dst.put_u8(HOTUNPLUG_EVENT);
                dst.put_u8(*interface_id);
            }
            SvcMessage::Error { function_id } => put_header(dst, *function_id, MSG_ERROR, 0),
        }
        Ok(())
    }

    /// Wire form of this message.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(SVC_HEADER_SIZE + MANAGEMENT_PAYLOAD_SIZE);
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}

fn put_header(dst: &mut BytesMut, function_id: u8, message_type: u8, payload_len: usize) {
    dst.reserve(SVC_HEADER_SIZE + payload_len);
    dst.put_u8(function_id);
    dst.put_u8(message_type);
    dst.put_u16_le(payload_len as u16);
}

fn put_management(dst: &mut BytesMut, packet_type: u8, first: u8, second: u8) {
    put_header(
        dst,
        SvcFunction::UniproNetworkManagement as u8,
        MSG_DATA,
        MANAGEMENT_PAYLOAD_SIZE,
    );
    dst.put_u8(packet_type);
    dst.put_u8(first);
    dst.put_u8(second);
}

/// Decode one SVC message.
pub fn decode_svc_message(src: &[u8]) -> Result<SvcMessage> {
    if src.len() < SVC_HEADER_SIZE {
        return Err(FrameError::MalformedSvc(format!(
            "header needs {SVC_HEADER_SIZE} bytes, got {}",
            src.len()
        )));
    }

    let function_id = src[0];
    let message_type = src[1];
    let payload_len = u16::from_le_bytes([src[2], src[3]]) as usize;

    if message_type == MSG_ERROR {
        return Ok(SvcMessage::Error { function_id });
    }
    if message_type != MSG_DATA {
        return Err(FrameError::MalformedSvc(format!(
            "unknown message type {message_type:#04x}"
        )));
    }

    let body = &src[SVC_HEADER_SIZE..];
    if body.len() < payload_len {
        return Err(FrameError::MalformedSvc(format!(
            "declared payload {payload_len} bytes, got {}",
            body.len()
        )));
    }
    let payload = &body[..payload_len];

    match SvcFunction::try_from(function_id) {
        Ok(SvcFunction::Handshake) => {
            let p = require(payload, HANDSHAKE_PAYLOAD_SIZE, "handshake")?;
            Ok(SvcMessage::Handshake {
                version_major: p[0],
                version_minor: p[1],
                handshake_type: p[2],
            })
        }
        Ok(SvcFunction::UniproNetworkManagement) => decode_management(payload),
        Ok(SvcFunction::Hotplug) => {
            let p = require(payload, HOTPLUG_BASE_PAYLOAD_SIZE, "hotplug")?;
            match p[0] {
                HOTPLUG_EVENT => Ok(SvcMessage::Hotplug {
                    interface_id: p[1],
                    manifest: Bytes::copy_from_slice(&p[HOTPLUG_BASE_PAYLOAD_SIZE..]),
                }),
                HOTUNPLUG_EVENT => Ok(SvcMessage::HotUnplug { interface_id: p[1] }),
                kind => Err(FrameError::UnsupportedSvc { function_id, kind }),
            }
        }
        _ => Err(FrameError::UnsupportedSvc {
            function_id,
            kind: payload.first().copied().unwrap_or(0),
        }),
    }
}

fn decode_management(payload: &[u8]) -> Result<SvcMessage> {
    let packet_type = match payload.first() {
        Some(t) => *t,
        None => {
            return Err(FrameError::MalformedSvc(
                "empty management payload".to_string(),
            ))
        }
    };

    match packet_type {
        MGMT_AP_ID => {
            let p = require(payload, MANAGEMENT_PAYLOAD_SIZE, "ap_id")?;
            Ok(SvcMessage::ApId {
                interface_id: p[1],
                device_id: p[2],
            })
        }
        MGMT_LINK_UP => {
            let p = require(payload, MANAGEMENT_PAYLOAD_SIZE, "link_up")?;
            Ok(SvcMessage::LinkUp {
                interface_id: p[1],
                device_id: p[2],
            })
        }
        MGMT_SET_ROUTE => {
            let p = require(payload, 2, "set_route")?;
            Ok(SvcMessage::SetRoute { device_id: p[1] })
        }
        kind => Err(FrameError::UnsupportedSvc {
            function_id: SvcFunction::UniproNetworkManagement as u8,
            kind,
        }),
    }
}

fn require<'a>(payload: &'a [u8], len: usize, what: &str) -> Result<&'a [u8]> {
    if payload.len() < len {
        return Err(FrameError::MalformedSvc(format!(
            "{what} payload needs {len} bytes, got {}",
            payload.len()
        )));
    }
    Ok(payload)
}

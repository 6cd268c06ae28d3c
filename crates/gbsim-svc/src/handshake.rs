use gbsim_frame::{HandshakeType, SvcMessage, GREYBUS_VERSION_MAJOR, GREYBUS_VERSION_MINOR};

use crate::error::{Result, SvcError};

/// Interface id the AP is assigned after a successful handshake.
pub const AP_INTERFACE_ID: u8 = 0;

/// Device id the AP is assigned after a successful handshake.
pub const AP_DEVICE_ID: u8 = 1;

/// Check that `message` is the AP half of the version handshake.
pub fn validate_ap_hello(message: &SvcMessage) -> Result<()> {
    let SvcMessage::Handshake {
        version_major,
        version_minor,
        handshake_type,
    } = message
    else {
        return Err(SvcError::HandshakeInvalid(format!(
            "expected handshake, got {}",
            message.name()
        )));
    };

    if (*version_major, *version_minor) != (GREYBUS_VERSION_MAJOR, GREYBUS_VERSION_MINOR) {
        return Err(SvcError::HandshakeInvalid(format!(
            "version {version_major}.{version_minor} (expected {GREYBUS_VERSION_MAJOR}.{GREYBUS_VERSION_MINOR})"
        )));
    }

    if *handshake_type != HandshakeType::ApHello as u8 {
        return Err(SvcError::HandshakeInvalid(format!(
            "handshake type {handshake_type:#04x} (expected AP_HELLO)"
        )));
    }

    Ok(())
}

/// AP-ID assignment sent once the handshake completes.
pub fn ap_id_assignment() -> SvcMessage {
    SvcMessage::ApId {
        interface_id: AP_INTERFACE_ID,
        device_id: AP_DEVICE_ID,
    }
}

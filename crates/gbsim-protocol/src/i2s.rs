//! I2S management and data protocols.
//!
//! The management CPort advertises one fixed audio configuration and
//! acknowledges configuration changes. Data CPorts acknowledge audio
//! payloads without looking at them.

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::error::{HandlerError, Result};
use crate::handler::{OperationContext, OperationHandler, Response};
use crate::protocol::ProtocolClass;

/// Configuration slots in a GET_SUPPORTED_CONFIGURATIONS response.
pub const CONFIG_COUNT_MAX: usize = 20;

/// Wire size of one configuration slot.
pub const CONFIGURATION_SIZE: usize = 24;

/// Response size: count + pad[3] + every slot.
pub const SUPPORTED_CONFIGURATIONS_SIZE: usize = 4 + CONFIG_COUNT_MAX * CONFIGURATION_SIZE;

pub const BYTE_ORDER_LE: u8 = 1 << 2;
pub const SPATIAL_LOCATION_FL: u32 = 1 << 0;
pub const SPATIAL_LOCATION_FR: u32 = 1 << 1;
pub const PROTOCOL_I2S: u32 = 1 << 1;
pub const ROLE_MASTER: u8 = 1 << 0;
pub const POLARITY_NORMAL: u8 = 1 << 0;
pub const EDGE_RISING: u8 = 1 << 0;
pub const EDGE_FALLING: u8 = 1 << 1;

/// I2S management request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum I2sMgmtOperation {
    ProtocolVersion = 0x01,
    GetSupportedConfigurations = 0x02,
    SetConfiguration = 0x03,
    SetSamplesPerMessage = 0x04,
    GetProcessingDelay = 0x05,
    SetStartDelay = 0x06,
    ActivateCport = 0x07,
    DeactivateCport = 0x08,
    ReportEvent = 0x09,
}

impl I2sMgmtOperation {
    pub fn name(self) -> &'static str {
        match self {
            I2sMgmtOperation::ProtocolVersion => "protocol_version",
            I2sMgmtOperation::GetSupportedConfigurations => "get_supported_configurations",
            I2sMgmtOperation::SetConfiguration => "set_configuration",
            I2sMgmtOperation::SetSamplesPerMessage => "set_samples_per_message",
            I2sMgmtOperation::GetProcessingDelay => "get_processing_delay",
            I2sMgmtOperation::SetStartDelay => "set_start_delay",
            I2sMgmtOperation::ActivateCport => "activate_cport",
            I2sMgmtOperation::DeactivateCport => "deactivate_cport",
            I2sMgmtOperation::ReportEvent => "report_event",
        }
    }
}

impl TryFrom<u8> for I2sMgmtOperation {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x01 => Ok(I2sMgmtOperation::ProtocolVersion),
            0x02 => Ok(I2sMgmtOperation::GetSupportedConfigurations),
            0x03 => Ok(I2sMgmtOperation::SetConfiguration),
            0x04 => Ok(I2sMgmtOperation::SetSamplesPerMessage),
            0x05 => Ok(I2sMgmtOperation::GetProcessingDelay),
            0x06 => Ok(I2sMgmtOperation::SetStartDelay),
            0x07 => Ok(I2sMgmtOperation::ActivateCport),
            0x08 => Ok(I2sMgmtOperation::DeactivateCport),
            0x09 => Ok(I2sMgmtOperation::ReportEvent),
            other => Err(other),
        }
    }
}

/// I2S data request types, shared by receiver and transmitter CPorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum I2sDataOperation {
    ProtocolVersion = 0x01,
    SendData = 0x02,
}

impl I2sDataOperation {
    pub fn name(self) -> &'static str {
        match self {
            I2sDataOperation::ProtocolVersion => "protocol_version",
            I2sDataOperation::SendData => "send_data",
        }
    }
}

impl TryFrom<u8> for I2sDataOperation {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x01 => Ok(I2sDataOperation::ProtocolVersion),
            0x02 => Ok(I2sDataOperation::SendData),
            other => Err(other),
        }
    }
}

/// One audio configuration slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2sConfiguration {
    pub sample_frequency: u32,
    pub num_channels: u8,
    pub bytes_per_channel: u8,
    pub byte_order: u8,
    pub spatial_locations: u32,
    pub ll_protocol: u32,
    pub ll_mclk_role: u8,
    pub ll_bclk_role: u8,
    pub ll_wclk_role: u8,
    pub ll_wclk_polarity: u8,
    pub ll_wclk_change_edge: u8,
    pub ll_wclk_tx_edge: u8,
    pub ll_wclk_rx_edge: u8,
    pub ll_data_offset: u8,
}

impl I2sConfiguration {
    /// 48 kHz stereo, 16-bit little endian, I2S framing with every clock mastered.
    pub fn stereo_48k() -> Self {
        Self {
            sample_frequency: 48_000,
            num_channels: 2,
            bytes_per_channel: 2,
            byte_order: BYTE_ORDER_LE,
            spatial_locations: SPATIAL_LOCATION_FL | SPATIAL_LOCATION_FR,
            ll_protocol: PROTOCOL_I2S,
            ll_mclk_role: ROLE_MASTER,
            ll_bclk_role: ROLE_MASTER,
            ll_wclk_role: ROLE_MASTER,
            ll_wclk_polarity: POLARITY_NORMAL,
            ll_wclk_change_edge: EDGE_FALLING,
            ll_wclk_tx_edge: EDGE_RISING,
            ll_wclk_rx_edge: EDGE_FALLING,
            ll_data_offset: 1,
        }
    }

    fn put(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.sample_frequency);
        dst.put_u8(self.num_channels);
        dst.put_u8(self.bytes_per_channel);
        dst.put_u8(self.byte_order);
        dst.put_u8(0);
        dst.put_u32_le(self.spatial_locations);
        dst.put_u32_le(self.ll_protocol);
        dst.put_u8(self.ll_mclk_role);
        dst.put_u8(self.ll_bclk_role);
        dst.put_u8(self.ll_wclk_role);
        dst.put_u8(self.ll_wclk_polarity);
        dst.put_u8(self.ll_wclk_change_edge);
        dst.put_u8(self.ll_wclk_tx_edge);
        dst.put_u8(self.ll_wclk_rx_edge);
        dst.put_u8(self.ll_data_offset);
    }
}

/// I2S management CPort.
pub struct I2sMgmtHandler {
    configurations: Vec<I2sConfiguration>,
}

impl I2sMgmtHandler {
    pub fn new() -> Self {
        Self {
            configurations: vec![I2sConfiguration::stereo_48k()],
        }
    }

    fn supported_configurations(&self) -> Response {
        let mut buf = BytesMut::with_capacity(SUPPORTED_CONFIGURATIONS_SIZE);
        buf.put_u8(self.configurations.len() as u8);
        buf.put_bytes(0, 3);
        for config in &self.configurations {
            config.put(&mut buf);
        }
        // Unused slots are zero; the response always carries every slot.
        buf.resize(SUPPORTED_CONFIGURATIONS_SIZE, 0);
        Response::with_payload(buf.freeze())
    }
}

impl Default for I2sMgmtHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationHandler for I2sMgmtHandler {
    fn protocol(&self) -> ProtocolClass {
        ProtocolClass::I2sMgmt
    }

    fn handle(
        &mut self,
        ctx: &OperationContext,
        op_type: u8,
        _payload: &[u8],
    ) -> Result<Response> {
        let op = I2sMgmtOperation::try_from(op_type).map_err(HandlerError::Unsupported)?;
        debug!(module = ctx.module_id, cport = ctx.cport_id, operation = op.name(), "i2s mgmt");

        match op {
            I2sMgmtOperation::ProtocolVersion => Ok(Response::version()),
            I2sMgmtOperation::GetSupportedConfigurations => Ok(self.supported_configurations()),
            I2sMgmtOperation::SetConfiguration
            | I2sMgmtOperation::SetSamplesPerMessage
            | I2sMgmtOperation::SetStartDelay
            | I2sMgmtOperation::ActivateCport
            | I2sMgmtOperation::DeactivateCport => Ok(Response::ack()),
            I2sMgmtOperation::GetProcessingDelay | I2sMgmtOperation::ReportEvent => {
                Err(HandlerError::Unsupported(op_type))
            }
        }
    }
}

/// I2S receiver or transmitter CPort.
pub struct I2sDataHandler {
    protocol: ProtocolClass,
    payload_bytes: u64,
}

impl I2sDataHandler {
    pub fn new(protocol: ProtocolClass) -> Self {
        Self {
            protocol,
            payload_bytes: 0,
        }
    }

    /// Total audio payload bytes acknowledged so far.
    pub fn bytes_received(&self) -> u64 {
        self.payload_bytes
    }
}

impl OperationHandler for I2sDataHandler {
    fn protocol(&self) -> ProtocolClass {
        self.protocol
    }

    fn handle(
        &mut self,
        ctx: &OperationContext,
        op_type: u8,
        payload: &[u8],
    ) -> Result<Response> {
        let op = I2sDataOperation::try_from(op_type).map_err(HandlerError::Unsupported)?;
        match op {
            I2sDataOperation::ProtocolVersion => Ok(Response::version()),
            I2sDataOperation::SendData => {
                self.payload_bytes = self.payload_bytes.saturating_add(payload.len() as u64);
                debug!(
                    module = ctx.module_id,
                    cport = ctx.cport_id,
                    bytes = payload.len(),
                    "i2s data"
                );
                Ok(Response::ack())
            }
        }
    }
}

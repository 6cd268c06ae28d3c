use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendKind, NullBackend, SimulatedGpio, SimulatedPwm};
use crate::error::{HandlerError, Result};
use crate::gpio::{GpioHandler, GpioOperation, GPIO_LINES};
use crate::handler::OperationHandler;
use crate::i2s::{I2sDataHandler, I2sDataOperation, I2sMgmtHandler, I2sMgmtOperation};
use crate::pwm::{PwmHandler, PwmOperation, PWM_CHANNELS};

/// Greybus protocol classes a CPort can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ProtocolClass {
    Control = 0x00,
    Ap = 0x01,
    Gpio = 0x02,
    I2c = 0x03,
    Uart = 0x04,
    Hid = 0x05,
    Usb = 0x06,
    Sdio = 0x07,
    Battery = 0x08,
    Pwm = 0x09,
    I2sMgmt = 0x0a,
    Spi = 0x0b,
    Display = 0x0c,
    Camera = 0x0d,
    Sensor = 0x0e,
    Led = 0x0f,
    Vibrator = 0x10,
    Loopback = 0x11,
    I2sReceiver = 0x12,
    I2sTransmitter = 0x13,
}

impl ProtocolClass {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ProtocolClass::Control => "control",
            ProtocolClass::Ap => "ap",
            ProtocolClass::Gpio => "gpio",
            ProtocolClass::I2c => "i2c",
            ProtocolClass::Uart => "uart",
            ProtocolClass::Hid => "hid",
            ProtocolClass::Usb => "usb",
            ProtocolClass::Sdio => "sdio",
            ProtocolClass::Battery => "battery",
            ProtocolClass::Pwm => "pwm",
            ProtocolClass::I2sMgmt => "i2s_mgmt",
            ProtocolClass::Spi => "spi",
            ProtocolClass::Display => "display",
            ProtocolClass::Camera => "camera",
            ProtocolClass::Sensor => "sensor",
            ProtocolClass::Led => "led",
            ProtocolClass::Vibrator => "vibrator",
            ProtocolClass::Loopback => "loopback",
            ProtocolClass::I2sReceiver => "i2s_receiver",
            ProtocolClass::I2sTransmitter => "i2s_transmitter",
        }
    }

    /// Whether the simulator ships a handler for this class.
    pub fn has_handler(self) -> bool {
        matches!(
            self,
            ProtocolClass::Gpio
                | ProtocolClass::Pwm
                | ProtocolClass::I2sMgmt
                | ProtocolClass::I2sReceiver
                | ProtocolClass::I2sTransmitter
        )
    }

    /// Display name of a request type within this protocol, for logs.
    pub fn operation_name(self, op_type: u8) -> &'static str {
        let name = match self {
            ProtocolClass::Pwm => PwmOperation::try_from(op_type).ok().map(PwmOperation::name),
            ProtocolClass::Gpio => GpioOperation::try_from(op_type).ok().map(GpioOperation::name),
            ProtocolClass::I2sMgmt => I2sMgmtOperation::try_from(op_type)
                .ok()
                .map(I2sMgmtOperation::name),
            ProtocolClass::I2sReceiver | ProtocolClass::I2sTransmitter => {
                I2sDataOperation::try_from(op_type)
                    .ok()
                    .map(I2sDataOperation::name)
            }
            _ => None,
        };
        name.unwrap_or("unknown")
    }
}

impl TryFrom<u8> for ProtocolClass {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        let class = match value {
            0x00 => ProtocolClass::Control,
            0x01 => ProtocolClass::Ap,
            0x02 => ProtocolClass::Gpio,
            0x03 => ProtocolClass::I2c,
            0x04 => ProtocolClass::Uart,
            0x05 => ProtocolClass::Hid,
            0x06 => ProtocolClass::Usb,
            0x07 => ProtocolClass::Sdio,
            0x08 => ProtocolClass::Battery,
            0x09 => ProtocolClass::Pwm,
            0x0a => ProtocolClass::I2sMgmt,
            0x0b => ProtocolClass::Spi,
            0x0c => ProtocolClass::Display,
            0x0d => ProtocolClass::Camera,
            0x0e => ProtocolClass::Sensor,
            0x0f => ProtocolClass::Led,
            0x10 => ProtocolClass::Vibrator,
            0x11 => ProtocolClass::Loopback,
            0x12 => ProtocolClass::I2sReceiver,
            0x13 => ProtocolClass::I2sTransmitter,
            other => return Err(other),
        };
        Ok(class)
    }
}

impl fmt::Display for ProtocolClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build a fresh handler for `class` on top of the selected backend.
pub fn create_handler(
    class: ProtocolClass,
    backend: BackendKind,
) -> Result<Box<dyn OperationHandler>> {
    let handler: Box<dyn OperationHandler> = match (class, backend) {
        (ProtocolClass::Pwm, BackendKind::None) => Box::new(PwmHandler::new(NullBackend)),
        (ProtocolClass::Pwm, BackendKind::Simulated) => {
            Box::new(PwmHandler::new(SimulatedPwm::new(PWM_CHANNELS)))
        }
        (ProtocolClass::Gpio, BackendKind::None) => Box::new(GpioHandler::new(NullBackend)),
        (ProtocolClass::Gpio, BackendKind::Simulated) => {
            Box::new(GpioHandler::new(SimulatedGpio::new(GPIO_LINES)))
        }
        (ProtocolClass::I2sMgmt, _) => Box::new(I2sMgmtHandler::new()),
        (ProtocolClass::I2sReceiver | ProtocolClass::I2sTransmitter, _) => {
            Box::new(I2sDataHandler::new(class))
        }
        (other, _) => return Err(HandlerError::NoHandler(other)),
    };
    Ok(handler)
}

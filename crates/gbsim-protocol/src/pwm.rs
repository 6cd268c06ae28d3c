use bytes::Bytes;
use gbsim_frame::Status;
use tracing::debug;

use crate::backend::PwmBackend;
use crate::error::{HandlerError, Result};
use crate::handler::{require_len, selector, OperationContext, OperationHandler, Response};
use crate::protocol::ProtocolClass;

/// Channels exposed by the simulated PWM controller.
pub const PWM_CHANNELS: usize = 2;

/// PWM request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PwmOperation {
    Invalid = 0x00,
    ProtocolVersion = 0x01,
    PwmCount = 0x02,
    Activate = 0x03,
    Deactivate = 0x04,
    Config = 0x05,
    Polarity = 0x06,
    Enable = 0x07,
    Disable = 0x08,
}

impl PwmOperation {
    pub fn name(self) -> &'static str {
        match self {
            PwmOperation::Invalid => "invalid",
            PwmOperation::ProtocolVersion => "protocol_version",
            PwmOperation::PwmCount => "pwm_count",
            PwmOperation::Activate => "activate",
            PwmOperation::Deactivate => "deactivate",
            PwmOperation::Config => "config",
            PwmOperation::Polarity => "polarity",
            PwmOperation::Enable => "enable",
            PwmOperation::Disable => "disable",
        }
    }
}

impl TryFrom<u8> for PwmOperation {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x00 => Ok(PwmOperation::Invalid),
            0x01 => Ok(PwmOperation::ProtocolVersion),
            0x02 => Ok(PwmOperation::PwmCount),
            0x03 => Ok(PwmOperation::Activate),
            0x04 => Ok(PwmOperation::Deactivate),
            0x05 => Ok(PwmOperation::Config),
            0x06 => Ok(PwmOperation::Polarity),
            0x07 => Ok(PwmOperation::Enable),
            0x08 => Ok(PwmOperation::Disable),
            other => Err(other),
        }
    }
}

/// PWM controller with two channels.
///
/// The enabled flag of each channel is tracked here regardless of backend:
/// polarity cannot change while a channel runs.
pub struct PwmHandler<B> {
    backend: B,
    enabled: [bool; PWM_CHANNELS],
}

impl<B: PwmBackend> PwmHandler<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            enabled: [false; PWM_CHANNELS],
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_enabled(&self, which: usize) -> bool {
        self.enabled.get(which).copied().unwrap_or(false)
    }
}

impl<B: PwmBackend> OperationHandler for PwmHandler<B> {
    fn protocol(&self) -> ProtocolClass {
        ProtocolClass::Pwm
    }

    fn handle(
        &mut self,
        ctx: &OperationContext,
        op_type: u8,
        payload: &[u8],
    ) -> Result<Response> {
        let op = PwmOperation::try_from(op_type).map_err(HandlerError::Unsupported)?;
        let name = op.name();

        let response = match op {
            PwmOperation::Invalid => return Err(HandlerError::Unsupported(op_type)),
            PwmOperation::ProtocolVersion => Response::version(),
            PwmOperation::PwmCount => {
                // The count field is the highest channel index.
                Response::with_payload(Bytes::from(vec![(PWM_CHANNELS - 1) as u8]))
            }
            PwmOperation::Activate | PwmOperation::Deactivate => {
                let which = selector(name, payload, PWM_CHANNELS)?;
                self.backend.activate(which, op == PwmOperation::Activate);
                debug!(module = ctx.module_id, cport = ctx.cport_id, which, operation = name, "pwm");
                Response::ack()
            }
            PwmOperation::Config => {
                require_len(name, payload, 9)?;
                let which = selector(name, payload, PWM_CHANNELS)?;
                let duty = u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]);
                let period = u32::from_le_bytes([payload[5], payload[6], payload[7], payload[8]]);
                self.backend.configure(which, duty, period);
                debug!(
                    module = ctx.module_id,
                    cport = ctx.cport_id,
                    which,
                    duty_ns = duty,
                    period_ns = period,
                    "pwm config"
                );
                Response::ack()
            }
            PwmOperation::Polarity => {
                require_len(name, payload, 2)?;
                let which = selector(name, payload, PWM_CHANNELS)?;
                if self.enabled[which] {
                    debug!(
                        module = ctx.module_id,
                        cport = ctx.cport_id,
                        which,
                        "pwm busy, polarity unchanged"
                    );
                    Response::with_status(Status::Busy)
                } else {
                    let inverted = payload[1] != 0;
                    self.backend.set_polarity(which, inverted);
                    debug!(
                        module = ctx.module_id,
                        cport = ctx.cport_id,
                        which,
                        inverted,
                        "pwm polarity"
                    );
                    Response::ack()
                }
            }
            PwmOperation::Enable | PwmOperation::Disable => {
                let which = selector(name, payload, PWM_CHANNELS)?;
                let on = op == PwmOperation::Enable;
                self.enabled[which] = on;
                self.backend.set_enabled(which, on);
                debug!(module = ctx.module_id, cport = ctx.cport_id, which, operation = name, "pwm");
                Response::ack()
            }
        };

        Ok(response)
    }
}

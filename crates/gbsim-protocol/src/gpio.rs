use bytes::Bytes;
use tracing::debug;

use crate::backend::GpioBackend;
use crate::error::{HandlerError, Result};
use crate::handler::{require_len, selector, OperationContext, OperationHandler, Response};
use crate::protocol::ProtocolClass;

/// Lines exposed by the simulated GPIO controller.
pub const GPIO_LINES: usize = 6;

/// GPIO request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GpioOperation {
    ProtocolVersion = 0x01,
    LineCount = 0x02,
    Activate = 0x03,
    Deactivate = 0x04,
    GetDirection = 0x05,
    DirectionIn = 0x06,
    DirectionOut = 0x07,
    GetValue = 0x08,
    SetValue = 0x09,
    SetDebounce = 0x0a,
    IrqType = 0x0b,
    IrqAck = 0x0c,
    IrqMask = 0x0d,
    IrqUnmask = 0x0e,
    IrqEvent = 0x0f,
}

impl GpioOperation {
    pub fn name(self) -> &'static str {
        match self {
            GpioOperation::ProtocolVersion => "protocol_version",
            GpioOperation::LineCount => "line_count",
            GpioOperation::Activate => "activate",
            GpioOperation::Deactivate => "deactivate",
            GpioOperation::GetDirection => "get_direction",
            GpioOperation::DirectionIn => "direction_in",
            GpioOperation::DirectionOut => "direction_out",
            GpioOperation::GetValue => "get_value",
            GpioOperation::SetValue => "set_value",
            GpioOperation::SetDebounce => "set_debounce",
            GpioOperation::IrqType => "irq_type",
            GpioOperation::IrqAck => "irq_ack",
            GpioOperation::IrqMask => "irq_mask",
            GpioOperation::IrqUnmask => "irq_unmask",
            GpioOperation::IrqEvent => "irq_event",
        }
    }
}

impl TryFrom<u8> for GpioOperation {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        let op = match value {
            0x01 => GpioOperation::ProtocolVersion,
            0x02 => GpioOperation::LineCount,
            0x03 => GpioOperation::Activate,
            0x04 => GpioOperation::Deactivate,
            0x05 => GpioOperation::GetDirection,
            0x06 => GpioOperation::DirectionIn,
            0x07 => GpioOperation::DirectionOut,
            0x08 => GpioOperation::GetValue,
            0x09 => GpioOperation::SetValue,
            0x0a => GpioOperation::SetDebounce,
            0x0b => GpioOperation::IrqType,
            0x0c => GpioOperation::IrqAck,
            0x0d => GpioOperation::IrqMask,
            0x0e => GpioOperation::IrqUnmask,
            0x0f => GpioOperation::IrqEvent,
            other => return Err(other),
        };
        Ok(op)
    }
}

/// GPIO controller with six lines.
pub struct GpioHandler<B> {
    backend: B,
}

impl<B: GpioBackend> GpioHandler<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: GpioBackend> OperationHandler for GpioHandler<B> {
    fn protocol(&self) -> ProtocolClass {
        ProtocolClass::Gpio
    }

    fn handle(
        &mut self,
        ctx: &OperationContext,
        op_type: u8,
        payload: &[u8],
    ) -> Result<Response> {
        let op = GpioOperation::try_from(op_type).map_err(HandlerError::Unsupported)?;
        let name = op.name();

        let response = match op {
            GpioOperation::ProtocolVersion => return Ok(Response::version()),
            // The count field is the highest line index.
            GpioOperation::LineCount => {
                return Ok(Response::with_payload(Bytes::from(vec![
                    (GPIO_LINES - 1) as u8,
                ])))
            }
            // Sent by the module, never requested by the AP.
            GpioOperation::IrqEvent => return Err(HandlerError::Unsupported(op_type)),
            GpioOperation::Activate | GpioOperation::Deactivate => {
                let which = selector(name, payload, GPIO_LINES)?;
                self.backend.activate(which, op == GpioOperation::Activate);
                Response::ack()
            }
            GpioOperation::GetDirection => {
                let which = selector(name, payload, GPIO_LINES)?;
                Response::with_payload(Bytes::from(vec![self.backend.direction(which)]))
            }
            GpioOperation::DirectionIn => {
                let which = selector(name, payload, GPIO_LINES)?;
                self.backend.set_input(which);
                Response::ack()
            }
            GpioOperation::DirectionOut => {
                require_len(name, payload, 2)?;
                let which = selector(name, payload, GPIO_LINES)?;
                self.backend.set_output(which, payload[1]);
                Response::ack()
            }
            GpioOperation::GetValue => {
                let which = selector(name, payload, GPIO_LINES)?;
                Response::with_payload(Bytes::from(vec![self.backend.value(which)]))
            }
            GpioOperation::SetValue => {
                require_len(name, payload, 2)?;
                let which = selector(name, payload, GPIO_LINES)?;
                self.backend.set_value(which, payload[1]);
                Response::ack()
            }
            GpioOperation::SetDebounce => {
                require_len(name, payload, 3)?;
                let which = selector(name, payload, GPIO_LINES)?;
                let usec = u16::from_le_bytes([payload[1], payload[2]]);
                self.backend.set_debounce(which, usec);
                Response::ack()
            }
            GpioOperation::IrqType => {
                require_len(name, payload, 2)?;
                let which = selector(name, payload, GPIO_LINES)?;
                self.backend.set_irq_type(which, payload[1]);
                Response::ack()
            }
            GpioOperation::IrqAck => {
                let which = selector(name, payload, GPIO_LINES)?;
                self.backend.ack_irq(which);
                Response::ack()
            }
            GpioOperation::IrqMask | GpioOperation::IrqUnmask => {
                let which = selector(name, payload, GPIO_LINES)?;
                self.backend.set_irq_masked(which, op == GpioOperation::IrqMask);
                Response::ack()
            }
        };

        debug!(
            module = ctx.module_id,
            cport = ctx.cport_id,
            which = payload.first().copied().unwrap_or_default(),
            operation = name,
            "gpio"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullBackend, SimulatedGpio, GPIO_DIRECTION_IN, GPIO_DIRECTION_OUT};
    use gbsim_frame::Status;

    const CTX: OperationContext = OperationContext {
        module_id: 2,
        cport_id: 3,
        host_cport_id: 7,
    };

    fn simulated() -> GpioHandler<SimulatedGpio> {
        GpioHandler::new(SimulatedGpio::new(GPIO_LINES))
    }

    #[test]
    fn line_count_reports_highest_index() {
        let mut gpio = GpioHandler::new(NullBackend);
        let rsp = gpio.handle(&CTX, 0x02, &[]).unwrap();
        assert_eq!(rsp.payload.as_ref(), &[5]);
    }

    #[test]
    fn direction_out_then_get_value() {
        let mut gpio = simulated();
        gpio.handle(&CTX, 0x07, &[4, 1]).unwrap();

        let dir = gpio.handle(&CTX, 0x05, &[4]).unwrap();
        assert_eq!(dir.payload.as_ref(), &[GPIO_DIRECTION_OUT]);
        let value = gpio.handle(&CTX, 0x08, &[4]).unwrap();
        assert_eq!(value.payload.as_ref(), &[1]);

        gpio.handle(&CTX, 0x06, &[4]).unwrap();
        let dir = gpio.handle(&CTX, 0x05, &[4]).unwrap();
        assert_eq!(dir.payload.as_ref(), &[GPIO_DIRECTION_IN]);
    }

    #[test]
    fn debounce_and_irq_settings_reach_backend() {
        let mut gpio = simulated();
        gpio.handle(&CTX, 0x0a, &[1, 0xe8, 0x03]).unwrap();
        gpio.handle(&CTX, 0x0b, &[1, 0x02]).unwrap();
        gpio.handle(&CTX, 0x0e, &[1]).unwrap();
        gpio.handle(&CTX, 0x0c, &[1]).unwrap();

        let line = gpio.backend().line(1).unwrap();
        assert_eq!(line.debounce_usec, 1000);
        assert_eq!(line.irq_type, 0x02);
        assert!(!line.irq_masked);
        assert_eq!(line.irq_acks, 1);
    }

    #[test]
    fn line_out_of_range_changes_nothing() {
        let mut gpio = simulated();
        let err = gpio.handle(&CTX, 0x07, &[6, 1]).unwrap_err();
        assert_eq!(err.status(), Status::Invalid);
        assert!((0..GPIO_LINES).all(|i| gpio.backend().line(i).unwrap().value == 0));
    }

    #[test]
    fn short_debounce_payload_is_invalid() {
        let mut gpio = simulated();
        let err = gpio.handle(&CTX, 0x0a, &[1, 0xe8]).unwrap_err();
        assert!(matches!(err, HandlerError::InvalidPayload { expected: 3, .. }));
        assert_eq!(gpio.backend().line(1).unwrap().debounce_usec, 0);
    }

    #[test]
    fn irq_event_is_not_a_request() {
        let mut gpio = GpioHandler::new(NullBackend);
        assert!(matches!(
            gpio.handle(&CTX, 0x0f, &[0]),
            Err(HandlerError::Unsupported(0x0f))
        ));
        assert!(matches!(
            gpio.handle(&CTX, 0x10, &[0]),
            Err(HandlerError::Unsupported(0x10))
        ));
    }
}

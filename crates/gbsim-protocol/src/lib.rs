//! Greybus protocol handlers for the simulator.
//!
//! Every CPort bound to a simulated module is served by an
//! [`OperationHandler`] implementing one device class. Handlers receive a
//! request type and payload and return a [`Response`] whose payload size is
//! fixed by the request type. The [`CPortTable`] maps AP-side CPort ids to
//! handler bindings and serializes operations per CPort.

pub mod backend;
pub mod error;
pub mod gpio;
pub mod handler;
pub mod i2s;
pub mod protocol;
pub mod pwm;
pub mod registry;

pub use backend::{
    BackendKind, GpioBackend, GpioLine, NullBackend, PwmBackend, PwmChannel, SimulatedGpio,
    SimulatedPwm,
};
pub use error::{HandlerError, Result};
pub use handler::{OperationContext, OperationHandler, Response, PROTOCOL_VERSION};
pub use protocol::{create_handler, ProtocolClass};
pub use registry::{BindingInfo, CPortAssignment, CPortBinding, CPortTable};

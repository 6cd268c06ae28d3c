//! SVC control plane, CPort router and simulator loop.
//!
//! [`Simulator`] owns the control endpoint and an [`SvcSession`]. The session
//! performs the version handshake with the AP, announces the configured
//! modules and starts one router worker per data endpoint pair. Workers
//! resolve inbound operations through the shared
//! [`CPortTable`](gbsim_protocol::CPortTable).

pub mod control;
pub mod error;
pub mod handshake;
pub mod module;
pub mod router;
pub mod session;
pub mod simulator;

pub use control::{ControlEvent, ControlReader, SetupRequest};
pub use error::{Result, SvcError};
pub use handshake::{ap_id_assignment, validate_ap_hello, AP_DEVICE_ID, AP_INTERFACE_ID};
pub use module::{load_modules, Module, ModuleConfig, ModulesConfig};
pub use router::{route_message, EndpointWorker, RouterConfig, WorkerExit};
pub use session::{SessionConfig, SvcSession, SvcState};
pub use simulator::{Simulator, SimulatorConfig, SimulatorEvent, SimulatorHandle};

//! Greybus simulator.
//!
//! gbsim stands in for the SVC and the modules of a Greybus device behind a
//! USB FunctionFS gadget, so an AP can be exercised without hardware.
//!
//! # Crate Structure
//!
//! - [`transport`]: endpoint byte channels (FunctionFS files, socket loopback)
//! - [`frame`]: operation and SVC message codec, frame reader and writer
//! - [`protocol`]: device-class handlers and the CPort binding table
//! - [`svc`]: SVC session, CPort router and the simulator loop

/// Re-export transport types.
pub mod transport {
    pub use gbsim_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use gbsim_frame::*;
}

/// Re-export protocol handler types.
pub mod protocol {
    pub use gbsim_protocol::*;
}

/// Re-export SVC and simulator types.
pub mod svc {
    pub use gbsim_svc::*;
}

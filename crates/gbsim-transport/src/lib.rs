//! Endpoint byte channels for the Greybus simulator.
//!
//! The simulator talks to the AP over a handful of physical USB endpoints:
//! - `ep0` carries FunctionFS control events and AP->SVC messages
//! - `ep1` carries SVC->AP events (handshake, hotplug, link management)
//! - `ep2`/`ep3` (and further pairs) carry CPort traffic to and from the AP
//!
//! This is the lowest layer of gbsim. Everything else reads and writes the
//! [`Endpoint`] type provided here.

pub mod endpoint;
pub mod error;
pub mod functionfs;
pub mod source;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use functionfs::FunctionFs;
pub use source::{DataEndpoints, EndpointSet, EndpointSource, LoopbackSource};

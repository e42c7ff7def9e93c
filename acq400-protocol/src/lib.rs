//! ACQ400 appliance protocol types, status grammar and knob framing.
//!
//! This crate is the I/O-free layer shared by the async client: service port
//! numbers, the transient status line format, capture state transitions,
//! site list parsing, calibration register parsing and the raw-sample shift
//! policy.

pub mod calibration;
pub mod command;
pub mod error;
pub mod ports;
pub mod response;
pub mod routing;
pub mod samples;
pub mod scale;
pub mod sitelist;
pub mod status;
pub mod stl;

pub use command::KnobCommand;
pub use error::{ProtocolError, Result};
pub use ports::{PortMap, Service};
pub use response::Reply;
pub use routing::{ClockSource, SyncRole, TriggerSource};
pub use samples::{SampleWidth, Samples};
pub use scale::ModuleFormat;
pub use status::{CaptureState, StatusTuple, Transition};

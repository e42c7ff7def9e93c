//! Async host client for ACQ400-family data acquisition appliances.
//!
//! Discover an appliance's module sites, read and write their knobs, follow
//! the capture state machine on the status feed, and upload post-shot
//! channel data.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> acq400_client::Result<()> {
//! use acq400_client::{DeviceConfig, DeviceProxy};
//!
//! let uut = DeviceProxy::open_with_config("acq2106_123", DeviceConfig::from_env()).await?;
//! uut.s0().set("SIG_SRC_TRG_0", "EXT").await?;
//!
//! uut.wait_armed().await?;
//! uut.wait_stopped().await?;
//!
//! for (ch, data) in uut.read_channels(&[]).await?.iter().enumerate() {
//!     println!("CH{:02} {} samples", ch + 1, data.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod channel;
pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod monitor;
pub mod process;
pub mod site;
pub mod variant;

#[cfg(test)]
pub(crate) mod mock;

pub use calibration::CalibrationTable;
pub use channel::ChannelClient;
pub use config::{DeviceConfig, FatalHook};
pub use connection::Connection;
pub use device::DeviceProxy;
pub use error::{ClientError, Result};
pub use monitor::{QuitReason, StatusMonitor};
pub use process::{LineSink, ProcessMonitor, process_lines, stdout_sink};
pub use site::SiteHandle;
pub use variant::Variant;

pub use acq400_protocol::{CaptureState, ClockSource, SampleWidth, Samples, Service, StatusTuple, SyncRole, TriggerSource};

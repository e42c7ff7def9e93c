//! Well-known TCP service ports exposed by an ACQ400 appliance.

use std::collections::HashMap;

use crate::error::{ProtocolError, Result};

/// Transient status feed.
pub const TSTAT: u16 = 2235;
/// Live streaming data.
pub const STREAM: u16 = 4210;
/// Site 0 (root) control service. Site `n` listens on `SITE0 + n`.
pub const SITE0: u16 = 4220;
/// Segment write service.
pub const SEGSW: u16 = 4250;
/// Segment read-back service.
pub const SEGSR: u16 = 4251;
/// Digital pulse generator STL load.
pub const DPGSTL: u16 = 4521;
/// Gated pulse generator STL load.
pub const GPGSTL: u16 = 4541;
/// Gated pulse generator table dump.
pub const GPGDUMP: u16 = 4543;
/// BOLO8 calibration service.
pub const BOLO8_CAL: u16 = 45072;
/// Channel 0 data service. Channel `n` listens on `DATA0 + n`.
pub const DATA0: u16 = 53000;
/// MGT-DRAM bulk transfer progress.
pub const MGTDRAM: u16 = 53990;
/// Live `top` output.
pub const LIVETOP: u16 = 53998;
/// One-shot run service.
pub const ONESHOT: u16 = 53999;
/// AWG load, play once.
pub const AWG_ONCE: u16 = 54201;
/// AWG load, auto-rearm.
pub const AWG_AUTOREARM: u16 = 54202;

/// A logical service on the appliance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Service {
    Status,
    Site(u8),
    SegmentWrite,
    SegmentRead,
    DpgStl,
    GpgStl,
    GpgDump,
    Channel(u32),
    MgtDram,
    LiveTop,
    OneShot,
    AwgOnce,
    AwgAutoRearm,
}

impl Service {
    /// Returns the appliance's default port for this service.
    ///
    /// Fails for a channel whose data port would fall outside the port range.
    pub fn default_port(self) -> Result<u16> {
        Ok(match self {
            Self::Status => TSTAT,
            Self::Site(n) => SITE0 + u16::from(n),
            Self::SegmentWrite => SEGSW,
            Self::SegmentRead => SEGSR,
            Self::DpgStl => DPGSTL,
            Self::GpgStl => GPGSTL,
            Self::GpgDump => GPGDUMP,
            Self::Channel(ch) => u16::try_from(ch)
                .ok()
                .and_then(|ch| DATA0.checked_add(ch))
                .ok_or(ProtocolError::InvalidChannel(ch))?,
            Self::MgtDram => MGTDRAM,
            Self::LiveTop => LIVETOP,
            Self::OneShot => ONESHOT,
            Self::AwgOnce => AWG_ONCE,
            Self::AwgAutoRearm => AWG_AUTOREARM,
        })
    }
}

/// Service → port resolution with optional per-service overrides.
///
/// Overrides cover port-forwarded appliances and loopback test fixtures.
#[derive(Clone, Debug, Default)]
pub struct PortMap {
    overrides: HashMap<Service, u16>,
}

impl PortMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `service` to `port` instead of its default.
    pub fn set_override(&mut self, service: Service, port: u16) {
        self.overrides.insert(service, port);
    }

    pub fn port(&self, service: Service) -> Result<u16> {
        match self.overrides.get(&service) {
            Some(&port) => Ok(port),
            None => service.default_port(),
        }
    }
}

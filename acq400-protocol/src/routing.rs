//! Clock, trigger and sync routing selections.

use std::str::FromStr;

use crate::error::ProtocolError;

/// Role of this appliance on the HDMI sync daisy chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncRole {
    Master,
    Slave,
}

impl FromStr for SyncRole {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" => Ok(Self::Master),
            "slave" => Ok(Self::Slave),
            other => Err(ProtocolError::UnknownRole(other.to_owned())),
        }
    }
}

/// Motherboard clock reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ClockSource {
    /// Internal 33.333 MHz reference via ZCLK.
    #[default]
    Zclk,
    /// 32.768 MHz crystal.
    Xclk,
    /// Front-panel clock input of frequency `fin` Hz.
    Fpclk { fin: u32 },
}

impl ClockSource {
    /// `(SYS_CLK_FPMUX, SIG_CLK_MB_FIN)` for this source.
    pub fn fpmux_and_fin(self) -> (&'static str, u32) {
        match self {
            Self::Zclk => ("ZCLK", 33_333_000),
            Self::Xclk => ("XCLK", 32_768_000),
            Self::Fpclk { fin } => ("FPCLK", fin),
        }
    }
}

/// Master trigger input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerSource {
    FrontPanel,
    Internal,
}

/// Signal lines used on the sync daisy chain.
pub mod dx {
    pub const EXT_TRG: &str = "d0";
    pub const MB_CLK: &str = "d1";
}

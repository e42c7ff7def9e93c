//! Calibration register parsing.

use crate::error::{ProtocolError, Result};

/// Knob holding per-channel slope (volts per code).
pub const SLOPE_REGISTER: &str = "AI_CAL_ESLO";
/// Knob holding per-channel offset (volts).
pub const OFFSET_REGISTER: &str = "AI_CAL_EOFF";

/// Number of header tokens preceding the coefficients in a register reply.
const HEADER_TOKENS: usize = 3;

/// Parse an `AI_CAL_ESLO` / `AI_CAL_EOFF` reply into per-channel coefficients.
///
/// Replies look like `"AI_CAL_ESLO 1 32 3.05e-04 3.05e-04 ..."`: three
/// header tokens followed by one value per channel of the module.
pub fn parse_register(register: &'static str, reply: &str) -> Result<Vec<f64>> {
    reply
        .split_whitespace()
        .skip(HEADER_TOKENS)
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| ProtocolError::InvalidCalibration {
                    register,
                    detail: format!("bad coefficient {token:?}"),
                })
        })
        .collect()
}

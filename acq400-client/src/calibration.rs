use crate::error::{ClientError, Result};

/// Per-channel slope/offset pairs, indexed by channel number from 1.
///
/// Index 0 holds a placeholder so channel numbers index directly.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationTable {
    slope: Vec<f64>,
    offset: Vec<f64>,
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self {
            slope: vec![0.0],
            offset: vec![0.0],
        }
    }
}

impl CalibrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once at least one module's coefficients have been added.
    pub fn is_fetched(&self) -> bool {
        self.slope.len() > 1
    }

    /// Number of calibrated channels.
    pub fn channels(&self) -> usize {
        self.slope.len().min(self.offset.len()) - 1
    }

    /// Append the coefficients of the next aggregated module.
    pub fn extend(&mut self, slope: Vec<f64>, offset: Vec<f64>) {
        self.slope.extend(slope);
        self.offset.extend(offset);
    }

    /// `(slope, offset)` of `channel`.
    pub fn coefficients(&self, channel: u32) -> Result<(f64, f64)> {
        let idx = usize::try_from(channel)
            .ok()
            .filter(|&i| i != 0 && i <= self.channels())
            .ok_or_else(|| {
                ClientError::InvalidArgument(format!(
                    "channel {channel} outside calibrated range 1..={}",
                    self.channels()
                ))
            })?;
        Ok((self.slope[idx], self.offset[idx]))
    }

    /// Convert raw codes of `channel` to volts: `raw * slope + offset`.
    pub fn apply(&self, channel: u32, raw: &[i32]) -> Result<Vec<f64>> {
        let (slope, offset) = self.coefficients(channel)?;
        Ok(raw.iter().map(|&r| f64::from(r) * slope + offset).collect())
    }
}

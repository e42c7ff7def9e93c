//! Transient status feed grammar and capture state transitions.
//!
//! Every line on the status service carries six integers:
//! `"<state> <pre> <post> <elapsed> <unused> <demux>"`.

use std::fmt;

use crate::error::{ProtocolError, Result};

/// Field positions within a status line.
pub mod field {
    pub const STATE: usize = 0;
    pub const PRE: usize = 1;
    pub const POST: usize = 2;
    pub const ELAPSED: usize = 3;
    pub const DEMUX: usize = 5;
    pub const COUNT: usize = 6;
}

/// Transient capture state reported by the appliance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum CaptureState {
    #[default]
    Idle = 0,
    Arm = 1,
    RunPre = 2,
    RunPost = 3,
    PostProcess = 4,
    Cleanup = 5,
}

impl CaptureState {
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Idle),
            1 => Ok(Self::Arm),
            2 => Ok(Self::RunPre),
            3 => Ok(Self::RunPost),
            4 => Ok(Self::PostProcess),
            5 => Ok(Self::Cleanup),
            other => Err(ProtocolError::UnknownState(other)),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Arm => "ARM",
            Self::RunPre => "RUNPRE",
            Self::RunPost => "RUNPOST",
            Self::PostProcess => "POPROCESS",
            Self::Cleanup => "CLEANUP",
        }
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed status line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct StatusTuple {
    pub state: CaptureState,
    pub pre: u64,
    pub post: u64,
    pub elapsed: u64,
    pub unused: u64,
    pub demux: u64,
}

impl StatusTuple {
    /// Parse a status line.
    ///
    /// The first run of six consecutive integer tokens that forms a valid
    /// tuple is used, so prefixes such as a hostname are tolerated. When no
    /// window is valid, the error of the first integer window is returned.
    pub fn parse(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < field::COUNT {
            return Err(ProtocolError::InvalidStatus(line.to_owned()));
        }

        let mut first_err = None;
        for window in tokens.windows(field::COUNT) {
            let Some(values) = parse_window(window) else {
                continue;
            };
            match Self::from_values(&values, line) {
                Ok(status) => return Ok(status),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }

        Err(first_err.unwrap_or_else(|| ProtocolError::InvalidStatus(line.to_owned())))
    }

    fn from_values(values: &[i64; field::COUNT], line: &str) -> Result<Self> {
        Ok(Self {
            state: CaptureState::from_code(values[field::STATE])?,
            pre: to_count(values[field::PRE], line)?,
            post: to_count(values[field::POST], line)?,
            elapsed: to_count(values[field::ELAPSED], line)?,
            unused: to_count(values[4], line)?,
            demux: to_count(values[field::DEMUX], line)?,
        })
    }

    /// Total samples of the last shot (`pre + post`).
    pub fn samples(&self) -> u64 {
        self.pre + self.post
    }
}

fn parse_window(window: &[&str]) -> Option<[i64; field::COUNT]> {
    let mut out = [0i64; field::COUNT];
    for (slot, token) in out.iter_mut().zip(window) {
        *slot = token.parse().ok()?;
    }
    Some(out)
}

fn to_count(value: i64, line: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| ProtocolError::InvalidStatus(line.to_owned()))
}

impl fmt::Display for StatusTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.state.code(),
            self.pre,
            self.post,
            self.elapsed,
            self.unused,
            self.demux
        )
    }
}

/// Outcome of comparing a new status against the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to signal.
    None,
    /// Entered ARM: set "armed", clear "stopped".
    Armed,
    /// Returned to IDLE from a running state: set "stopped", clear "armed".
    Stopped,
    /// Left IDLE without passing through ARM.
    Illegal {
        from: CaptureState,
        to: CaptureState,
    },
}

impl Transition {
    pub fn classify(prev: CaptureState, next: CaptureState) -> Self {
        use CaptureState::{Arm, Idle};

        if prev == Idle && next > Arm {
            Self::Illegal {
                from: prev,
                to: next,
            }
        } else if next == Arm {
            Self::Armed
        } else if prev != Idle && next == Idle {
            Self::Stopped
        } else {
            Self::None
        }
    }
}

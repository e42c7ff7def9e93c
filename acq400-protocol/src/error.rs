#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid status line: {0:?}")]
    InvalidStatus(String),

    #[error("unknown capture state: {0}")]
    UnknownState(i64),

    #[error("invalid site list: {0}")]
    InvalidSiteList(String),

    #[error("invalid calibration register {register}: {detail}")]
    InvalidCalibration {
        register: &'static str,
        detail: String,
    },

    #[error("invalid value for {knob}: {value:?}")]
    InvalidValue { knob: String, value: String },

    #[error("invalid knob command: {0}")]
    InvalidCommand(String),

    #[error("unknown sync role: {0:?}")]
    UnknownRole(String),

    #[error("channel {0} has no data port")]
    InvalidChannel(u32),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

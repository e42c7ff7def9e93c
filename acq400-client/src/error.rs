use std::time::Duration;

use acq400_protocol::CaptureState;

/// Errors that can occur during ACQ400 client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// TCP or socket I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol parsing error (bad status line, site list, calibration, etc.).
    #[error("protocol error: {0}")]
    Protocol(#[from] acq400_protocol::ProtocolError),

    /// Could not connect to a service, including a connect timeout.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// `host:port` that refused or failed.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// A read exceeded the configured timeout duration.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Peer closed the connection (read returned 0 bytes).
    #[error("disconnected")]
    Disconnected,

    /// Site service replied with `ERROR`.
    #[error("server error: {0}")]
    ServerError(String),

    /// No site or service of that name on this device.
    #[error("no site or service named {0:?}")]
    SiteNotFound(String),

    /// Knob is not in the site's knob list.
    #[error("site {site} has no knob {knob:?}")]
    KnobNotFound {
        /// Site name, e.g. `"s1"`.
        site: String,
        /// Requested knob.
        knob: String,
    },

    /// AWG upload attempted while the generator is playing.
    #[error("awg busy on site {0}")]
    AwgBusy(u8),

    /// Status feed skipped a capture state.
    #[error("illegal state transition {from} -> {to}")]
    IllegalStateTransition {
        /// State before the transition.
        from: CaptureState,
        /// State observed after it.
        to: CaptureState,
    },

    /// Status monitor was stopped or lost its connection.
    #[error("status monitor stopped")]
    MonitorStopped,

    /// Channel data service closed before the requested bytes arrived.
    #[error("short stream: expected {expected} bytes, received {received}")]
    ShortStream {
        /// Bytes required for the requested sample count.
        expected: usize,
        /// Bytes received before EOF.
        received: usize,
    },

    /// Caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use acq400_protocol::{CaptureState, PortMap};

use crate::variant::Variant;

/// Called when the status feed shows a skipped state, with `(from, to)`.
///
/// When unset the process exits with status 1.
pub type FatalHook = Arc<dyn Fn(CaptureState, CaptureState) + Send + Sync>;

/// Environment variable holding the status trace level.
pub const TRACE_ENV: &str = "STATUSMONITOR_TRACE";

/// Default upper bound on one channel data read.
pub const DEFAULT_MAX_CHUNK: usize = 0x40_0000;

/// Configuration for [`DeviceProxy`](crate::DeviceProxy) connections.
#[derive(Clone)]
pub struct DeviceConfig {
    /// Timeout for each TCP connect. Default: 10 seconds.
    pub connect_timeout: Duration,
    /// Timeout for request/response reads on site services. Default: 30 seconds.
    pub read_timeout: Option<Duration>,
    /// Join timeout for each site discovery task. Default: 10 seconds.
    pub discovery_timeout: Duration,
    /// Run a status monitor on the status feed. Default: `true`.
    pub monitor: bool,
    /// Status trace level: 1 logs parsed tuples, 2 also unparsed lines.
    pub trace: u8,
    /// Directory for raw channel dumps. Default: none.
    pub save_dir: Option<PathBuf>,
    /// Upper bound on one channel data read, in bytes.
    pub max_chunk: usize,
    /// Appliance family. Default: [`Variant::ACQ400`].
    pub variant: Variant,
    /// Connect the MGT-DRAM site on chassis that have one. Default: `false`.
    pub has_mgtdram: bool,
    /// Service port overrides.
    pub ports: PortMap,
    /// Escalation for an illegal state transition.
    pub fatal_hook: Option<FatalHook>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Some(Duration::from_secs(30)),
            discovery_timeout: Duration::from_secs(10),
            monitor: true,
            trace: 0,
            save_dir: None,
            max_chunk: DEFAULT_MAX_CHUNK,
            variant: Variant::ACQ400,
            has_mgtdram: false,
            ports: PortMap::default(),
            fatal_hook: None,
        }
    }
}

impl DeviceConfig {
    /// Defaults with the trace level taken from `STATUSMONITOR_TRACE`.
    pub fn from_env() -> Self {
        Self {
            trace: trace_level(std::env::var(TRACE_ENV).ok().as_deref()),
            ..Self::default()
        }
    }
}

fn trace_level(value: Option<&str>) -> u8 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("discovery_timeout", &self.discovery_timeout)
            .field("monitor", &self.monitor)
            .field("trace", &self.trace)
            .field("save_dir", &self.save_dir)
            .field("max_chunk", &self.max_chunk)
            .field("variant", &self.variant.name)
            .field("has_mgtdram", &self.has_mgtdram)
            .field("fatal_hook", &self.fatal_hook.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = DeviceConfig::default();
        assert!(c.monitor);
        assert_eq!(c.discovery_timeout, Duration::from_secs(10));
        assert_eq!(c.max_chunk, 0x400000);
        assert!(c.save_dir.is_none());
        assert_eq!(c.variant, Variant::ACQ400);
    }

    #[test]
    fn trace_level_parsing() {
        assert_eq!(trace_level(None), 0);
        assert_eq!(trace_level(Some("2")), 2);
        assert_eq!(trace_level(Some(" 1 ")), 1);
        assert_eq!(trace_level(Some("loud")), 0);
    }

    #[test]
    fn debug_hides_hook() {
        let c = DeviceConfig {
            fatal_hook: Some(Arc::new(|_: CaptureState, _: CaptureState| {})),
            ..DeviceConfig::default()
        };
        let s = format!("{c:?}");
        assert!(s.contains("fatal_hook: true"));
    }
}

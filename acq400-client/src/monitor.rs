//! Transient status monitor.
//!
//! One background task per monitor consumes the status feed, keeps the
//! latest [`StatusTuple`] in a single-slot watch channel, and raises the
//! "armed" / "stopped" latches on capture state transitions.

use std::sync::Arc;

use acq400_protocol::{CaptureState, Service, StatusTuple, Transition};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{DeviceConfig, FatalHook};
use crate::connection::Connection;
use crate::error::{ClientError, Result};

/// Why a monitor is no longer running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuitReason {
    Running,
    /// [`StatusMonitor::stop`] was called.
    Requested,
    /// The status connection closed or failed.
    Disconnected,
    /// The feed skipped ARM.
    IllegalTransition {
        from: CaptureState,
        to: CaptureState,
    },
}

impl QuitReason {
    fn into_error(self) -> ClientError {
        match self {
            Self::IllegalTransition { from, to } => ClientError::IllegalStateTransition { from, to },
            _ => ClientError::MonitorStopped,
        }
    }
}

/// Binary latch: set and clear overwrite, a wait consumes the set state.
struct Latch {
    tx: watch::Sender<bool>,
}

impl Latch {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    fn set(&self) {
        self.tx.send_replace(true);
    }

    fn clear(&self) {
        self.tx.send_replace(false);
    }

    fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|set| *set).await;
    }
}

struct Shared {
    peer: String,
    trace: u8,
    status: watch::Sender<StatusTuple>,
    armed: Latch,
    stopped: Latch,
    quit: watch::Sender<QuitReason>,
}

impl Shared {
    fn new(peer: &str, initial: StatusTuple, trace: u8) -> Self {
        let (status, _) = watch::channel(initial);
        let (quit, _) = watch::channel(QuitReason::Running);
        Self {
            peer: peer.to_owned(),
            trace,
            status,
            armed: Latch::new(),
            stopped: Latch::new(),
            quit,
        }
    }

    /// Apply one status line: update latches, publish the tuple.
    fn apply(&self, line: &str) -> Transition {
        let st = match StatusTuple::parse(line) {
            Ok(st) => st,
            Err(e) => {
                if self.trace > 1 {
                    debug!(peer = %self.peer, line, error = %e, "unparsed status line");
                }
                return Transition::None;
            }
        };
        if self.trace > 0 {
            debug!(peer = %self.peer, status = %st, "status");
        }

        let prev = self.status.borrow().state;
        let transition = Transition::classify(prev, st.state);
        match transition {
            Transition::Stopped => {
                info!(peer = %self.peer, "STOPPED");
                self.stopped.set();
                self.armed.clear();
            }
            Transition::Armed => {
                info!(peer = %self.peer, "ARMED");
                self.armed.set();
                self.stopped.clear();
            }
            Transition::Illegal { from, to } => {
                error!(peer = %self.peer, %from, %to, "skipped ARM");
                self.quit
                    .send_replace(QuitReason::IllegalTransition { from, to });
            }
            Transition::None => {}
        }

        self.status.send_replace(st);
        transition
    }

    fn quit_reason(&self) -> QuitReason {
        *self.quit.borrow()
    }

    fn request_quit(&self, reason: QuitReason) {
        self.quit.send_if_modified(|current| {
            if *current == QuitReason::Running {
                *current = reason;
                true
            } else {
                false
            }
        });
    }
}

/// Monitor of the appliance's transient status feed.
///
/// The task stops on [`stop`](Self::stop), on connection loss, or on an
/// illegal transition; dropping the monitor aborts it.
pub struct StatusMonitor {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl StatusMonitor {
    /// Connect to the status service of `host` and start monitoring.
    ///
    /// `initial` seeds the previous state so the first line is classified
    /// against what the root service last reported.
    pub async fn connect(host: &str, initial: StatusTuple, config: &DeviceConfig) -> Result<Self> {
        let addr = format!("{host}:{}", config.ports.port(Service::Status)?);
        let conn = Connection::connect(&addr, config.connect_timeout, None).await?;
        Ok(Self::spawn(conn, initial, config.trace, config.fatal_hook.clone()))
    }

    /// Start monitoring an established status connection.
    pub fn spawn(
        conn: Connection,
        initial: StatusTuple,
        trace: u8,
        fatal_hook: Option<FatalHook>,
    ) -> Self {
        let shared = Arc::new(Shared::new(conn.peer(), initial, trace));
        let task = tokio::spawn(run(conn, shared.clone(), fatal_hook));
        Self { shared, task }
    }

    /// Latest status tuple. Never blocks.
    pub fn status(&self) -> StatusTuple {
        *self.shared.status.borrow()
    }

    /// Latest capture state. Never blocks.
    pub fn state(&self) -> CaptureState {
        self.status().state
    }

    /// Receiver that observes every published status, last write wins.
    pub fn subscribe(&self) -> watch::Receiver<StatusTuple> {
        self.shared.status.subscribe()
    }

    pub fn is_armed(&self) -> bool {
        self.shared.armed.is_set()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.is_set()
    }

    pub fn quit_reason(&self) -> QuitReason {
        self.shared.quit_reason()
    }

    /// Wait until the appliance reports ARM, then consume the signal.
    pub async fn wait_armed(&self) -> Result<()> {
        self.wait_event(&self.shared.armed, "armed").await
    }

    /// Wait until the appliance returns to IDLE, then consume the signal.
    pub async fn wait_stopped(&self) -> Result<()> {
        self.wait_event(&self.shared.stopped, "stopped").await
    }

    async fn wait_event(&self, latch: &Latch, descr: &'static str) -> Result<()> {
        let mut quit = self.shared.quit.subscribe();
        let quit_requested = async {
            match quit.wait_for(|r| *r != QuitReason::Running).await {
                Ok(reason) => *reason,
                Err(_) => QuitReason::Requested,
            }
        };
        tokio::select! {
            biased;
            () = latch.wait() => {
                latch.clear();
                Ok(())
            }
            reason = quit_requested => {
                warn!(peer = %self.shared.peer, descr, ?reason, "wait abandoned");
                Err(reason.into_error())
            }
        }
    }

    /// Request the task to stop; pending waits fail with
    /// [`ClientError::MonitorStopped`].
    pub fn stop(&self) {
        self.shared.request_quit(QuitReason::Requested);
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for StatusMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusMonitor")
            .field("peer", &self.shared.peer)
            .field("status", &self.status())
            .field("quit", &self.quit_reason())
            .finish()
    }
}

async fn run(mut conn: Connection, shared: Arc<Shared>, fatal_hook: Option<FatalHook>) {
    let mut quit = shared.quit.subscribe();
    loop {
        let line = tokio::select! {
            line = conn.read_line() => line,
            _ = quit.wait_for(|r| *r != QuitReason::Running) => {
                debug!(peer = %shared.peer, "status monitor quit");
                return;
            }
        };

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(peer = %shared.peer, error = %e, "status feed lost");
                shared.request_quit(QuitReason::Disconnected);
                return;
            }
        };

        if let Transition::Illegal { from, to } = shared.apply(&line) {
            match &fatal_hook {
                Some(hook) => hook(from, to),
                None => {
                    error!(peer = %shared.peer, "terminating process");
                    std::process::exit(1);
                }
            }
            return;
        }
    }
}

//! Watchers for line-oriented process services (MGT-DRAM, one-shot, ...).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use acq400_protocol::Service;
use futures_core::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::DeviceConfig;
use crate::connection::Connection;
use crate::error::{ClientError, Result};

/// Default end-of-process marker.
pub const DEFAULT_TERMINATOR: &str = "END";

/// Receives every line a process service emits.
pub type LineSink = Box<dyn FnMut(&str) + Send>;

/// Sink that prints each line to stdout.
pub fn stdout_sink() -> LineSink {
    Box::new(|line: &str| println!("{line}"))
}

/// Background watcher of a process service.
///
/// Every received line goes to the sink; the task ends after a line starting
/// with the terminator, on EOF, on a read error, or on [`stop`](Self::stop).
pub struct ProcessMonitor {
    finished: Arc<AtomicBool>,
    quit: watch::Sender<bool>,
    task: Option<JoinHandle<Result<()>>>,
}

impl ProcessMonitor {
    /// Watch the MGT-DRAM service of `host`.
    pub async fn connect(
        host: &str,
        terminator: &str,
        sink: LineSink,
        config: &DeviceConfig,
    ) -> Result<Self> {
        let addr = format!("{host}:{}", config.ports.port(Service::MgtDram)?);
        let conn = Connection::connect(&addr, config.connect_timeout, None).await?;
        Ok(Self::spawn(conn, terminator, sink))
    }

    pub fn spawn(mut conn: Connection, terminator: &str, mut sink: LineSink) -> Self {
        let finished = Arc::new(AtomicBool::new(false));
        let (quit, mut quit_rx) = watch::channel(false);
        let terminator = terminator.to_owned();

        let done = finished.clone();
        let task = tokio::spawn(async move {
            let result = loop {
                let line = tokio::select! {
                    line = conn.read_line() => line,
                    _ = quit_rx.wait_for(|q| *q) => break Ok(()),
                };
                match line {
                    Ok(line) => {
                        sink(&line);
                        if line.starts_with(&terminator) {
                            debug!(peer = conn.peer(), "process complete");
                            break Ok(());
                        }
                    }
                    Err(ClientError::Disconnected) => break Ok(()),
                    Err(e) => {
                        warn!(peer = conn.peer(), error = %e, "process feed failed");
                        break Err(e);
                    }
                }
            };
            done.store(true, Ordering::Release);
            result
        });

        Self {
            finished,
            quit,
            task: Some(task),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Wait for the task to end and return its outcome.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ClientError::MonitorStopped),
            Err(e) => Err(ClientError::Io(std::io::Error::other(e))),
        }
    }

    /// Request the task to stop after the line in flight.
    pub fn stop(&self) {
        self.quit.send_replace(true);
    }
}

impl Drop for ProcessMonitor {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Lines of a process service as a [`Stream`].
///
/// The line starting with `terminator` is yielded, then the stream ends; EOF
/// also ends it.
pub fn process_lines(
    mut conn: Connection,
    terminator: &str,
) -> impl Stream<Item = Result<String>> {
    let terminator = terminator.to_owned();
    async_stream::try_stream! {
        loop {
            let line = match conn.read_line().await {
                Ok(line) => line,
                Err(ClientError::Disconnected) => break,
                Err(e) => Err(e)?,
            };
            let last = line.starts_with(&terminator);
            yield line;
            if last {
                break;
            }
        }
    }
}

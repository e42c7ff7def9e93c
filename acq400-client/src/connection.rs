use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, trace, warn};

use crate::error::{ClientError, Result};

/// One line-oriented TCP connection to an appliance service.
///
/// The socket is closed when the connection is dropped.
pub struct Connection {
    peer: String,
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    read_timeout: Option<Duration>,
}

impl Connection {
    /// Connect to `addr` (`host:port`).
    ///
    /// `read_timeout` of `None` lets reads block indefinitely, as needed for
    /// long-lived feeds such as the status service. A refused or timed-out
    /// connect is [`ClientError::Connect`]; a timeout carries
    /// [`std::io::ErrorKind::TimedOut`].
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        read_timeout: Option<Duration>,
    ) -> Result<Self> {
        debug!(addr, "TCP connecting");
        let stream = bounded_connect(addr, connect_timeout, TcpStream::connect(addr)).await?;

        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            peer: addr.to_owned(),
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            read_timeout,
        })
    }

    /// `host:port` this connection was opened to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send one line; a trailing newline is appended when missing.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        trace!(peer = %self.peer, line = line.trim_end(), "sending");
        if line.ends_with('\n') {
            self.send_raw(line.as_bytes()).await
        } else {
            self.writer.write_all(line.as_bytes()).await?;
            self.send_raw(b"\n").await
        }
    }

    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data).await.map_err(ClientError::Io)?;
        self.writer.flush().await.map_err(ClientError::Io)?;
        Ok(())
    }

    /// Read one line without its `\n` / `\r\n` terminator.
    ///
    /// A final unterminated line before EOF is returned as-is; EOF with
    /// nothing buffered is [`ClientError::Disconnected`].
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = with_timeout(self.read_timeout, self.reader.read_line(&mut line)).await?;
        if n == 0 {
            return Err(ClientError::Disconnected);
        }
        let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');
        Ok(trimmed.to_owned())
    }

    /// Read until `terminator` and return the text preceding it.
    pub async fn receive_message(&mut self, terminator: &str) -> Result<String> {
        let term = terminator.as_bytes();
        let Some(&delim) = term.last() else {
            return Err(ClientError::InvalidArgument("empty terminator".into()));
        };

        let mut buf = Vec::new();
        loop {
            let n = with_timeout(self.read_timeout, self.reader.read_until(delim, &mut buf)).await?;
            if n == 0 {
                return Err(ClientError::Disconnected);
            }
            if buf.ends_with(term) {
                buf.truncate(buf.len() - term.len());
                return Ok(String::from_utf8_lossy(&buf).into_owned());
            }
        }
    }

    /// Read whatever is available into `buf`; `Ok(0)` means the peer closed.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        with_timeout(self.read_timeout, self.reader.read(buf)).await
    }

    /// Read one chunk of at most `max` bytes; empty on EOF.
    pub async fn read_chunk(&mut self, max: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max];
        let n = self.read_some(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Close the write half so the peer sees EOF; reads remain possible.
    pub async fn shutdown_write(&mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(ClientError::Io)?;
        Ok(())
    }
}

async fn bounded_connect(
    addr: &str,
    limit: Duration,
    fut: impl Future<Output = std::io::Result<TcpStream>>,
) -> Result<TcpStream> {
    let result = match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("connect timed out after {limit:?}"),
        )),
    };
    result.map_err(|source| ClientError::Connect {
        addr: addr.to_owned(),
        source,
    })
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = std::io::Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| {
                warn!(timeout = ?limit, "read timeout");
                ClientError::Timeout(limit)
            })?
            .map_err(ClientError::Io),
        None => fut.await.map_err(ClientError::Io),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn setup_pair(
        read_timeout: Option<Duration>,
    ) -> (Connection, OwnedWriteHalf, OwnedReadHalf) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (client_stream, server_accept) =
            tokio::join!(async { TcpStream::connect(addr).await.unwrap() }, async {
                listener.accept().await.unwrap()
            });

        let (server_read, server_write) = server_accept.0.into_split();
        let (client_read, client_write) = client_stream.into_split();

        let conn = Connection {
            peer: addr.to_string(),
            reader: BufReader::new(client_read),
            writer: BufWriter::new(client_write),
            read_timeout,
        };

        (conn, server_write, server_read)
    }

    #[tokio::test]
    async fn send_and_read_line() {
        let (mut conn, mut server_write, _server_read) =
            setup_pair(Some(Duration::from_secs(5))).await;

        server_write.write_all(b"ACQ2106\r\n").await.unwrap();
        server_write.flush().await.unwrap();

        let line = conn.read_line().await.unwrap();
        assert_eq!(line, "ACQ2106");
    }

    #[tokio::test]
    async fn send_line_appends_newline() {
        let (mut conn, _server_write, mut server_read) = setup_pair(None).await;

        conn.send_line("NCHAN").await.unwrap();
        conn.send_line("CLKDIV=2\n").await.unwrap();

        let mut buf = vec![0u8; 64];
        let mut got = Vec::new();
        while got.len() < 15 {
            let n = server_read.read(&mut buf).await.unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, b"NCHAN\nCLKDIV=2\n");
    }

    #[tokio::test]
    async fn receive_message_multibyte_terminator() {
        let (mut conn, mut server_write, _server_read) = setup_pair(None).await;

        server_write.write_all(b"a>b\n>rest").await.unwrap();
        server_write.flush().await.unwrap();

        let msg = conn.receive_message("\n>").await.unwrap();
        assert_eq!(msg, "a>b");
    }

    #[tokio::test]
    async fn read_line_disconnected() {
        let (mut conn, server_write, server_read) = setup_pair(None).await;
        drop(server_write);
        drop(server_read);

        let result = conn.read_line().await;
        assert!(matches!(result, Err(ClientError::Disconnected)));
    }

    #[tokio::test]
    async fn read_timeout_triggers() {
        let (mut conn, _server_write, _server_read) =
            setup_pair(Some(Duration::from_millis(50))).await;

        let result = conn.read_line().await;
        assert!(matches!(result, Err(ClientError::Timeout(_))));
    }

    #[tokio::test]
    async fn connect_refused_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = Connection::connect(&addr, Duration::from_secs(1), None).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_is_connect_error() {
        let never = std::future::pending::<std::io::Result<TcpStream>>();
        let err = bounded_connect("10.0.0.1:4220", Duration::from_secs(5), never)
            .await
            .unwrap_err();
        match err {
            ClientError::Connect { addr, source } => {
                assert_eq!(addr, "10.0.0.1:4220");
                assert_eq!(source.kind(), std::io::ErrorKind::TimedOut);
            }
            other => panic!("expected Connect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_chunk_then_eof() {
        let (mut conn, mut server_write, _server_read) = setup_pair(None).await;

        server_write.write_all(b"DONE").await.unwrap();
        server_write.shutdown().await.unwrap();

        let mut got = Vec::new();
        loop {
            let chunk = conn.read_chunk(2).await.unwrap();
            if chunk.is_empty() {
                break;
            }
            assert!(chunk.len() <= 2);
            got.extend(chunk);
        }
        assert_eq!(got, b"DONE");
    }

    #[tokio::test]
    async fn shutdown_write_signals_eof_to_peer() {
        let (mut conn, _server_write, mut server_read) = setup_pair(None).await;

        conn.send_raw(b"wave").await.unwrap();
        conn.shutdown_write().await.unwrap();

        let mut got = Vec::new();
        server_read.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"wave");
    }
}

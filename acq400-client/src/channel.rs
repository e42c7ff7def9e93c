use acq400_protocol::{SampleWidth, Samples, Service};
use tracing::{debug, warn};

use crate::config::DeviceConfig;
use crate::connection::Connection;
use crate::error::{ClientError, Result};

/// Post-shot data connection for one channel.
///
/// Each channel has its own data service on `DATA0 + channel`; the appliance
/// streams the captured samples and closes the connection.
pub struct ChannelClient {
    channel: u32,
    conn: Connection,
}

impl ChannelClient {
    /// Connect to the data service of channel `channel` (1..N) on `host`.
    pub async fn connect(host: &str, channel: u32, config: &DeviceConfig) -> Result<Self> {
        if channel == 0 {
            return Err(ClientError::InvalidArgument(
                "channels are numbered from 1".into(),
            ));
        }
        let addr = format!("{host}:{}", config.ports.port(Service::Channel(channel))?);
        let conn = Connection::connect(&addr, config.connect_timeout, config.read_timeout).await?;
        Ok(Self { channel, conn })
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Read `count` samples of `width`, each socket read bounded by `max_chunk`.
    ///
    /// `count == 0` reads until the appliance closes the stream and decodes
    /// every whole sample. Otherwise exactly `count` samples are returned;
    /// EOF before `count * width` bytes is [`ClientError::ShortStream`].
    pub async fn read(&mut self, count: usize, width: SampleWidth, max_chunk: usize) -> Result<Samples> {
        if max_chunk == 0 {
            return Err(ClientError::InvalidArgument("max_chunk must be > 0".into()));
        }

        let target = count.checked_mul(width.bytes()).ok_or_else(|| {
            ClientError::InvalidArgument(format!("sample count {count} overflows"))
        })?;

        // `count` may come from the status feed; the buffer grows with the data.
        let mut buf = Vec::with_capacity(if count == 0 { max_chunk } else { target.min(max_chunk) });
        let mut chunk = vec![0u8; max_chunk];

        loop {
            if count > 0 && buf.len() >= target {
                break;
            }
            let n = self.conn.read_some(&mut chunk).await?;
            if n == 0 {
                if count == 0 {
                    break;
                }
                return Err(ClientError::ShortStream {
                    expected: target,
                    received: buf.len(),
                });
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        if count == 0 {
            let tail = buf.len() % width.bytes();
            if tail != 0 {
                warn!(channel = self.channel, tail, "dropping partial trailing sample");
            }
            debug!(channel = self.channel, bytes = buf.len(), "read to EOF");
            Ok(Samples::decode(&buf, width, None))
        } else {
            debug!(channel = self.channel, bytes = buf.len(), count, "read");
            Ok(Samples::decode(&buf, width, Some(count)))
        }
    }
}

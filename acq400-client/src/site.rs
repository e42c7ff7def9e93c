use std::collections::BTreeSet;
use std::str::FromStr;

use acq400_protocol::{KnobCommand, ProtocolError, Reply, Service};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::config::DeviceConfig;
use crate::connection::Connection;
use crate::error::{ClientError, Result};

/// Control connection to one site (module slot) of an appliance.
///
/// Exchanges are serialised on an internal lock, so a handle can be shared
/// between tasks behind an `Arc`.
pub struct SiteHandle {
    name: String,
    site: u8,
    model: String,
    knobs: BTreeSet<String>,
    conn: Mutex<Connection>,
}

impl SiteHandle {
    /// Connect to site `site` of `host` and read its knob list and model.
    pub async fn connect(host: &str, name: &str, site: u8, config: &DeviceConfig) -> Result<Self> {
        let addr = format!("{host}:{}", config.ports.port(Service::Site(site))?);
        let conn = Connection::connect(&addr, config.connect_timeout, config.read_timeout).await?;
        Self::from_connection(conn, name, site).await
    }

    pub(crate) async fn from_connection(conn: Connection, name: &str, site: u8) -> Result<Self> {
        let mut handle = Self {
            name: name.to_owned(),
            site,
            model: String::new(),
            knobs: BTreeSet::new(),
            conn: Mutex::new(conn),
        };

        match handle.sr("help").await {
            Ok(list) => {
                handle.knobs = list.split_whitespace().map(str::to_owned).collect();
            }
            Err(ClientError::ServerError(e)) => {
                debug!(site = name, error = %e, "no knob list");
            }
            Err(e) => return Err(e),
        }
        handle.model = handle.sr("MODEL").await?;

        debug!(site = name, model = %handle.model, knobs = handle.knobs.len(), "site connected");
        Ok(handle)
    }

    /// Dispatch name, e.g. `"s1"` or `"cA"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn site(&self) -> u8 {
        self.site
    }

    /// Module identity from the `MODEL` knob.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Knobs advertised by `help`; empty when the site gave no list.
    pub fn knobs(&self) -> impl Iterator<Item = &str> {
        self.knobs.iter().map(String::as_str)
    }

    pub fn has_knob(&self, knob: &str) -> bool {
        self.knobs.is_empty() || self.knobs.contains(knob)
    }

    /// Send one raw line and return the reply line.
    ///
    /// An `ERROR` reply is returned as [`ClientError::ServerError`].
    pub async fn sr(&self, line: &str) -> Result<String> {
        let mut conn = self.conn.lock().await;
        conn.send_line(line).await?;
        let reply = conn.read_line().await?;
        trace!(site = %self.name, request = line, reply = %reply, "sr");
        Reply::parse_line(&reply)
            .into_result()
            .map_err(ClientError::ServerError)
    }

    /// Read a knob value.
    pub async fn get(&self, knob: &str) -> Result<String> {
        let cmd = KnobCommand::query(knob)?;
        self.require_knob(knob)?;
        self.sr(cmd.to_line().trim_end()).await
    }

    /// Read and parse a knob value.
    pub async fn get_parsed<T: FromStr>(&self, knob: &str) -> Result<T> {
        let value = self.get(knob).await?;
        value.trim().parse().map_err(|_| {
            ClientError::Protocol(ProtocolError::InvalidValue {
                knob: knob.to_owned(),
                value,
            })
        })
    }

    /// Write a knob value.
    pub async fn set(&self, knob: &str, value: impl ToString) -> Result<()> {
        let cmd = KnobCommand::set(knob, value)?;
        self.require_knob(knob)?;
        debug!(site = %self.name, line = cmd.to_line().trim_end(), "set");
        self.sr(cmd.to_line().trim_end()).await?;
        Ok(())
    }

    fn require_knob(&self, knob: &str) -> Result<()> {
        if self.has_knob(knob) {
            Ok(())
        } else {
            Err(ClientError::KnobNotFound {
                site: self.name.clone(),
                knob: knob.to_owned(),
            })
        }
    }
}

impl std::fmt::Debug for SiteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteHandle")
            .field("name", &self.name)
            .field("site", &self.site)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

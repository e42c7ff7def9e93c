//! Parsing of the root service's site enumeration knobs.

use crate::error::{ProtocolError, Result};

/// Parse the `SITELIST` knob into site numbers.
///
/// The reply is a comma-separated list whose first field is a count,
/// followed by `site=detail` entries, e.g. `"3,1=32,2=32,4=32"`.
pub fn parse_site_list(reply: &str) -> Result<Vec<u8>> {
    let reply = reply.trim();
    let mut fields = reply.split(',');
    if fields.next().is_none_or(str::is_empty) {
        return Err(ProtocolError::InvalidSiteList(reply.to_owned()));
    }

    fields
        .filter(|f| !f.trim().is_empty())
        .map(|entry| {
            let site = entry.split('=').next().unwrap_or("").trim();
            site.parse::<u8>()
                .map_err(|_| ProtocolError::InvalidSiteList(format!("bad entry {entry:?}")))
        })
        .collect()
}

/// Parse the `aggregator` knob into the aggregated site numbers.
///
/// The reply carries a `sites=1,2,...` token among other fields,
/// e.g. `"reg=0x00000006 sites=1,2 on"`.
pub fn parse_aggregator_sites(reply: &str) -> Result<Vec<u8>> {
    let token = reply
        .split_whitespace()
        .find_map(|t| t.strip_prefix("sites="))
        .ok_or_else(|| ProtocolError::InvalidSiteList(reply.trim().to_owned()))?;

    if token.is_empty() || token == "none" {
        return Ok(Vec::new());
    }

    token
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<u8>()
                .map_err(|_| ProtocolError::InvalidSiteList(format!("bad aggregator site {s:?}")))
        })
        .collect()
}

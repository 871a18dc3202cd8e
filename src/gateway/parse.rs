//! Parsers for the gateway's line-oriented command responses.
//!
//! The admin interface has no formal schema: responses are either
//! colon-delimited `key: value` blocks (status, stats) or whitespace-column
//! listings with `#` marking header/comment lines. Every parser here is
//! pure (text in, typed records out) and drops lines it cannot match —
//! partial or garbled output degrades the result, it never fails the parse.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::trace;

use crate::registry::ConnectorStatus;

/// A value from a stats block, coerced int-first like the gateway emits them
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl StatValue {
    fn coerce(raw: &str) -> Self {
        if let Ok(n) = raw.parse::<i64>() {
            StatValue::Int(n)
        } else if let Ok(f) = raw.parse::<f64>() {
            StatValue::Float(f)
        } else {
            StatValue::Text(raw.to_string())
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StatValue::Int(n) => Some(*n),
            _ => None,
        }
    }
}

/// Parsed `stats --all` output
pub type GatewayStats = BTreeMap<String, StatValue>;

/// One row of the connector listing (`smppccm -l`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorListing {
    pub cid: String,
    /// Gateway-reported status; unknown strings map to `Error`
    pub status: ConnectorStatus,
    /// Raw SMPP session state column (e.g. `BOUND_TRX`)
    pub session_state: String,
    pub host: String,
    pub port: u16,
}

/// Key-value block for one connector (`smppccm -s <cid>`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectorStatusBlock {
    pub cid: String,
    pub fields: BTreeMap<String, String>,
}

impl ConnectorStatusBlock {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// One row of the gateway route listing (`mtrouter -l`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteListing {
    pub order: i32,
    pub route_type: String,
    pub connector_id: String,
    pub rate: f64,
    pub filters: Vec<String>,
}

/// Parse a colon-delimited stats block.
pub fn parse_stats(response: &str) -> GatewayStats {
    let mut stats = GatewayStats::new();

    for line in response.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || key.starts_with('#') {
            continue;
        }
        stats.insert(key.to_string(), StatValue::coerce(value.trim()));
    }

    stats
}

/// Parse the whitespace-column connector listing.
///
/// Expected columns: `cid status session_state host:port ...`. Lines that
/// do not fit are dropped.
pub fn parse_connector_list(response: &str) -> Vec<ConnectorListing> {
    let mut listings = Vec::new();

    for line in response.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut columns = line.split_whitespace();
        let (Some(cid), Some(status_raw), Some(session_state)) =
            (columns.next(), columns.next(), columns.next())
        else {
            trace!(line, "dropping unparseable connector line");
            continue;
        };

        // The prompt echo and free-text notices land here too; require the
        // status column to look like a status word.
        let Some(status) = parse_status_lenient(status_raw) else {
            trace!(line, "dropping connector line with unknown status column");
            continue;
        };

        let (host, port) = match columns.next() {
            Some(host_port) => match host_port.split_once(':') {
                Some((h, p)) => (h.to_string(), p.parse::<u16>().unwrap_or(0)),
                None => (host_port.to_string(), 0),
            },
            None => (String::from("unknown"), 0),
        };

        listings.push(ConnectorListing {
            cid: cid.to_string(),
            status,
            session_state: session_state.to_string(),
            host,
            port,
        });
    }

    listings
}

/// Map a status column to the closed status set.
///
/// Known observed statuses parse exactly; anything else that still looks
/// like a status word (all-alphabetic) maps to `Error`, mirroring the
/// gateway's habit of inventing new failure strings.
fn parse_status_lenient(raw: &str) -> Option<ConnectorStatus> {
    if let Some(status) = ConnectorStatus::parse_observed(raw) {
        return Some(status);
    }
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(ConnectorStatus::Error);
    }
    None
}

/// Parse a single connector's key-value status block.
///
/// Keys are normalized to snake_case (`Session State` becomes
/// `session_state`).
pub fn parse_connector_status(response: &str, cid: &str) -> ConnectorStatusBlock {
    let mut fields = BTreeMap::new();

    for line in response.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase().replace(' ', "_");
        if key.is_empty() || key.starts_with('#') {
            continue;
        }
        fields.insert(key, value.trim().to_string());
    }

    ConnectorStatusBlock {
        cid: cid.to_string(),
        fields,
    }
}

/// Parse the gateway route listing.
///
/// Expected columns: `order type connector rate [filters...]`.
pub fn parse_route_list(response: &str) -> Vec<RouteListing> {
    let mut routes = Vec::new();

    for line in response.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() < 4 {
            trace!(line, "dropping unparseable route line");
            continue;
        }

        let Ok(order) = columns[0].parse::<i32>() else {
            trace!(line, "dropping route line with non-numeric order");
            continue;
        };
        let Ok(rate) = columns[3].parse::<f64>() else {
            trace!(line, "dropping route line with non-numeric rate");
            continue;
        };

        routes.push(RouteListing {
            order,
            route_type: columns[1].to_string(),
            connector_id: columns[2].to_string(),
            rate,
            filters: columns[4..].iter().map(|s| s.to_string()).collect(),
        });
    }

    routes
}

/// Extract the gateway-assigned message id from an HTTP submit response
/// body (`... Message ID: <token> ...`).
pub fn extract_message_id(body: &str) -> Option<String> {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(r"Message ID:\s*(\w+)").expect("valid message id pattern")
    });
    re.captures(body)
        .map(|captures| captures[1].to_string())
}

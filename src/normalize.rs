use thiserror::Error;
use tracing::warn;

use crate::types::{PortState, RawOutput, RawPortId, RawPortRecord, ScanEntry, ScanResult};

/// Service name used when the engine did not identify one.
pub const UNKNOWN_SERVICE: &str = "unknown";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationFault {
    /// The engine itself reported a failure; the message is kept verbatim.
    #[error("{0}")]
    EngineError(String),
}

/// A single record whose port could not be read. Never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid port {raw:?}: {reason}")]
pub struct PortParseError {
    pub raw: String,
    pub reason: String,
}

/// Turn raw engine output into a result table.
///
/// Records with an unreadable port are logged and skipped; everything else is
/// kept in the order the engine reported it.
pub fn normalize(raw: RawOutput) -> Result<ScanResult, NormalizationFault> {
    let (records, summary) = match raw {
        RawOutput::Failure { error } => return Err(NormalizationFault::EngineError(error)),
        RawOutput::Success { results, summary } => (results, summary),
    };

    let mut entries = Vec::with_capacity(records.len());
    let mut dropped = 0usize;
    for record in records {
        match normalize_record(record) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!("dropping scan record: {e}");
                dropped += 1;
            }
        }
    }

    Ok(ScanResult {
        entries,
        summary,
        dropped,
    })
}

fn normalize_record(record: RawPortRecord) -> Result<ScanEntry, PortParseError> {
    let port = coerce_port(&record.port)?;
    let service = match record.service {
        Some(s) if !s.trim().is_empty() => s,
        _ => UNKNOWN_SERVICE.to_string(),
    };
    Ok(ScanEntry {
        port,
        protocol: record.protocol,
        state: PortState::from(record.state.unwrap_or_else(|| "unknown".to_string())),
        service,
    })
}

/// Read a port id as a `u16`, accepting numbers or numeric strings.
pub fn coerce_port(raw: &RawPortId) -> Result<u16, PortParseError> {
    let fail = |reason: String| PortParseError {
        raw: raw.to_string(),
        reason,
    };
    match raw {
        RawPortId::Number(n) => u16::try_from(*n).map_err(|e| fail(e.to_string())),
        RawPortId::Text(s) => s.trim().parse::<u16>().map_err(|e| fail(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(port: RawPortId, state: Option<&str>, service: Option<&str>) -> RawPortRecord {
        RawPortRecord {
            port,
            protocol: "tcp".into(),
            state: state.map(str::to_string),
            service: service.map(str::to_string),
        }
    }

    #[test]
    fn coerce_accepts_numbers_and_numeric_text() {
        assert_eq!(coerce_port(&RawPortId::Number(443)), Ok(443));
        assert_eq!(coerce_port(&RawPortId::Text(" 22 ".into())), Ok(22));
    }

    #[test]
    fn coerce_rejects_out_of_range_and_garbage() {
        assert!(coerce_port(&RawPortId::Number(70000)).is_err());
        assert!(coerce_port(&RawPortId::Number(-1)).is_err());
        let err = coerce_port(&RawPortId::Text("abc".into())).unwrap_err();
        assert_eq!(err.raw, "abc");
    }

    #[test]
    fn blank_service_becomes_unknown() {
        let raw = RawOutput::Success {
            results: vec![
                record(RawPortId::Number(53), Some("open"), Some("  ")),
                record(RawPortId::Number(80), Some("open"), Some("http")),
            ],
            summary: None,
        };
        let result = normalize(raw).unwrap();
        assert_eq!(result.entries[0].service, UNKNOWN_SERVICE);
        assert_eq!(result.entries[1].service, "http");
    }

    #[test]
    fn unusual_states_pass_through() {
        let raw = RawOutput::Success {
            results: vec![
                record(RawPortId::Number(161), Some("open|filtered"), None),
                record(RawPortId::Number(162), None, None),
            ],
            summary: None,
        };
        let result = normalize(raw).unwrap();
        assert_eq!(result.entries[0].state.as_str(), "open|filtered");
        assert_eq!(result.entries[1].state, PortState::Other("unknown".into()));
    }

    #[test]
    fn counts_dropped_records() {
        let raw = RawOutput::Success {
            results: vec![
                record(RawPortId::Text("x".into()), Some("open"), None),
                record(RawPortId::Text("".into()), Some("open"), None),
                record(RawPortId::Number(8080), Some("filtered"), None),
            ],
            summary: Some("done".into()),
        };
        let result = normalize(raw).unwrap();
        assert_eq!(result.dropped, 2);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].state, PortState::Filtered);
        assert_eq!(result.summary.as_deref(), Some("done"));
    }
}

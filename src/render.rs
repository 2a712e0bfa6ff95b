use std::fmt::Write;

use crate::types::ScanResult;

/// Shown instead of a table when a scan completed but reported no ports.
pub const NO_PORTS_MESSAGE: &str = "No ports reported by the scan.";

const SERVICE_MAX: usize = 40;

/// Render a result as a fixed-width text table followed by the summary.
///
/// An empty result renders as [`NO_PORTS_MESSAGE`], never as an error.
pub fn format_results_table(result: &ScanResult) -> String {
    let mut out = String::new();

    if result.entries.is_empty() {
        let _ = writeln!(out, "{NO_PORTS_MESSAGE}");
    } else {
        let port_w = "port".len().max(5);
        let mut proto_w = "protocol".len();
        let mut state_w = "state".len();
        let mut service_w = "service".len();
        for e in &result.entries {
            proto_w = proto_w.max(e.protocol.len());
            state_w = state_w.max(e.state.as_str().len());
            service_w = service_w.max(e.service.len().min(SERVICE_MAX));
        }

        let _ = writeln!(
            out,
            "{:>port_w$}  {:<proto_w$}  {:<state_w$}  {:<service_w$}",
            "port", "protocol", "state", "service",
        );
        let _ = writeln!(
            out,
            "{:-<port_w$}  {:-<proto_w$}  {:-<state_w$}  {:-<service_w$}",
            "", "", "", "",
        );
        for e in &result.entries {
            let service: String = e.service.chars().take(SERVICE_MAX).collect();
            let _ = writeln!(
                out,
                "{:>port_w$}  {:<proto_w$}  {:<state_w$}  {:<service_w$}",
                e.port,
                e.protocol,
                e.state.as_str(),
                service,
            );
        }
    }

    if result.dropped > 0 {
        let _ = writeln!(out, "({} malformed record(s) skipped)", result.dropped);
    }
    if let Some(summary) = &result.summary {
        let _ = writeln!(out, "{summary}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PortState, ScanEntry};

    #[test]
    fn empty_result_has_its_own_message() {
        let out = format_results_table(&ScanResult {
            summary: Some("Nmap done".into()),
            ..ScanResult::default()
        });
        assert!(out.starts_with(NO_PORTS_MESSAGE));
        assert!(out.ends_with("Nmap done\n"));
    }

    #[test]
    fn rows_follow_entry_order() {
        let result = ScanResult {
            entries: vec![
                ScanEntry {
                    port: 443,
                    protocol: "tcp".into(),
                    state: PortState::Open,
                    service: "https".into(),
                },
                ScanEntry {
                    port: 22,
                    protocol: "tcp".into(),
                    state: PortState::Other("open|filtered".into()),
                    service: "unknown".into(),
                },
            ],
            summary: None,
            dropped: 1,
        };
        let out = format_results_table(&result);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].contains("port") && lines[0].contains("service"));
        assert!(lines[2].trim_start().starts_with("443"));
        assert!(lines[3].contains("open|filtered"));
        assert_eq!(lines[4], "(1 malformed record(s) skipped)");
    }
}

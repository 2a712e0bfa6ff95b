use nmap_form_rs::normalize::{normalize, NormalizationFault};
use nmap_form_rs::types::{PortState, RawOutput, ScanEntry};

#[test]
fn malformed_port_is_dropped_not_fatal() {
    let raw: RawOutput = serde_json::from_str(
        r#"{"results": [
            {"port": "80", "protocol": "tcp", "state": "open"},
            {"port": "abc", "protocol": "tcp", "state": "closed"}
        ]}"#,
    )
    .expect("valid payload");
    let result = normalize(raw).expect("normalizes");
    assert_eq!(
        result.entries,
        vec![ScanEntry {
            port: 80,
            protocol: "tcp".into(),
            state: PortState::Open,
            service: "unknown".into(),
        }]
    );
    assert_eq!(result.dropped, 1);
    assert_eq!(result.summary, None);
}

#[test]
fn engine_error_is_a_fault() {
    let raw: RawOutput =
        serde_json::from_str(r#"{"error": "Nmap command failed: You requested a scan type which requires root privileges."}"#)
            .expect("valid payload");
    assert_eq!(
        normalize(raw),
        Err(NormalizationFault::EngineError(
            "Nmap command failed: You requested a scan type which requires root privileges.".into()
        ))
    );
}

#[test]
fn empty_results_are_valid() {
    let raw: RawOutput =
        serde_json::from_str(r#"{"results": [], "summary": "1 IP address (0 hosts up)"}"#).expect("valid payload");
    let result = normalize(raw).expect("normalizes");
    assert!(result.entries.is_empty());
    assert_eq!(result.summary.as_deref(), Some("1 IP address (0 hosts up)"));
}

#[test]
fn order_is_preserved() {
    let raw: RawOutput = serde_json::from_str(
        r#"{"results": [
            {"port": 8080, "protocol": "tcp", "state": "open", "service": "http-proxy"},
            {"port": 22, "protocol": "tcp", "state": "open", "service": "ssh"},
            {"port": 53, "protocol": "udp", "state": "open|filtered", "service": ""}
        ]}"#,
    )
    .expect("valid payload");
    let result = normalize(raw).expect("normalizes");
    let ports: Vec<u16> = result.entries.iter().map(|e| e.port).collect();
    assert_eq!(ports, vec![8080, 22, 53]);
    assert_eq!(result.entries[2].protocol, "udp");
    assert_eq!(result.entries[2].state.to_string(), "open|filtered");
    assert_eq!(result.entries[2].service, "unknown");
}

#[test]
fn result_serializes_for_the_ui() {
    let raw: RawOutput = serde_json::from_str(
        r#"{"results": [{"port": "443", "protocol": "tcp", "state": "open", "service": "https"}], "summary": "done"}"#,
    )
    .expect("valid payload");
    let json = serde_json::to_value(normalize(raw).expect("normalizes")).expect("serializes");
    assert_eq!(
        json,
        serde_json::json!({
            "results": [{"port": 443, "protocol": "tcp", "state": "open", "service": "https"}],
            "summary": "done",
            "dropped": 0
        })
    );
}

#[test]
fn payload_without_results_or_error_is_rejected() {
    assert!(serde_json::from_str::<RawOutput>("{}").is_err());
    assert!(serde_json::from_str::<RawOutput>(r#"{"message": "x"}"#).is_err());
    assert!(serde_json::from_str::<RawOutput>(r#"{"summary": "done"}"#).is_err());
}

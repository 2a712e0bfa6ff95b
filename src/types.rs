use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::resolver::ValidationFault;

/// Probe method used against each port.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ScanTechnique {
    #[serde(rename = "tcp-connect")]
    #[value(name = "tcp-connect")]
    TcpConnect,
    #[serde(rename = "syn-scan")]
    #[value(name = "syn-scan")]
    Syn,
    #[serde(rename = "ack-scan")]
    #[value(name = "ack-scan")]
    Ack,
    #[serde(rename = "window-scan")]
    #[value(name = "window-scan")]
    Window,
    #[serde(rename = "xmas-scan")]
    #[value(name = "xmas-scan")]
    Xmas,
    #[serde(rename = "null-scan")]
    #[value(name = "null-scan")]
    Null,
    #[serde(rename = "fin-scan")]
    #[value(name = "fin-scan")]
    Fin,
    #[serde(rename = "udp-scan")]
    #[value(name = "udp-scan")]
    Udp,
}

impl ScanTechnique {
    pub const ALL: [ScanTechnique; 8] = [
        ScanTechnique::TcpConnect,
        ScanTechnique::Syn,
        ScanTechnique::Ack,
        ScanTechnique::Window,
        ScanTechnique::Xmas,
        ScanTechnique::Null,
        ScanTechnique::Fin,
        ScanTechnique::Udp,
    ];

    /// Identifier used by the form and the CLI (`tcp-connect`, `syn-scan`, ...).
    pub fn id(self) -> &'static str {
        match self {
            ScanTechnique::TcpConnect => "tcp-connect",
            ScanTechnique::Syn => "syn-scan",
            ScanTechnique::Ack => "ack-scan",
            ScanTechnique::Window => "window-scan",
            ScanTechnique::Xmas => "xmas-scan",
            ScanTechnique::Null => "null-scan",
            ScanTechnique::Fin => "fin-scan",
            ScanTechnique::Udp => "udp-scan",
        }
    }
}

impl fmt::Display for ScanTechnique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ScanTechnique {
    type Err = ValidationFault;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ScanTechnique::ALL
            .into_iter()
            .find(|t| t.id() == s)
            .ok_or_else(|| ValidationFault::UnknownTechnique(s.to_string()))
    }
}

/// Which ports to probe. Exactly one mode is active at a time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "mode", content = "value", rename_all = "kebab-case")]
pub enum PortSelection {
    /// Free-form port expression handed to the engine untouched (`80,443`, `1-1024`).
    Explicit(String),
    /// The engine's short list of common ports.
    Fast,
    /// Every port, 1-65535.
    Full,
    /// The N most common ports.
    TopN(u32),
}

impl PortSelection {
    /// Count used when the top-ports preset is picked without one.
    pub const DEFAULT_TOP_N: u32 = 1000;

    pub fn is_preset(&self) -> bool {
        !matches!(self, PortSelection::Explicit(_))
    }
}

impl Default for PortSelection {
    fn default() -> Self {
        PortSelection::Explicit("1-100".to_string())
    }
}

/// The toggles that survive resolution, after implications are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Toggles {
    pub skip_discovery: bool,
    pub version_detection: bool,
    pub os_detection: bool,
    pub script_scan: bool,
    pub aggressive: bool,
}

/// Scan options exactly as the user entered them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ScanIntent {
    pub target: String,
    pub ports: PortSelection,
    /// Technique identifier; only checked against [`ScanTechnique`] when it is used.
    pub technique: String,
    pub ping_only: bool,
    pub skip_discovery: bool,
    pub version_detection: bool,
    pub os_detection: bool,
    pub script_scan: bool,
    pub aggressive: bool,
    /// Timing template, 1 (slow) to 5 (fast).
    pub timing: u8,
    /// 0 is silent.
    pub verbosity: u8,
}

impl Default for ScanIntent {
    fn default() -> Self {
        Self {
            target: String::new(),
            ports: PortSelection::default(),
            technique: ScanTechnique::TcpConnect.id().to_string(),
            ping_only: false,
            skip_discovery: false,
            version_detection: false,
            os_detection: false,
            script_scan: false,
            aggressive: false,
            timing: 3,
            verbosity: 1,
        }
    }
}

impl ScanIntent {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn with_technique(mut self, technique: ScanTechnique) -> Self {
        self.technique = technique.id().to_string();
        self
    }

    /// Replace the port selection; whatever was active before is gone.
    pub fn select_ports(&mut self, selection: PortSelection) {
        self.ports = selection;
    }

    /// Turning aggressive on also turns on version, OS and script detection.
    /// Turning it off leaves them as they are.
    pub fn set_aggressive(&mut self, on: bool) {
        self.aggressive = on;
        if on {
            self.version_detection = true;
            self.os_detection = true;
            self.script_scan = true;
        }
    }

    /// Toggle view with the aggressive implication applied. Does not touch `self`.
    pub fn effective_toggles(&self) -> Toggles {
        Toggles {
            skip_discovery: self.skip_discovery,
            version_detection: self.version_detection || self.aggressive,
            os_detection: self.os_detection || self.aggressive,
            script_scan: self.script_scan || self.aggressive,
            aggressive: self.aggressive,
        }
    }
}

/// One instruction for the scan engine. How it is spelled on a command line is
/// up to the engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "directive", content = "arg", rename_all = "snake_case")]
pub enum Directive {
    Technique(ScanTechnique),
    PortRange(String),
    FullRange,
    FastPreset,
    TopPorts(u32),
    DiscoveryOnly,
    SkipDiscovery,
    VersionDetection,
    OsDetection,
    ScriptScan,
    Aggressive,
    Timing(u8),
    /// Verbosity level carried as a count, not as repeated directives.
    Verbosity(u8),
}

impl Directive {
    pub fn is_port_directive(&self) -> bool {
        matches!(
            self,
            Directive::PortRange(_)
                | Directive::FullRange
                | Directive::FastPreset
                | Directive::TopPorts(_)
        )
    }
}

/// Ordered output of [`crate::resolver::resolve`].
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct DirectiveSet(Vec<Directive>);

impl DirectiveSet {
    pub(crate) fn from_vec(directives: Vec<Directive>) -> Self {
        Self(directives)
    }

    pub fn as_slice(&self) -> &[Directive] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Directive> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, directive: &Directive) -> bool {
        self.0.contains(directive)
    }
}

impl<'a> IntoIterator for &'a DirectiveSet {
    type Item = &'a Directive;
    type IntoIter = std::slice::Iter<'a, Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Port state as reported by the engine. Unrecognized values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    Other(String),
}

impl PortState {
    pub fn as_str(&self) -> &str {
        match self {
            PortState::Open => "open",
            PortState::Closed => "closed",
            PortState::Filtered => "filtered",
            PortState::Other(s) => s,
        }
    }
}

impl From<String> for PortState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "open" => PortState::Open,
            "closed" => PortState::Closed,
            "filtered" => PortState::Filtered,
            _ => PortState::Other(s),
        }
    }
}

impl From<&str> for PortState {
    fn from(s: &str) -> Self {
        PortState::from(s.to_string())
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PortState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PortState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(PortState::from)
    }
}

/// One row of the result table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub port: u16,
    pub protocol: String,
    pub state: PortState,
    pub service: String,
}

/// Normalized outcome of one completed scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanResult {
    #[serde(rename = "results")]
    pub entries: Vec<ScanEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Raw records discarded because their port could not be read.
    #[serde(default)]
    pub dropped: usize,
}

/// Port identifier as the engine sent it: a number or a string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RawPortId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RawPortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawPortId::Number(n) => write!(f, "{n}"),
            RawPortId::Text(s) => f.write_str(s),
        }
    }
}

/// Per-port record from the engine, before normalization.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawPortRecord {
    pub port: RawPortId,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
}

/// Whatever the engine hands back for one scan.
///
/// A payload with neither `error` nor `results` is rejected rather than read
/// as an empty scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RawOutput {
    Failure {
        error: String,
    },
    Success {
        results: Vec<RawPortRecord>,
        #[serde(default)]
        summary: Option<String>,
    },
}

impl RawOutput {
    pub fn failure(message: impl Into<String>) -> Self {
        RawOutput::Failure {
            error: message.into(),
        }
    }
}

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, error, info};

use crate::types::{Directive, DirectiveSet, RawOutput, RawPortId, RawPortRecord, ScanTechnique};

/// Summary reported when the engine does not provide one.
pub const DEFAULT_SUMMARY: &str = "Scan completed.";

/// Something that can carry out a resolved scan.
///
/// Failures of the engine itself come back as [`RawOutput::Failure`] so callers
/// handle them the same way regardless of transport.
#[async_trait]
pub trait ScanEngine: Send + Sync {
    async fn run(&self, target: &str, directives: &DirectiveSet) -> RawOutput;
}

/// Runs the local `nmap` binary and reads its XML report from stdout.
#[derive(Debug, Clone)]
pub struct NmapEngine {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl Default for NmapEngine {
    fn default() -> Self {
        Self::new("nmap")
    }
}

impl NmapEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Give up on a scan that runs longer than `timeout`; the child is killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Full argument vector passed to the binary for one scan.
    ///
    /// The target goes last, after `--`, so it is never read as an option.
    pub fn command_args(target: &str, directives: &DirectiveSet) -> Vec<String> {
        let mut args = nmap_args(directives);
        args.push("-oX".to_string());
        args.push("-".to_string());
        args.push("--".to_string());
        args.push(target.to_string());
        args
    }

    async fn execute(&self, args: &[String]) -> Result<String, String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => match time::timeout(limit, cmd.output()).await {
                Ok(res) => res,
                Err(_) => {
                    return Err(format!(
                        "Nmap scan timed out after {}s",
                        limit.as_secs()
                    ))
                }
            },
            None => cmd.output().await,
        };

        match output {
            Ok(out) if out.status.success() => Ok(String::from_utf8_lossy(&out.stdout).into_owned()),
            Ok(out) => Err(format!(
                "Nmap command failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err("Nmap is not installed or not in the system's PATH.".to_string())
            }
            Err(e) => Err(format!("Unexpected error during Nmap execution: {e}")),
        }
    }
}

#[async_trait]
impl ScanEngine for NmapEngine {
    async fn run(&self, target: &str, directives: &DirectiveSet) -> RawOutput {
        let args = Self::command_args(target, directives);
        info!(command = %format!("{} {}", self.program.display(), args.join(" ")), "running nmap");

        let xml = match self.execute(&args).await {
            Ok(xml) => xml,
            Err(msg) => {
                error!("{msg}");
                return RawOutput::failure(msg);
            }
        };
        debug!(bytes = xml.len(), "nmap finished");

        match parse_nmap_xml(&xml) {
            Ok(raw) => raw,
            Err(e) => {
                error!("could not parse nmap XML: {e}");
                RawOutput::failure(format!("Error parsing Nmap XML output: {e}"))
            }
        }
    }
}

/// Command-line spelling of a directive set, in order.
pub fn nmap_args(directives: &DirectiveSet) -> Vec<String> {
    directives.iter().flat_map(directive_args).collect()
}

fn directive_args(directive: &Directive) -> Vec<String> {
    let one = |s: &str| vec![s.to_string()];
    match directive {
        Directive::Technique(t) => one(technique_flag(*t)),
        Directive::PortRange(expr) => vec!["-p".to_string(), expr.clone()],
        Directive::FullRange => one("-p-"),
        Directive::FastPreset => one("-F"),
        Directive::TopPorts(n) => vec!["--top-ports".to_string(), n.to_string()],
        Directive::DiscoveryOnly => one("-sn"),
        Directive::SkipDiscovery => one("-Pn"),
        Directive::VersionDetection => one("-sV"),
        Directive::OsDetection => one("-O"),
        Directive::ScriptScan => one("-sC"),
        Directive::Aggressive => one("-A"),
        Directive::Timing(n) => vec![format!("-T{n}")],
        Directive::Verbosity(n) => vec![format!("-{}", "v".repeat(usize::from(*n)))],
    }
}

fn technique_flag(t: ScanTechnique) -> &'static str {
    match t {
        ScanTechnique::TcpConnect => "-sT",
        ScanTechnique::Syn => "-sS",
        ScanTechnique::Ack => "-sA",
        ScanTechnique::Window => "-sW",
        ScanTechnique::Xmas => "-sX",
        ScanTechnique::Null => "-sN",
        ScanTechnique::Fin => "-sF",
        ScanTechnique::Udp => "-sU",
    }
}

// Partial nmap XML schema: only what the result table needs.

#[derive(Debug, Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<XmlHost>,
    #[serde(default)]
    runstats: Option<XmlRunStats>,
}

#[derive(Debug, Deserialize)]
struct XmlHost {
    #[serde(default)]
    ports: Option<XmlPorts>,
}

#[derive(Debug, Deserialize)]
struct XmlPorts {
    #[serde(rename = "port", default)]
    ports: Vec<XmlPort>,
}

#[derive(Debug, Deserialize)]
struct XmlPort {
    #[serde(rename = "@portid")]
    portid: String,
    #[serde(rename = "@protocol", default)]
    protocol: String,
    #[serde(default)]
    state: Option<XmlState>,
    #[serde(default)]
    service: Option<XmlService>,
}

#[derive(Debug, Deserialize)]
struct XmlState {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, Deserialize)]
struct XmlService {
    #[serde(rename = "@name", default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlRunStats {
    #[serde(default)]
    finished: Option<XmlFinished>,
}

#[derive(Debug, Deserialize)]
struct XmlFinished {
    #[serde(rename = "@summary", default)]
    summary: Option<String>,
}

/// Reduce an nmap XML report to per-port records plus the run summary.
///
/// Port ids are kept as text; turning them into numbers is the normalizer's job.
pub fn parse_nmap_xml(xml: &str) -> Result<RawOutput, quick_xml::de::DeError> {
    let run: NmapRun = quick_xml::de::from_str(xml)?;

    let results = run
        .hosts
        .into_iter()
        .filter_map(|h| h.ports)
        .flat_map(|p| p.ports)
        .map(|p| RawPortRecord {
            port: RawPortId::Text(p.portid),
            protocol: p.protocol,
            state: p.state.map(|s| s.state),
            service: p.service.and_then(|s| s.name),
        })
        .collect();

    let summary = run
        .runstats
        .and_then(|r| r.finished)
        .and_then(|f| f.summary)
        .unwrap_or_else(|| DEFAULT_SUMMARY.to_string());

    Ok(RawOutput::Success {
        results,
        summary: Some(summary),
    })
}

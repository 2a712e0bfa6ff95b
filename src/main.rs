use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use nmap_form_rs::engine::{NmapEngine, ScanEngine};
use nmap_form_rs::normalize::normalize;
use nmap_form_rs::render::format_results_table;
use nmap_form_rs::resolver::resolve;
use nmap_form_rs::server::{self, AppState};
use nmap_form_rs::types::{PortSelection, ScanIntent, ScanResult, ScanTechnique};

/// nmap-form-rs — configure an nmap scan from a handful of options and view normalized results.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nmap-form-rs",
    version,
    about = "Configure an nmap scan from a handful of options and view normalized results.",
    long_about = None
)]
struct Cli {
    /// Hostname or address expression to scan. Required unless --serve-ui is given.
    target: Option<String>,

    /// Port expression passed to nmap as-is (e.g., 80,443 or 1-1024). Ignored when a preset is set.
    #[arg(long, default_value = "1-100")]
    ports: String,

    /// Scan every port (-p-).
    #[arg(long, overrides_with_all = ["fast", "top_ports"])]
    full: bool,

    /// Scan nmap's short list of common ports (-F).
    #[arg(long, overrides_with_all = ["full", "top_ports"])]
    fast: bool,

    /// Scan the N most common ports.
    #[arg(long = "top-ports", value_name = "N", num_args = 0..=1, default_missing_value = "1000",
          overrides_with_all = ["full", "fast"])]
    top_ports: Option<u32>,

    /// Scan technique.
    #[arg(long, value_enum, default_value_t = ScanTechnique::TcpConnect)]
    technique: ScanTechnique,

    /// Host discovery only; technique and ports are ignored (-sn).
    #[arg(long = "ping-only", default_value_t = false)]
    ping_only: bool,

    /// Treat all hosts as online (-Pn).
    #[arg(long = "skip-discovery", default_value_t = false)]
    skip_discovery: bool,

    /// Probe service versions (-sV).
    #[arg(long = "version-detection", default_value_t = false)]
    version_detection: bool,

    /// Detect the remote OS (-O).
    #[arg(long = "os-detection", default_value_t = false)]
    os_detection: bool,

    /// Run default scripts (-sC).
    #[arg(long = "script-scan", default_value_t = false)]
    script_scan: bool,

    /// Aggressive scan (-A); implies version, OS and script detection.
    #[arg(long, default_value_t = false)]
    aggressive: bool,

    /// Timing template, 1 (slow) to 5 (fast).
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=5))]
    timing: u8,

    /// nmap verbosity, 0 (silent) to 5.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=5))]
    verbosity: u8,

    /// Print the resolved nmap arguments and exit without scanning.
    #[arg(long = "dry-run", default_value_t = false)]
    dry_run: bool,

    /// Write results as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// nmap binary to run.
    #[arg(long, default_value = "nmap")]
    nmap: PathBuf,

    /// Abort a scan that runs longer than this many seconds.
    #[arg(long = "scan-timeout-secs")]
    scan_timeout_secs: Option<u64>,

    /// Start the embedded HTTP UI server.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Address for the HTTP UI server.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,
}

impl Cli {
    fn port_selection(&self) -> PortSelection {
        if self.full {
            PortSelection::Full
        } else if self.fast {
            PortSelection::Fast
        } else if let Some(n) = self.top_ports {
            PortSelection::TopN(n)
        } else {
            PortSelection::Explicit(self.ports.clone())
        }
    }

    fn intent(&self, target: &str) -> ScanIntent {
        let mut intent = ScanIntent::new(target).with_technique(self.technique);
        intent.select_ports(self.port_selection());
        intent.ping_only = self.ping_only;
        intent.skip_discovery = self.skip_discovery;
        intent.version_detection = self.version_detection;
        intent.os_detection = self.os_detection;
        intent.script_scan = self.script_scan;
        intent.set_aggressive(self.aggressive);
        intent.timing = self.timing;
        intent.verbosity = self.verbosity;
        intent
    }

    fn engine(&self) -> NmapEngine {
        let engine = NmapEngine::new(self.nmap.clone());
        match self.scan_timeout_secs {
            Some(secs) => engine.with_timeout(Duration::from_secs(secs)),
            None => engine,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.serve_ui {
        let state = AppState::new(Arc::new(cli.engine()));
        let shutdown = CancellationToken::new();
        let on_ctrlc = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            on_ctrlc.cancel();
        });
        println!("UI server starting at http://{} (Ctrl+C to stop)", cli.bind);
        return server::spawn_server(&cli.bind, state, shutdown).await;
    }

    let Some(target) = cli.target.as_deref() else {
        bail!("a scan target is required (or pass --serve-ui)");
    };

    let intent = cli.intent(target);
    let directives = resolve(&intent).context("invalid scan options")?;
    let args = NmapEngine::command_args(intent.target.trim(), &directives);

    println!("nmap-form-rs configuration:");
    println!("  target       : {}", intent.target);
    println!("  technique    : {}", if intent.ping_only { "<ping only>" } else { intent.technique.as_str() });
    println!("  timing       : T{}", intent.timing);
    println!("  verbosity    : {}", intent.verbosity);
    println!(
        "  output       : {}",
        cli.output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!("  command      : {} {}", cli.nmap.display(), args.join(" "));

    if cli.dry_run {
        return Ok(());
    }

    let raw = cli.engine().run(intent.target.trim(), &directives).await;
    let result = normalize(raw).context("scan failed")?;
    println!();
    print!("{}", format_results_table(&result));

    if let Some(path) = cli.output.as_deref() {
        write_results_json(path, &result)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("Wrote JSON results to {}", path.display());
    }

    Ok(())
}

fn write_results_json(path: &Path, results: &ScanResult) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}

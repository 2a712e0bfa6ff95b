use thiserror::Error;
use tracing::warn;

use crate::types::{Directive, DirectiveSet, PortSelection, ScanIntent, ScanTechnique};

/// Reasons an intent cannot be turned into directives. Nothing is issued when
/// one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFault {
    #[error("scan target must not be empty")]
    EmptyTarget,
    #[error("unknown scan technique: {0:?}")]
    UnknownTechnique(String),
}

/// Resolve user intent into the ordered directives for one scan.
///
/// Order: discovery-only or technique + port selection, then the toggles
/// (skip discovery, version, OS, scripts, aggressive), then timing, then
/// verbosity. Pure: the same intent always yields the same set.
pub fn resolve(intent: &ScanIntent) -> Result<DirectiveSet, ValidationFault> {
    if intent.target.trim().is_empty() {
        return Err(ValidationFault::EmptyTarget);
    }

    let mut out = Vec::with_capacity(10);

    if intent.ping_only {
        out.push(Directive::DiscoveryOnly);
    } else {
        let technique: ScanTechnique = intent.technique.parse()?;
        out.push(Directive::Technique(technique));
        if let Some(d) = port_directive(&intent.ports) {
            out.push(d);
        }
    }

    let toggles = intent.effective_toggles();
    let flagged = [
        (toggles.skip_discovery, Directive::SkipDiscovery),
        (toggles.version_detection, Directive::VersionDetection),
        (toggles.os_detection, Directive::OsDetection),
        (toggles.script_scan, Directive::ScriptScan),
        (toggles.aggressive, Directive::Aggressive),
    ];
    out.extend(flagged.into_iter().filter(|(on, _)| *on).map(|(_, d)| d));

    let timing = intent.timing.clamp(1, 5);
    if timing != intent.timing {
        warn!(requested = intent.timing, used = timing, "timing template out of range, clamped");
    }
    out.push(Directive::Timing(timing));
    let verbosity = intent.verbosity.min(5);
    if verbosity != intent.verbosity {
        warn!(requested = intent.verbosity, used = verbosity, "verbosity out of range, clamped");
    }
    if verbosity > 0 {
        out.push(Directive::Verbosity(verbosity));
    }

    Ok(DirectiveSet::from_vec(out))
}

fn port_directive(selection: &PortSelection) -> Option<Directive> {
    match selection {
        PortSelection::Full => Some(Directive::FullRange),
        PortSelection::Fast => Some(Directive::FastPreset),
        PortSelection::TopN(n) => Some(Directive::TopPorts(*n)),
        // Passed through as typed; the engine owns port-expression grammar.
        PortSelection::Explicit(expr) if !expr.trim().is_empty() => {
            Some(Directive::PortRange(expr.clone()))
        }
        PortSelection::Explicit(_) => None,
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Severity tier of a vulnerability advisory. Serialized uppercase; parsed
/// case-insensitively, since advisory files spell tiers inconsistently.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        const TIERS: &[&str] = &["CRITICAL", "HIGH", "MEDIUM", "LOW", "INFO"];
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Severity::Critical),
            "HIGH" => Ok(Severity::High),
            "MEDIUM" => Ok(Severity::Medium),
            "LOW" => Ok(Severity::Low),
            "INFO" => Ok(Severity::Info),
            _ => Err(serde::de::Error::unknown_variant(&raw, TIERS)),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Info => "INFO",
        };
        f.write_str(s)
    }
}

/// One component identified by the fingerprint engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FingerprintMatch {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl FingerprintMatch {
    /// Compact `name:type:version` label used in result lines and tables.
    pub fn label(&self) -> String {
        let mut s = self.name.clone();
        if let Some(t) = self.ftype.as_deref().filter(|t| !t.is_empty()) {
            s.push(':');
            s.push_str(t);
        }
        if let Some(v) = self.version.as_deref().filter(|v| !v.is_empty()) {
            s.push(':');
            s.push_str(v);
        }
        s
    }
}

/// Half-open version interval, OSV-style: `introduced <= v < fixed`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct VersionRange {
    #[serde(default)]
    pub introduced: Option<String>,
    #[serde(default)]
    pub fixed: Option<String>,
}

/// A known vulnerability record keyed by component name + version range.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Advisory {
    pub component: String,
    #[serde(default)]
    pub affected: Option<VersionRange>,
    pub cve: String,
    pub severity: Severity,
    pub summary: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub remediation: String,
    #[serde(default)]
    pub references: Vec<String>,
    /// Only reported for targets classified as internal.
    #[serde(default)]
    pub internal_only: bool,
}

/// Enriched result of one successful probe. Owned by the producing task until
/// it is handed to the aggregator over the result channel.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProbeOutcome {
    pub url: String,
    pub status_code: u16,
    pub content_length: u64,
    pub title: String,
    pub latency_ms: u64,
    pub fingerprints: Vec<FingerprintMatch>,
    pub advisories: Vec<Advisory>,
}

impl ProbeOutcome {
    /// All fingerprint labels joined for table/event display.
    pub fn fingerprint_string(&self) -> String {
        self.fingerprints
            .iter()
            .map(FingerprintMatch::label)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Aggregate severity breakdown and derived security score in [0, 100].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sec_score: u32,
    pub high_risk: usize,
    pub medium_risk: usize,
    pub low_risk: usize,
}

/// Per-result payload delivered to an external observer.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResultEvent {
    pub target_url: String,
    pub status_code: u16,
    pub title: String,
    pub fingerprint: String,
    pub vulnerabilities: Vec<Advisory>,
}

/// Event stream exposed to an embedding caller (e.g. an orchestrator driving
/// remote scan agents): progress ticks, per-result summaries, final report.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Progress { current: u64, total: u64 },
    Result(ResultEvent),
    Report(RunSummary),
}

/// Observer callback invoked from worker and aggregator tasks.
pub type ScanCallback = Arc<dyn Fn(ScanEvent) + Send + Sync>;

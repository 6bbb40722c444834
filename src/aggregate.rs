use crate::ai::{self, AiOptions};
use crate::enrich::colored_status;
use crate::types::{ProbeOutcome, ResultEvent, ScanCallback, ScanEvent, Severity};
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Aggregator wiring: where results go besides stdout.
#[derive(Default)]
pub struct AggregatorConfig {
    pub output_path: Option<PathBuf>,
    pub callback: Option<ScanCallback>,
    pub ai: Option<AiOptions>,
}

/// Single long-lived consumer of the result stream. Writes each outcome as it
/// arrives (stdout, optional file, observer event), buffers everything, and
/// renders the end-of-run summary tables once the stream closes.
///
/// Output failures are logged and never halt aggregation.
pub async fn run_aggregator(
    mut rx: mpsc::Receiver<ProbeOutcome>,
    cfg: AggregatorConfig,
) -> Vec<ProbeOutcome> {
    let mut file = cfg.output_path.as_ref().and_then(|path| {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(mut f) => {
                let started = OffsetDateTime::now_utc()
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"));
                let _ = writeln!(f, "# scan started {started}");
                Some(f)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot open output file, continuing stdout-only");
                None
            }
        }
    });

    let mut results: Vec<ProbeOutcome> = Vec::new();
    while let Some(outcome) = rx.recv().await {
        write_result(&outcome, file.as_mut());
        if let Some(cb) = &cfg.callback {
            cb(ScanEvent::Result(ResultEvent {
                target_url: outcome.url.clone(),
                status_code: outcome.status_code,
                title: outcome.title.clone(),
                fingerprint: outcome.fingerprint_string(),
                vulnerabilities: outcome.advisories.clone(),
            }));
        }
        if let Some(ai_opts) = &cfg.ai {
            if !outcome.advisories.is_empty() {
                match ai::analyze(ai_opts, &outcome).await {
                    Ok(report) => {
                        println!("AI analysis:\n{report}");
                        if let Some(f) = file.as_mut() {
                            if let Err(e) = writeln!(f, "{report}") {
                                error!(error = %e, "failed to append AI analysis");
                            }
                        }
                    }
                    Err(e) => error!(url = %outcome.url, error = %e, "AI analysis failed"),
                }
            }
        }
        results.push(outcome);
    }

    if !results.is_empty() {
        println!("Application Summary:");
        println!("{}", app_summary_table(&results));
        let vuln_table = vuln_summary_table(&results);
        if !vuln_table.is_empty() {
            println!("Vulnerability Summary:");
            println!("{vuln_table}");
        }
    }
    results
}

fn write_result(outcome: &ProbeOutcome, file: Option<&mut std::fs::File>) {
    let fps = outcome
        .fingerprints
        .iter()
        .map(|fp| format!("[{}]", fp.label()))
        .collect::<Vec<_>>()
        .join(" ");
    println!(
        "{} [{}] [{}] {}",
        outcome.url,
        colored_status(outcome.status_code),
        outcome.title,
        fps
    );
    if let Some(f) = file {
        let line = format!(
            "{} [{}] [{}] {}",
            outcome.url, outcome.status_code, outcome.title, fps
        );
        if let Err(e) = writeln!(f, "{line}") {
            error!(error = %e, "failed to write result line");
        }
        for ad in &outcome.advisories {
            let block = format!(
                "{} [{}]: {}\n{}\nSuggestion: {}",
                ad.cve, ad.severity, ad.summary, ad.details, ad.remediation
            );
            if let Err(e) = writeln!(f, "{block}") {
                error!(error = %e, "failed to write advisory block");
            }
        }
    }
    if !outcome.advisories.is_empty() {
        println!("\nVulnerabilities found:");
        for ad in &outcome.advisories {
            let heading = format!("{} [{}]", ad.cve, ad.severity);
            let heading = match ad.severity {
                Severity::High | Severity::Critical => heading.red().to_string(),
                Severity::Medium => heading.yellow().to_string(),
                _ => heading.bold().to_string(),
            };
            println!("{heading}: {}\n{}", ad.summary, ad.details);
            if !ad.remediation.is_empty() {
                println!("Suggestion: {}", ad.remediation);
            }
        }
    }
}

fn snip(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &s[..cut])
    } else {
        s.to_string()
    }
}

/// Per-target overview table with computed column widths.
pub fn app_summary_table(results: &[ProbeOutcome]) -> String {
    let header = ["Target", "StatusCode", "Title", "FingerPrint"];
    let rows: Vec<[String; 4]> = results
        .iter()
        .map(|r| {
            [
                r.url.clone(),
                r.status_code.to_string(),
                snip(&r.title, 40),
                r.fingerprint_string(),
            ]
        })
        .collect();
    render_table(&header, &rows)
}

/// Vulnerability table covering only targets with at least one advisory.
/// Empty string when nothing is vulnerable.
pub fn vuln_summary_table(results: &[ProbeOutcome]) -> String {
    let header = ["CVE", "Severity", "VulName", "Target", "Suggestions"];
    let rows: Vec<[String; 5]> = results
        .iter()
        .flat_map(|r| {
            r.advisories.iter().map(|ad| {
                [
                    ad.cve.clone(),
                    ad.severity.to_string(),
                    snip(&ad.summary, 40),
                    r.url.clone(),
                    snip(&ad.remediation, 40),
                ]
            })
        })
        .collect();
    if rows.is_empty() {
        return String::new();
    }
    render_table(&header, &rows)
}

pub(crate) fn render_table<const N: usize>(header: &[&str; N], rows: &[[String; N]]) -> String {
    let mut widths: [usize; N] = [0; N];
    for (i, h) in header.iter().enumerate() {
        widths[i] = h.chars().count();
    }
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }
    let mut out = String::new();
    let push_row = |cells: &[String; N], out: &mut String| {
        for (i, cell) in cells.iter().enumerate() {
            out.push_str(&format!("{:<w$}  ", cell, w = widths[i]));
        }
        out.push('\n');
    };
    push_row(&header.map(String::from), &mut out);
    push_row(&widths.map(|w| "-".repeat(w)), &mut out);
    for row in rows {
        push_row(row, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Advisory, FingerprintMatch};

    fn outcome_with_advisory() -> ProbeOutcome {
        ProbeOutcome {
            url: "http://10.0.0.1:80".into(),
            status_code: 200,
            content_length: 512,
            title: "Admin Panel".into(),
            latency_ms: 12,
            fingerprints: vec![FingerprintMatch {
                name: "Jenkins".into(),
                ftype: None,
                version: Some("2.1".into()),
            }],
            advisories: vec![Advisory {
                component: "Jenkins".into(),
                affected: None,
                cve: "CVE-2024-23897".into(),
                severity: Severity::High,
                summary: "Arbitrary file read via CLI".into(),
                details: String::new(),
                remediation: "Upgrade to 2.442".into(),
                references: vec![],
                internal_only: false,
            }],
        }
    }

    #[test]
    fn app_summary_lists_every_target() {
        let table = app_summary_table(&[outcome_with_advisory()]);
        assert!(table.contains("Target"));
        assert!(table.contains("http://10.0.0.1:80"));
        assert!(table.contains("Jenkins:2.1"));
    }

    #[test]
    fn vuln_summary_only_for_advisories() {
        let mut clean = outcome_with_advisory();
        clean.advisories.clear();
        assert!(vuln_summary_table(&[clean]).is_empty());

        let table = vuln_summary_table(&[outcome_with_advisory()]);
        assert!(table.contains("CVE-2024-23897"));
        assert!(table.contains("HIGH"));
    }

    #[test]
    fn snip_respects_char_boundaries() {
        assert_eq!(snip("short", 40), "short");
        let snipped = snip("café déjà vu all over again and then some more", 10);
        assert!(snipped.ends_with('…'));
    }
}

use std::path::PathBuf;

use infra_scan_rs::ai::AiOptions;
use infra_scan_rs::runner::{Runner, RunnerOptions};

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// infra-scan-rs: concurrent HTTP(S) recon scanner that fingerprints exposed
/// services and correlates them with vulnerability advisories.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "infra-scan-rs",
    version,
    about = "Concurrent HTTP(S) recon scanner with fingerprint and advisory correlation.",
    long_about = None
)]
struct Cli {
    /// Targets: hosts, host:port pairs, URLs, or IPv4 CIDR ranges.
    targets: Vec<String>,

    /// Newline-delimited file of additional targets.
    #[arg(long = "file", short = 'f')]
    target_file: Option<PathBuf>,

    /// Also scan the local machine's open ports.
    #[arg(long = "localscan", default_value_t = false)]
    local_scan: bool,

    /// Requests per second; also caps concurrent probes.
    #[arg(long, default_value_t = 100)]
    rate_limit: usize,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// HTTP/HTTPS proxy URL.
    #[arg(long)]
    proxy: Option<String>,

    /// Extra request header, `Name: value` (repeatable).
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,

    /// Append results to this file (stdout-only when omitted).
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Fingerprint rule file or directory.
    #[arg(long = "fps", default_value = "data/fingerprints")]
    fp_templates: PathBuf,

    /// Vulnerability advisory directory.
    #[arg(long = "advisories", default_value = "data/vuln")]
    adv_templates: PathBuf,

    /// Advisory language variant (e.g. `en` selects `<dir>_en`).
    #[arg(long, default_value = "")]
    lang: String,

    /// List loaded components and their advisory counts, then exit.
    #[arg(long = "list-vul", default_value_t = false)]
    list_vul: bool,

    /// Token for AI analysis of vulnerable results (disabled when absent).
    #[arg(long)]
    ai_token: Option<String>,

    /// OpenAI-compatible endpoint for AI analysis.
    #[arg(long, default_value = "https://api.deepseek.com")]
    ai_base_url: String,

    /// Model name for AI analysis.
    #[arg(long, default_value = "deepseek-reasoner")]
    ai_model: String,
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("invalid header (expected `Name: value`): {raw}"))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let headers = cli
        .headers
        .iter()
        .map(|h| parse_header(h))
        .collect::<Result<Vec<_>>>()?;

    let ai = cli.ai_token.as_ref().map(|token| AiOptions {
        token: token.clone(),
        base_url: cli.ai_base_url.clone(),
        model: cli.ai_model.clone(),
    });

    let options = RunnerOptions {
        targets: cli.targets,
        target_file: cli.target_file,
        local_scan: cli.local_scan,
        rate_limit: cli.rate_limit,
        timeout_secs: cli.timeout,
        proxy: cli.proxy,
        headers,
        output: cli.output,
        fp_templates: cli.fp_templates,
        adv_templates: cli.adv_templates,
        language: cli.lang,
        ai,
        callback: None,
    };

    let runner = Runner::new(options).await?;

    if cli.list_vul {
        runner.show_fp_and_vul_list();
        runner.close();
        return Ok(());
    }

    let summary = runner.run().await?;
    println!(
        "Security score: {}/100 (high: {}, medium: {}, low: {})",
        summary.sec_score, summary.high_risk, summary.medium_risk, summary.low_risk
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_parsing_trims_both_sides() {
        let (name, value) = parse_header("X-Forwarded-For:  10.0.0.1 ").unwrap();
        assert_eq!(name, "X-Forwarded-For");
        assert_eq!(value, "10.0.0.1");
        assert!(parse_header("not-a-header").is_err());
    }
}

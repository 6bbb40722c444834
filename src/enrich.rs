use crate::favicon;
use crate::http::HttpResponse;
use crate::probe::ProbeContext;
use crate::types::ProbeOutcome;
use colored::Colorize;
use tracing::{error, warn};

/// Per-call cap on fingerprint matches handed back by the rule engine.
const MAX_FP_MATCHES: usize = 10;

/// Status code colored by display band. Presentation only, never part of
/// control flow.
pub fn colored_status(status_code: u16) -> String {
    let s = status_code.to_string();
    match status_code {
        200..=299 => s.green().to_string(),
        300..=399 => s.yellow().to_string(),
        400..=499 => s.red().to_string(),
        500..=599 => s.yellow().bold().to_string(),
        _ => s,
    }
}

/// Build the probe outcome for a successful response and push it onto the
/// result channel. The send blocks until the aggregator accepts it, which is
/// the sweep's backpressure against consumer lag.
pub async fn enrich_and_emit(ctx: &ProbeContext, url: &str, resp: HttpResponse, latency_ms: u64) {
    let body = resp.text();
    let title = resp.title();
    let content_length = resp.content_length();
    let status_code = resp.status_code;

    // Best-effort: a favicon failure degrades to hash 0, never fails the probe.
    let favicon_hash = favicon::fetch_favicon_hash(&ctx.http, url, &body).await;

    // Loopback URLs are classified non-internal, which suppresses
    // internal-only advisories for them.
    let is_internal = !(url.contains("127.0.0.1") || url.contains("localhost"));

    let fingerprints = ctx
        .fp_engine
        .run_fp_reqs(url, &body, MAX_FP_MATCHES, favicon_hash);

    let mut advisories = Vec::new();
    for fp in &fingerprints {
        let version = fp.version.as_deref().unwrap_or("");
        match ctx.adv_engine.get_advisories(&fp.name, version, is_internal) {
            Ok(ads) => advisories.extend(ads),
            // Partial enrichment beats dropping the whole result.
            Err(e) => error!(component = %fp.name, error = %e, "advisory lookup failed"),
        }
    }

    let outcome = ProbeOutcome {
        url: url.to_string(),
        status_code,
        content_length,
        title,
        latency_ms,
        fingerprints,
        advisories,
    };
    if ctx.results.send(outcome).await.is_err() {
        warn!(url = %url, "result channel closed before outcome could be delivered");
    }
}

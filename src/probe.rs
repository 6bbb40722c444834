use crate::advisory::AdvisoryEngine;
use crate::enrich;
use crate::fingerprint::FingerprintEngine;
use crate::http::{HttpClient, HttpResponse};
use crate::ratelimit::RateLimiter;
use crate::store::TargetStore;
use crate::types::{ProbeOutcome, ScanCallback, ScanEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

/// Monotone completed-target counter against a fixed total, reported through
/// the optional observer callback. Multiple worker tasks report in parallel,
/// hence the atomic.
pub struct Progress {
    current: AtomicU64,
    total: u64,
    callback: Option<ScanCallback>,
}

impl Progress {
    pub fn new(total: u64, callback: Option<ScanCallback>) -> Self {
        Self {
            current: AtomicU64::new(0),
            total,
            callback,
        }
    }

    pub fn emit_start(&self) {
        if let Some(cb) = &self.callback {
            cb(ScanEvent::Progress {
                current: 0,
                total: self.total,
            });
        }
    }

    /// Record one finished target (probed or abandoned) and notify.
    pub fn complete(&self) {
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(cb) = &self.callback {
            cb(ScanEvent::Progress {
                current,
                total: self.total,
            });
        }
    }
}

/// Everything a probe task needs, shared read-only across the worker pool.
pub struct ProbeContext {
    pub http: HttpClient,
    pub limiter: RateLimiter,
    pub fp_engine: FingerprintEngine,
    pub adv_engine: AdvisoryEngine,
    pub results: mpsc::Sender<ProbeOutcome>,
    pub progress: Progress,
}

/// Drain the target store: one task per target, bounded by a worker pool the
/// size of the rate limit, each attempt gated by the token bucket. Individual
/// target failures are absorbed; the sweep always runs every target.
pub async fn run_sweep(ctx: Arc<ProbeContext>, store: TargetStore, concurrency: usize) {
    let sem = Arc::new(Semaphore::new(concurrency.clamp(1, 5_000)));
    let mut set = JoinSet::new();

    for target in store.into_keys() {
        let permit = sem.clone().acquire_owned().await.expect("semaphore open");
        let ctx = ctx.clone();
        set.spawn(async move {
            let _permit = permit;
            if target.starts_with("http://") || target.starts_with("https://") {
                probe_direct(&ctx, &target, true).await;
            } else {
                probe_host(&ctx, &target).await;
            }
            ctx.progress.complete();
        });
    }

    while set.join_next().await.is_some() {}
}

/// One rate-limited network attempt with wall-clock latency.
async fn fetch(ctx: &ProbeContext, url: &str) -> Option<(HttpResponse, u64)> {
    ctx.limiter.acquire().await;
    let start = Instant::now();
    match ctx.http.get(url, None).await {
        Ok(resp) => Some((resp, start.elapsed().as_millis() as u64)),
        Err(e) => {
            debug!(url = %url, error = %e, "probe attempt failed");
            None
        }
    }
}

/// Probe a bare host: plain HTTP first, one HTTPS retry on any network-level
/// failure, then give up silently. An unreachable target produces no output.
async fn probe_host(ctx: &ProbeContext, host: &str) {
    for scheme in ["http", "https"] {
        let url = format!("{scheme}://{host}");
        if let Some((resp, latency_ms)) = fetch(ctx, &url).await {
            handle_response(ctx, &url, resp, latency_ms, true).await;
            return;
        }
    }
}

/// Probe a fully qualified URL: single attempt, no scheme fallback.
async fn probe_direct(ctx: &ProbeContext, url: &str, follow_redirect: bool) {
    if let Some((resp, latency_ms)) = fetch(ctx, url).await {
        handle_response(ctx, url, resp, latency_ms, follow_redirect).await;
    }
}

/// Enrich and emit the response; a 3xx additionally triggers one follow-up
/// probe of its Location, reported as a separate finding. The follow-up never
/// chases a second redirect. The destination is not deduplicated against
/// already-visited targets.
async fn handle_response(
    ctx: &ProbeContext,
    url: &str,
    resp: HttpResponse,
    latency_ms: u64,
    follow_redirect: bool,
) {
    let redirect_to = if follow_redirect && (300..400).contains(&resp.status_code) {
        resolve_location(url, resp.header("location"))
    } else {
        None
    };

    enrich::enrich_and_emit(ctx, url, resp, latency_ms).await;

    if let Some(location) = redirect_to {
        debug!(from = %url, to = %location, "following redirect one hop");
        if let Some((resp, latency_ms)) = fetch(ctx, &location).await {
            enrich::enrich_and_emit(ctx, &location, resp, latency_ms).await;
        }
    }
}

/// Join a possibly-relative Location header against the responding URL.
fn resolve_location(base: &str, location: Option<&str>) -> Option<String> {
    let location = location?.trim();
    if location.is_empty() {
        return None;
    }
    match Url::parse(base) {
        Ok(base) => base.join(location).ok().map(Into::into),
        Err(_) => Some(location.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn location_resolution_handles_relative_paths() {
        assert_eq!(
            resolve_location("http://10.0.0.1/", Some("/login")),
            Some("http://10.0.0.1/login".to_string())
        );
        assert_eq!(
            resolve_location("http://10.0.0.1/", Some("https://other.example/")),
            Some("https://other.example/".to_string())
        );
        assert_eq!(resolve_location("http://10.0.0.1/", None), None);
        assert_eq!(resolve_location("http://10.0.0.1/", Some("  ")), None);
    }

    #[test]
    fn progress_is_monotone_and_bounded() {
        let seen: Arc<Mutex<Vec<(u64, u64)>>> = Arc::default();
        let sink = seen.clone();
        let cb: ScanCallback = Arc::new(move |ev| {
            if let ScanEvent::Progress { current, total } = ev {
                sink.lock().unwrap().push((current, total));
            }
        });
        let progress = Progress::new(3, Some(cb));
        progress.emit_start();
        for _ in 0..3 {
            progress.complete();
        }
        let events = seen.lock().unwrap();
        let currents: Vec<u64> = events.iter().map(|(c, _)| *c).collect();
        assert_eq!(currents, vec![0, 1, 2, 3]);
        assert!(events.iter().all(|&(c, t)| c <= t && t == 3));
    }
}

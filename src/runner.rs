use crate::advisory::AdvisoryEngine;
use crate::aggregate::{self, AggregatorConfig};
use crate::ai::AiOptions;
use crate::fingerprint::FingerprintEngine;
use crate::http::{HttpClient, HttpOptions};
use crate::localscan;
use crate::probe::{self, ProbeContext, Progress};
use crate::ratelimit::RateLimiter;
use crate::score;
use crate::store::TargetStore;
use crate::targets;
use crate::types::{Advisory, RunSummary, ScanCallback, ScanEvent};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Capacity of the result channel. Kept small so producers block on the
/// aggregator rather than buffering unboundedly.
const RESULT_CHANNEL_CAPACITY: usize = 1;

/// Everything the embedding caller configures for one scan run.
#[derive(Clone)]
pub struct RunnerOptions {
    pub targets: Vec<String>,
    pub target_file: Option<PathBuf>,
    pub local_scan: bool,
    /// Requests per second; also sizes the worker pool.
    pub rate_limit: usize,
    pub timeout_secs: u64,
    pub proxy: Option<String>,
    pub headers: Vec<(String, String)>,
    pub output: Option<PathBuf>,
    pub fp_templates: PathBuf,
    pub adv_templates: PathBuf,
    /// Empty for the native advisory set, `en` for the English variant.
    pub language: String,
    pub ai: Option<AiOptions>,
    pub callback: Option<ScanCallback>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            target_file: None,
            local_scan: false,
            rate_limit: 100,
            timeout_secs: 10,
            proxy: None,
            headers: Vec::new(),
            output: None,
            fp_templates: PathBuf::from("data/fingerprints"),
            adv_templates: PathBuf::from("data/vuln"),
            language: String::new(),
            ai: None,
            callback: None,
        }
    }
}

/// One fingerprint rule with its known advisories, for the component listing.
pub struct FpInfo {
    pub name: String,
    pub desc: String,
    pub advisories: Vec<Advisory>,
}

/// Owns every long-lived piece of a scan run: target store, transport,
/// fingerprint and advisory engines. Construction is staged (storage, target
/// ingestion, transport, fingerprints, advisories) and any stage failure
/// aborts with context.
pub struct Runner {
    options: RunnerOptions,
    store: TargetStore,
    total: u64,
    http: HttpClient,
    fp_engine: FingerprintEngine,
    adv_engine: AdvisoryEngine,
}

impl Runner {
    pub async fn new(options: RunnerOptions) -> Result<Self> {
        let mut store = TargetStore::new();

        targets::add_target_list(&mut store, &options.targets);
        if let Some(file) = &options.target_file {
            targets::add_targets_from_file(&mut store, file)?;
        }
        if options.local_scan {
            let open = localscan::local_open_ports()
                .await
                .context("local port discovery failed")?;
            info!(count = open.len(), "local open ports tagged");
            for target in open {
                store.add(target);
            }
        }
        let total = store.count() as u64;
        if total > 0 {
            info!(targets = total, "targets loaded");
        }

        let http = HttpClient::new(&HttpOptions {
            timeout: Duration::from_secs(options.timeout_secs),
            proxy: options.proxy.clone(),
            custom_headers: options.headers.clone(),
        })
        .context("transport setup failed")?;

        let fp_engine = FingerprintEngine::load(&options.fp_templates)
            .context("fingerprint engine load failed")?;
        info!(rules = fp_engine.fps().len(), "fingerprint rules loaded");

        let adv_engine = AdvisoryEngine::load(&options.adv_templates, &options.language)
            .context("advisory engine load failed")?;
        info!(advisories = adv_engine.count(), "advisory database loaded");

        Ok(Self {
            options,
            store,
            total,
            http,
            fp_engine,
            adv_engine,
        })
    }

    pub fn target_count(&self) -> u64 {
        self.total
    }

    /// Run the full sweep to completion and score the results. Consumes the
    /// runner: the target store and result stream are drained exactly once.
    pub async fn run(self) -> Result<RunSummary> {
        if self.store.is_empty() {
            bail!("no targets to scan (see --help for target sources)");
        }

        let progress = Progress::new(self.total, self.options.callback.clone());
        progress.emit_start();

        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let aggregator = tokio::spawn(aggregate::run_aggregator(
            rx,
            AggregatorConfig {
                output_path: self.options.output.clone(),
                callback: self.options.callback.clone(),
                ai: self.options.ai.clone(),
            },
        ));

        let ctx = Arc::new(ProbeContext {
            http: self.http,
            limiter: RateLimiter::new(self.options.rate_limit),
            fp_engine: self.fp_engine,
            adv_engine: self.adv_engine,
            results: tx,
            progress,
        });

        let start = Instant::now();
        probe::run_sweep(ctx.clone(), self.store, self.options.rate_limit).await;
        // Last sender lives inside the context; dropping it closes the stream
        // so the aggregator can finish.
        drop(ctx);

        let results = aggregator.await.context("result aggregator panicked")?;
        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            results = results.len(),
            "sweep finished"
        );

        let summary = score::calc_sec_score(&results);
        if let Some(cb) = &self.options.callback {
            cb(ScanEvent::Report(summary.clone()));
        }
        Ok(summary)
    }

    /// Release transport and store handles without running a sweep. A runner
    /// that has been `run()` is torn down by the move instead.
    pub fn close(self) {
        drop(self);
    }

    /// Every loaded fingerprint with its matching advisories.
    pub fn fp_and_vul_list(&self) -> Vec<FpInfo> {
        let mut infos = Vec::new();
        for rule in self.fp_engine.fps() {
            match self.adv_engine.get_advisories(&rule.name, "", false) {
                Ok(advisories) => infos.push(FpInfo {
                    name: rule.name.clone(),
                    desc: rule.desc.clone(),
                    advisories,
                }),
                Err(e) => warn!(component = %rule.name, error = %e, "advisory listing failed"),
            }
        }
        infos
    }

    /// Render the component/advisory listing as a table on stdout.
    pub fn show_fp_and_vul_list(&self) {
        let rows: Vec<[String; 3]> = self
            .fp_and_vul_list()
            .into_iter()
            .map(|info| {
                [
                    info.name,
                    info.desc,
                    info.advisories.len().to_string(),
                ]
            })
            .collect();
        println!("Component list:");
        println!(
            "{}",
            aggregate::render_table(&["Component", "Description", "Vulnerabilities"], &rows)
        );
    }
}

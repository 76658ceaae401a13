// src/ingest/mod.rs
//! Windowed ingestion pipeline.
//!
//! Per window: fetch -> decode -> extract -> [distance filter] -> serialize -> persist.
//! Windows are admitted through a fixed-size semaphore; a failure in any stage
//! is recorded against its window and never stops the run.

pub mod csv;
pub mod distance;
pub mod extract;
pub mod fetch;
pub mod types;
pub mod window;
pub mod xml;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Mode, PipelineConfig};
use crate::error::{Error, Result};
use crate::ingest::csv::CsvLayout;
use crate::ingest::distance::DistanceFilter;
use crate::ingest::extract::Extractor;
use crate::ingest::fetch::{fetch_with_retry, Fetcher, HttpFetcher, RequestPacer, RetryPolicy};
use crate::ingest::types::{FetchOutcome, OutputRecord, SeismicEvent};
use crate::ingest::window::TimeWindow;
use crate::ingest::xml::{DocumentTree, Schema};

pub const ERROR_LOG_NAME: &str = "error.log";

/// One-time metrics registration (so series show up in the exposition).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_windows_succeeded_total",
            "Windows whose file was written."
        );
        describe_counter!(
            "ingest_windows_failed_total",
            "Windows that failed in some stage."
        );
        describe_counter!(
            "ingest_events_extracted_total",
            "Events extracted and written."
        );
        describe_counter!(
            "ingest_events_skipped_total",
            "Events dropped because a field could not be extracted."
        );
        describe_counter!(
            "ingest_fetch_errors_total",
            "Failed HTTP attempts, retries included."
        );
        describe_histogram!("ingest_fetch_ms", "Fetch time in milliseconds.");
        describe_histogram!("ingest_decode_ms", "XML decode time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when the pipeline last finished.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Decode,
    Extract,
    Persist,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Decode => "decode",
            Stage::Extract => "extract",
            Stage::Persist => "persist",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last stage a window entered; read back when its task panics.
#[derive(Debug, Default)]
struct StageCell(AtomicU8);

impl StageCell {
    fn set(&self, stage: Stage) {
        self.0.store(stage as u8, Ordering::Relaxed);
    }

    fn get(&self) -> Stage {
        match self.0.load(Ordering::Relaxed) {
            0 => Stage::Fetch,
            1 => Stage::Decode,
            2 => Stage::Extract,
            _ => Stage::Persist,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Generating,
    FetchingWindows,
    Done,
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSuccess {
    pub window: TimeWindow,
    pub path: PathBuf,
    pub events_written: usize,
    pub events_skipped: usize,
    pub events_filtered: usize,
}

#[derive(Debug)]
pub struct WindowFailure {
    pub window: TimeWindow,
    pub stage: Stage,
    pub error: Error,
}

/// End-of-run report.
#[derive(Debug)]
pub struct RunSummary {
    pub state: RunState,
    pub windows_succeeded: usize,
    pub windows_failed: usize,
    /// Windows never started because the run was cancelled.
    pub windows_not_admitted: usize,
    pub events_extracted: usize,
    pub events_skipped: usize,
    /// Events dropped by the distance filter (feed mode only).
    pub events_filtered: usize,
    pub written: Vec<PathBuf>,
    pub failures: Vec<WindowFailure>,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
            windows_succeeded: 0,
            windows_failed: 0,
            windows_not_admitted: 0,
            events_extracted: 0,
            events_skipped: 0,
            events_filtered: 0,
            written: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn record(&mut self, outcome: std::result::Result<WindowSuccess, (WindowFailure, usize)>) {
        match outcome {
            Ok(ok) => {
                self.windows_succeeded += 1;
                self.events_extracted += ok.events_written;
                self.events_skipped += ok.events_skipped;
                self.events_filtered += ok.events_filtered;
                self.written.push(ok.path);
                counter!("ingest_windows_succeeded_total").increment(1);
                counter!("ingest_events_extracted_total").increment(ok.events_written as u64);
                counter!("ingest_events_skipped_total").increment(ok.events_skipped as u64);
            }
            Err((failure, skipped)) => {
                self.windows_failed += 1;
                self.events_skipped += skipped;
                self.failures.push(failure);
                counter!("ingest_windows_failed_total").increment(1);
                counter!("ingest_events_skipped_total").increment(skipped as u64);
            }
        }
    }

    /// Human-readable report: counts, then one line per failed window.
    pub fn render(&self) -> String {
        let mut out = format!(
            "windows succeeded: {}, windows failed: {}, events extracted: {}, events skipped: {}",
            self.windows_succeeded, self.windows_failed, self.events_extracted, self.events_skipped
        );
        if self.events_filtered > 0 {
            out.push_str(&format!(", events outside radius: {}", self.events_filtered));
        }
        if self.windows_not_admitted > 0 {
            out.push_str(&format!(
                ", windows not started (cancelled): {}",
                self.windows_not_admitted
            ));
        }
        out.push('\n');
        for line in self.failure_lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    fn failure_lines(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|f| format!("{} stage={} error={}", f.window, f.stage, f.error))
            .collect()
    }
}

/// Everything a window task needs; cheap to clone into a spawned task.
#[derive(Clone)]
struct WindowCtx {
    fetcher: Arc<dyn Fetcher>,
    pacer: Arc<RequestPacer>,
    retry: RetryPolicy,
    layout: CsvLayout,
    summary: Arc<Mutex<RunSummary>>,
}

#[derive(Debug, Clone)]
struct WindowJob {
    window: TimeWindow,
    url: String,
    extractor: Extractor,
    filter: Option<DistanceFilter>,
    path: PathBuf,
    progress: Arc<StageCell>,
}

pub struct Orchestrator {
    cfg: Arc<PipelineConfig>,
    fetcher: Arc<dyn Fetcher>,
    pacer: Arc<RequestPacer>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Validates `cfg` and builds the reqwest fetcher from it.
    pub fn new(cfg: PipelineConfig) -> Result<Self> {
        cfg.validate()?;
        let fetcher = Arc::new(HttpFetcher::new(cfg.request_timeout())?);
        Self::with_fetcher(cfg, fetcher)
    }

    pub fn with_fetcher(cfg: PipelineConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        cfg.validate()?;
        let pacer = Arc::new(RequestPacer::new(cfg.min_request_interval()));
        Ok(Self {
            cfg: Arc::new(cfg),
            fetcher,
            pacer,
            cancel: CancellationToken::new(),
        })
    }

    /// Cancelling stops admission of new windows; in-flight ones finish or time out.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub async fn run(&self) -> Result<RunSummary> {
        match self.cfg.mode {
            Mode::Catalog => self.run_catalog().await,
            Mode::AtomFeed => self.run_feed().await,
        }
    }

    /// Date-range run over the catalog service, one file per window.
    pub async fn run_catalog(&self) -> Result<RunSummary> {
        ensure_metrics_described();
        let cfg = &self.cfg;
        let summary = Arc::new(Mutex::new(RunSummary::new()));

        set_state(&summary, RunState::Generating);
        let mut windows = window::generate(cfg.start_date, cfg.end_date, cfg.window_hours)?;
        prepare_output_dir(&cfg.output_dir).await?;

        set_state(&summary, RunState::FetchingWindows);
        let ctx = self.window_ctx(&summary);
        let limiter = Arc::new(Semaphore::new(cfg.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, (TimeWindow, Arc<StageCell>)> = HashMap::new();
        let extractor = Extractor::new(Schema::CatalogEvents);

        while let Some(w) = windows.next() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                p = limiter.clone().acquire_owned() => p.ok(),
            };
            let Some(permit) = permit else {
                let remaining = 1 + windows.by_ref().count();
                warn!(target: "ingest", remaining, "run cancelled, not admitting further windows");
                lock(&summary).windows_not_admitted += remaining;
                break;
            };

            let progress = Arc::new(StageCell::default());
            let job = WindowJob {
                window: w,
                url: fetch::catalog_url(&cfg.base_url, &w),
                extractor,
                filter: None,
                path: cfg.output_dir.join(w.file_name()),
                progress: progress.clone(),
            };
            let ctx = ctx.clone();
            let handle = tasks.spawn(async move {
                run_window(&ctx, job).await;
                // outcome is recorded before the permit frees the next slot
                drop(permit);
            });
            in_flight.insert(handle.id(), (w, progress));
        }

        while let Some(res) = tasks.join_next_with_id().await {
            match res {
                Ok((id, ())) => {
                    in_flight.remove(&id);
                }
                Err(e) => {
                    let Some((window, progress)) = in_flight.remove(&e.id()) else {
                        error!(target: "ingest", error = %e, "unknown window task failed");
                        continue;
                    };
                    let stage = progress.get();
                    error!(
                        target: "ingest",
                        window_start = %window.start_iso(),
                        window_end = %window.end_iso(),
                        stage = %stage,
                        error = %e,
                        "window task panicked"
                    );
                    lock(&summary).record(Err((
                        WindowFailure {
                            window,
                            stage,
                            error: Error::Panicked(e.to_string()),
                        },
                        0,
                    )));
                }
            }
        }

        Ok(self.finish(summary).await)
    }

    /// Single snapshot of the Atom-geo feed, distance filtered and ranked.
    pub async fn run_feed(&self) -> Result<RunSummary> {
        self.run_feed_at(Utc::now()).await
    }

    /// Like [`run_feed`](Self::run_feed) with an explicit snapshot time.
    pub async fn run_feed_at(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        ensure_metrics_described();
        let cfg = &self.cfg;
        let summary = Arc::new(Mutex::new(RunSummary::new()));

        set_state(&summary, RunState::Generating);
        let end = now - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos()));
        let start = end
            .checked_sub_signed(Duration::hours(i64::from(cfg.atom_feed_span_hours)))
            .ok_or_else(|| {
                Error::config(
                    format!(
                        "atom_feed_span_hours {} reaches past the representable time range",
                        cfg.atom_feed_span_hours
                    ),
                    "atom_feed_span_hours",
                )
            })?;
        let window = TimeWindow { start, end };
        prepare_output_dir(&cfg.output_dir).await?;

        set_state(&summary, RunState::FetchingWindows);
        if self.cancel.is_cancelled() {
            lock(&summary).windows_not_admitted += 1;
        } else {
            let job = WindowJob {
                window,
                url: cfg.atom_feed_url.clone(),
                extractor: Extractor::new(Schema::AtomGeoFeed)
                    .with_title_magnitude_word(cfg.title_magnitude_word),
                filter: Some(DistanceFilter::new(
                    cfg.reference_point,
                    cfg.distance_radius_km,
                )),
                path: cfg.output_dir.join(format!("atom_{}", window.file_name())),
                progress: Arc::new(StageCell::default()),
            };
            run_window(&self.window_ctx(&summary), job).await;
        }

        Ok(self.finish(summary).await)
    }

    fn window_ctx(&self, summary: &Arc<Mutex<RunSummary>>) -> WindowCtx {
        WindowCtx {
            fetcher: self.fetcher.clone(),
            pacer: self.pacer.clone(),
            retry: RetryPolicy {
                max_retries: self.cfg.max_retries,
                backoff: self.cfg.retry_backoff(),
            },
            layout: CsvLayout {
                time_column: self.cfg.csv_time_column,
            },
            summary: summary.clone(),
        }
    }

    async fn finish(&self, summary: Arc<Mutex<RunSummary>>) -> RunSummary {
        // every window task has been joined at this point
        let mut summary = std::mem::replace(&mut *lock(&summary), RunSummary::new());
        summary.state = if self.cancel.is_cancelled() {
            RunState::Aborted
        } else {
            RunState::Done
        };

        if self.cfg.error_log {
            let path = self.cfg.output_dir.join(ERROR_LOG_NAME);
            if summary.failures.is_empty() {
                // a clean rerun must not leave an earlier run's failures behind
                match tokio::fs::remove_file(&path).await {
                    Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                        warn!(target: "ingest", error = %e, "could not remove stale error log");
                    }
                    _ => {}
                }
            } else {
                let mut text = summary.failure_lines().join("\n");
                text.push('\n');
                if let Err(e) = csv::write_atomic(&path, &text).await {
                    warn!(target: "ingest", error = %e, "could not write error log");
                }
            }
        }

        gauge!("ingest_last_run_ts").set(Utc::now().timestamp() as f64);
        info!(
            target: "ingest",
            state = ?summary.state,
            succeeded = summary.windows_succeeded,
            failed = summary.windows_failed,
            extracted = summary.events_extracted,
            skipped = summary.events_skipped,
            "run finished"
        );
        summary
    }
}

fn lock(summary: &Mutex<RunSummary>) -> std::sync::MutexGuard<'_, RunSummary> {
    summary.lock().unwrap_or_else(|p| p.into_inner())
}

fn set_state(summary: &Mutex<RunSummary>, state: RunState) {
    debug!(target: "ingest", ?state, "run state");
    lock(summary).state = state;
}

/// Runs the five stages of one window in order and records the outcome.
async fn run_window(ctx: &WindowCtx, job: WindowJob) {
    let window = job.window;
    let outcome = process_window(ctx, job).await;
    match &outcome {
        Ok(ok) => info!(
            target: "ingest",
            window_start = %window.start_iso(),
            window_end = %window.end_iso(),
            events = ok.events_written,
            skipped = ok.events_skipped,
            path = %ok.path.display(),
            "window saved"
        ),
        Err((f, _)) => warn!(
            target: "ingest",
            window_start = %window.start_iso(),
            window_end = %window.end_iso(),
            stage = %f.stage,
            error = %f.error,
            "window failed"
        ),
    }
    lock(&ctx.summary).record(outcome);
}

async fn process_window(
    ctx: &WindowCtx,
    job: WindowJob,
) -> std::result::Result<WindowSuccess, (WindowFailure, usize)> {
    let window = job.window;
    let progress = job.progress.clone();
    let fail = |stage: Stage, error: Error, skipped: usize| {
        (
            WindowFailure {
                window,
                stage,
                error,
            },
            skipped,
        )
    };

    // Fetch
    let fetched = FetchOutcome {
        window,
        result: fetch_with_retry(ctx.fetcher.as_ref(), &ctx.pacer, &job.url, ctx.retry).await,
    };
    let body = fetched
        .result
        .map_err(|e| fail(Stage::Fetch, e.into(), 0))?;

    // Decode + extract. An empty 2xx body (FDSN answers 204) means no events.
    let (events, skipped) = if body.trim().is_empty() {
        (Vec::new(), 0)
    } else {
        progress.set(Stage::Decode);
        let tree = xml::decode(&body, job.extractor.schema)
            .map_err(|e| fail(Stage::Decode, e.into(), 0))?;
        progress.set(Stage::Extract);
        extract_all(&tree, &job.extractor, &window)
    };

    // Filter
    let (events, filtered) = match job.filter {
        Some(f) => f.apply(events),
        None => (events, 0),
    };

    // Serialize + persist
    progress.set(Stage::Persist);
    let record = OutputRecord {
        window,
        path: job.path,
        events,
    };
    persist(&record, ctx.layout)
        .await
        .map_err(|e| fail(Stage::Persist, e, skipped))?;

    Ok(WindowSuccess {
        window,
        events_written: record.events.len(),
        path: record.path,
        events_skipped: skipped,
        events_filtered: filtered,
    })
}

/// Extract every record independently; failures are logged and counted.
fn extract_all(
    tree: &DocumentTree,
    extractor: &Extractor,
    window: &TimeWindow,
) -> (Vec<SeismicEvent>, usize) {
    let nodes = tree.records();
    let mut events = Vec::with_capacity(nodes.len());
    let mut skipped = 0usize;
    for (index, node) in nodes.into_iter().enumerate() {
        match extractor.extract(node) {
            Ok(ev) => events.push(ev),
            Err(e) => {
                skipped += 1;
                warn!(
                    target: "ingest",
                    window_start = %window.start_iso(),
                    window_end = %window.end_iso(),
                    stage = %Stage::Extract,
                    index,
                    field = e.field,
                    error = %e,
                    "event skipped"
                );
            }
        }
    }
    (events, skipped)
}

async fn persist(record: &OutputRecord, layout: CsvLayout) -> Result<()> {
    let text = csv::serialize(&record.events, layout);
    csv::write_atomic(&record.path, &text).await
}

/// Create the output dir and prove it is writable. Failure here is fatal.
async fn prepare_output_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        Error::config(
            format!("cannot create output dir {}: {e}", dir.display()),
            "output_dir",
        )
    })?;
    let marker = dir.join(".write_check");
    csv::write_atomic(&marker, "").await.map_err(|e| {
        Error::config(
            format!("output dir {} is not writable: {e}", dir.display()),
            "output_dir",
        )
    })?;
    let _ = tokio::fs::remove_file(&marker).await;
    Ok(())
}

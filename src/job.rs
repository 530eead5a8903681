//! Job tracker: runs the four-step forensic pipeline for many requests at once.
//!
//! ```text
//! submit(owner, bytes) ──▶ registry ──▶ worker permit ──▶ run
//!                                                        │
//!   metadata           spawn_blocking(Cascade::run)      │
//!   geolocation        GeoService::resolve (if coords)   │ ProgressLedger
//!   location_analysis  notes only                        │ (throttled renders)
//!   manipulation_check spawn_blocking(ela::analyze)      │
//!                                                        ▼
//!                        ForensicReport ──▶ ReportSink ──▶ final render
//! ```
//!
//! Each job is one tokio task admitted through a semaphore sized by
//! [`ForensicsConfig::workers`]. CPU-heavy decoding runs on the blocking pool
//! so a large image never stalls other jobs' network waits.
//!
//! Stage problems degrade (empty metadata, sentinel address, no ELA report).
//! Only contract violations end a job early: a step out of order, an unknown
//! job id, a report the sink refuses. Those are reported once through
//! [`crate::progress::JobProgressCallback::on_job_failed`] and no report is
//! produced.

use crate::config::ForensicsConfig;
use crate::error::ForensicsError;
use crate::output::{Extraction, ForensicReport, JobStats};
use crate::pipeline::extract::Cascade;
use crate::pipeline::geo::GeoService;
use crate::pipeline::{ela, input};
use crate::progress::{ProgressCallback, ProgressLedger, Step};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receives finished reports (the report renderer, a chat front-end, ...).
pub trait ReportSink: Send + Sync {
    fn deliver(
        &self,
        report: &ForensicReport,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl ReportSink for mpsc::UnboundedSender<ForensicReport> {
    fn deliver(
        &self,
        report: &ForensicReport,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.send(report.clone()).map_err(|e| e.to_string().into())
    }
}

/// Registry entry of a job that has not finished yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub job_id: u64,
    pub owner: String,
    /// False while waiting for a worker permit.
    pub running: bool,
}

/// Handle to a submitted job.
pub struct JobHandle {
    pub job_id: u64,
    handle: JoinHandle<Result<(), ForensicsError>>,
}

impl JobHandle {
    /// Wait until the report was delivered or the job failed.
    pub async fn wait(self) -> Result<(), ForensicsError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(ForensicsError::WorkerFailed {
                job_id: self.job_id,
                detail: e.to_string(),
            }),
        }
    }
}

pub struct JobTracker {
    config: Arc<ForensicsConfig>,
    cascade: Arc<Cascade>,
    geo: Option<Arc<GeoService>>,
    callback: ProgressCallback,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
    registry: Mutex<HashMap<u64, JobInfo>>,
}

impl JobTracker {
    /// Build a tracker around an existing geo service (or none, to skip
    /// reverse geocoding).
    pub fn new(
        config: ForensicsConfig,
        geo: Option<Arc<GeoService>>,
        callback: ProgressCallback,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.workers.max(1)));
        Self {
            config: Arc::new(config),
            cascade: Arc::new(Cascade::standard()),
            geo,
            callback,
            permits,
            next_id: AtomicU64::new(1),
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Build a tracker with the HTTP geocoders, unless `config.geocoding` is off.
    pub fn from_config(
        config: ForensicsConfig,
        callback: ProgressCallback,
    ) -> Result<Self, ForensicsError> {
        let geo = if config.geocoding {
            Some(Arc::new(GeoService::from_config(&config)?))
        } else {
            None
        };
        Ok(Self::new(config, geo, callback))
    }

    /// Replace the extraction cascade.
    pub fn with_cascade(mut self, cascade: Cascade) -> Self {
        self.cascade = Arc::new(cascade);
        self
    }

    pub fn config(&self) -> &ForensicsConfig {
        &self.config
    }

    /// Jobs registered and not yet finished, by id.
    pub fn active_jobs(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self.registry().values().cloned().collect();
        jobs.sort_by_key(|j| j.job_id);
        jobs
    }

    pub fn status(&self, job_id: u64) -> Result<JobInfo, ForensicsError> {
        self.registry()
            .get(&job_id)
            .cloned()
            .ok_or(ForensicsError::UnknownJob { job_id })
    }

    /// Run one job to completion and return its report.
    pub async fn analyze(
        &self,
        owner: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<ForensicReport, ForensicsError> {
        let job_id = self.register(owner.into());
        self.execute(job_id, bytes, None).await
    }

    /// Spawn a job; its report goes to `sink`.
    pub fn submit(
        self: &Arc<Self>,
        owner: impl Into<String>,
        bytes: Vec<u8>,
        sink: Arc<dyn ReportSink>,
    ) -> JobHandle {
        let job_id = self.register(owner.into());
        let tracker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tracker
                .execute(job_id, bytes, Some(sink))
                .await
                .map(|_| ())
        });
        JobHandle { job_id, handle }
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<u64, JobInfo>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, owner: String) -> u64 {
        let job_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("Job {job_id} registered for {owner}");
        self.registry().insert(
            job_id,
            JobInfo {
                job_id,
                owner,
                running: false,
            },
        );
        job_id
    }

    fn mark_running(&self, job_id: u64) -> Result<String, ForensicsError> {
        let mut registry = self.registry();
        let info = registry
            .get_mut(&job_id)
            .ok_or(ForensicsError::UnknownJob { job_id })?;
        info.running = true;
        Ok(info.owner.clone())
    }

    fn forget(&self, job_id: u64) {
        self.registry().remove(&job_id);
    }

    async fn execute(
        &self,
        job_id: u64,
        bytes: Vec<u8>,
        sink: Option<Arc<dyn ReportSink>>,
    ) -> Result<ForensicReport, ForensicsError> {
        let registration = Registration {
            tracker: self,
            job_id,
        };
        let result = self.run(job_id, bytes, sink.as_deref()).await;
        drop(registration);
        if let Err(e) = &result {
            error!("Job {job_id} failed: {e}");
            self.callback.on_job_failed(job_id, e);
        }
        result
    }

    async fn run(
        &self,
        job_id: u64,
        bytes: Vec<u8>,
        sink: Option<&dyn ReportSink>,
    ) -> Result<ForensicReport, ForensicsError> {
        input::check_size(bytes.len() as u64, self.config.max_input_bytes)?;

        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ForensicsError::Internal("worker pool closed".into()))?;
        let owner = self.mark_running(job_id)?;
        info!("Job {job_id}: analysing {} bytes for {owner}", bytes.len());

        let total = Instant::now();
        let bytes: Arc<[u8]> = bytes.into();
        let mut stats = JobStats::default();
        let mut ledger = ProgressLedger::start(
            job_id,
            self.config.progress_cooldown(),
            self.config.throttle_policy,
            Arc::clone(&self.callback),
        );

        // ── Step 1: Metadata ─────────────────────────────────────────────
        ledger.begin(Step::Metadata, "Extracting data...").await?;
        let started = Instant::now();
        let extracted = {
            let cascade = Arc::clone(&self.cascade);
            let bytes = Arc::clone(&bytes);
            tokio::task::spawn_blocking(move || cascade.run(&bytes)).await
        };
        stats.metadata_ms = elapsed_ms(started);
        let extraction = match extracted {
            Ok(extraction) => {
                let note = format!("Found {} entries", extraction.entry_count);
                ledger.complete(Step::Metadata, &note).await?;
                extraction
            }
            Err(e) => {
                warn!("Job {job_id}: metadata worker failed: {e}");
                ledger.fail(Step::Metadata, "Extraction failed").await?;
                Extraction::default()
            }
        };
        let coordinates = extraction.coordinates;

        // ── Step 2: Geolocation ──────────────────────────────────────────
        ledger
            .begin(Step::Geolocation, "Searching for coordinates...")
            .await?;
        let started = Instant::now();
        let geo = match (coordinates, &self.geo) {
            (Some(c), Some(service)) => Some(service.resolve(c).await),
            _ => None,
        };
        stats.geolocation_ms = elapsed_ms(started);
        let note = if coordinates.is_some() {
            "Coordinates found"
        } else {
            "No GPS data"
        };
        ledger.complete(Step::Geolocation, note).await?;

        // ── Step 3: Location analysis ────────────────────────────────────
        ledger.begin(Step::LocationAnalysis, "Processing...").await?;
        let note = if coordinates.is_some() {
            "Data received"
        } else {
            "Coordinates required"
        };
        ledger.complete(Step::LocationAnalysis, note).await?;

        // ── Step 4: Manipulation check ───────────────────────────────────
        ledger
            .begin(Step::ManipulationCheck, "Running ELA...")
            .await?;
        let started = Instant::now();
        let analysed = {
            let config = Arc::clone(&self.config);
            let bytes = Arc::clone(&bytes);
            tokio::task::spawn_blocking(move || ela::analyze(&bytes, &config)).await
        };
        stats.manipulation_ms = elapsed_ms(started);
        let manipulation = match analysed {
            Ok(Some(report)) => {
                ledger
                    .complete(Step::ManipulationCheck, report.verdict())
                    .await?;
                Some(report)
            }
            Ok(None) => {
                ledger
                    .complete(Step::ManipulationCheck, "Analysis not performed")
                    .await?;
                None
            }
            Err(e) => {
                warn!("Job {job_id}: ELA worker failed: {e}");
                ledger
                    .fail(Step::ManipulationCheck, "Analysis not performed")
                    .await?;
                None
            }
        };
        stats.total_ms = elapsed_ms(total);

        // ── Assemble & hand off ──────────────────────────────────────────
        let report = ForensicReport {
            job_id,
            owner,
            metadata: extraction.metadata,
            entry_count: extraction.entry_count,
            lat: coordinates.map(|c| c.lat),
            lon: coordinates.map(|c| c.lon),
            address: geo.as_ref().map(|g| g.address.clone()),
            landmark: geo.map(|g| g.landmark),
            manipulation,
            stats,
        };

        if let Some(sink) = sink {
            sink.deliver(&report)
                .map_err(|e| ForensicsError::DeliveryFailed {
                    job_id,
                    reason: e.to_string(),
                })?;
        }
        ledger.finish()?;

        info!(
            "Job {job_id} complete: {} entries, coordinates {}, {}ms",
            report.entry_count,
            if report.lat.is_some() { "yes" } else { "no" },
            report.stats.total_ms
        );
        Ok(report)
    }
}

/// Removes the job from the registry on every exit path, including a
/// panicking worker or a dropped `analyze` future.
struct Registration<'a> {
    tracker: &'a JobTracker,
    job_id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.tracker.forget(self.job_id);
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

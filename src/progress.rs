//! Per-job progress ledger with throttled propagation.
//!
//! Every job walks the same four steps in a fixed order:
//!
//! ```text
//! metadata ─▶ geolocation ─▶ location_analysis ─▶ manipulation_check ─▶ finish
//! ```
//!
//! Each step is `pending → running → done | failed`. The [`ProgressLedger`]
//! records every transition, renders the whole job as one status text and
//! offers it to a [`JobProgressCallback`]. Propagation goes through a
//! [`Throttle`]: an update is forwarded only when the text changed and at least
//! the cooldown has passed since the last forwarded one. Updates inside the
//! cooldown are not queued; the ledger still holds them, so the next forwarded
//! text shows the latest state. The final render on [`ProgressLedger::finish`]
//! bypasses the cooldown.
//!
//! # Example
//!
//! ```rust
//! use edgequake_imgforensics::progress::{JobProgressCallback, ProgressUpdate};
//! use edgequake_imgforensics::ProgressError;
//!
//! struct StderrProgress;
//!
//! impl JobProgressCallback for StderrProgress {
//!     fn render(&self, update: &ProgressUpdate<'_>) -> Result<(), ProgressError> {
//!         eprintln!("job {}:\n{}", update.job_id, update.text);
//!         Ok(())
//!     }
//! }
//! ```

use crate::config::ThrottlePolicy;
use crate::error::{ForensicsError, ProgressError};
use std::fmt;
use std::sync::Arc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, warn};

// ── Steps ────────────────────────────────────────────────────────────────

/// One of the four fixed pipeline steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Step {
    Metadata,
    Geolocation,
    LocationAnalysis,
    ManipulationCheck,
}

impl Step {
    pub const ALL: [Step; 4] = [
        Step::Metadata,
        Step::Geolocation,
        Step::LocationAnalysis,
        Step::ManipulationCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Metadata => "metadata",
            Step::Geolocation => "geolocation",
            Step::LocationAnalysis => "location_analysis",
            Step::ManipulationCheck => "manipulation_check",
        }
    }

    /// Human label used in the status text.
    pub fn label(&self) -> &'static str {
        match self {
            Step::Metadata => "Metadata extraction",
            Step::Geolocation => "Geolocation search",
            Step::LocationAnalysis => "Location analysis",
            Step::ManipulationCheck => "Manipulation check",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Running,
    Done,
    Failed,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Running => "running",
            StepState::Done => "done",
            StepState::Failed => "failed",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            StepState::Pending => "⏳",
            StepState::Running => "🔄",
            StepState::Done => "✅",
            StepState::Failed => "❌",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Done | StepState::Failed)
    }
}

// ── Callback ─────────────────────────────────────────────────────────────

/// One propagated render.
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate<'a> {
    pub job_id: u64,
    /// The step whose transition triggered this render.
    pub step: Step,
    pub state: StepState,
    pub note: &'a str,
    /// Full status text of the job, all four steps.
    pub text: &'a str,
    /// Set on the last render of a job.
    pub finished: bool,
}

/// Receives throttled progress renders and terminal failures.
///
/// Implementations must be `Send + Sync`: jobs run concurrently and each one
/// calls into the same callback. All methods default to no-ops.
pub trait JobProgressCallback: Send + Sync {
    /// Display the latest status text. An `Err` is logged and ignored.
    fn render(&self, update: &ProgressUpdate<'_>) -> Result<(), ProgressError> {
        let _ = update;
        Ok(())
    }

    /// Called once when a job is terminated by a fatal error. No report follows.
    fn on_job_failed(&self, job_id: u64, error: &ForensicsError) {
        let _ = (job_id, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn JobProgressCallback>;

// ── Throttle ─────────────────────────────────────────────────────────────

/// Rate-limited, change-only publisher for one job's status text.
#[derive(Debug)]
pub struct Throttle {
    cooldown: Duration,
    policy: ThrottlePolicy,
    last_sent: Instant,
    last_text: Option<String>,
    pending: bool,
}

impl Throttle {
    pub fn new(cooldown: Duration, policy: ThrottlePolicy, now: Instant) -> Self {
        Self {
            cooldown,
            policy,
            last_sent: now,
            last_text: None,
            pending: false,
        }
    }

    /// Decide whether `text` goes out at `now`. Records the send if so.
    pub fn offer(&mut self, text: &str, now: Instant) -> bool {
        if self.last_text.as_deref() == Some(text) {
            self.pending = false;
            return false;
        }
        if self.last_text.is_some() && now.saturating_duration_since(self.last_sent) < self.cooldown
        {
            self.pending = true;
            return false;
        }
        self.mark_sent(text, now);
        true
    }

    /// Like [`offer`](Self::offer) without the cooldown.
    pub fn force(&mut self, text: &str, now: Instant) -> bool {
        if self.last_text.as_deref() == Some(text) {
            return false;
        }
        self.mark_sent(text, now);
        true
    }

    /// When a dropped update should be flushed, if the policy asks for it.
    pub fn flush_at(&self) -> Option<Instant> {
        match self.policy {
            ThrottlePolicy::FlushLatest if self.pending => Some(self.last_sent + self.cooldown),
            _ => None,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    fn mark_sent(&mut self, text: &str, now: Instant) {
        self.last_sent = now;
        self.last_text = Some(text.to_string());
        self.pending = false;
    }
}

// ── Ledger ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StepEntry {
    state: StepState,
    note: String,
}

/// Step states of one job plus its throttled publisher.
///
/// Owned by the job's task; not shared.
pub struct ProgressLedger {
    job_id: u64,
    steps: [StepEntry; 4],
    finished: bool,
    throttle: Throttle,
    callback: ProgressCallback,
}

impl ProgressLedger {
    /// Create the ledger and publish the initial all-pending text.
    pub fn start(
        job_id: u64,
        cooldown: Duration,
        policy: ThrottlePolicy,
        callback: ProgressCallback,
    ) -> Self {
        let pending = StepEntry {
            state: StepState::Pending,
            note: String::new(),
        };
        let mut ledger = Self {
            job_id,
            steps: [pending.clone(), pending.clone(), pending.clone(), pending],
            finished: false,
            throttle: Throttle::new(cooldown, policy, Instant::now()),
            callback,
        };
        let text = ledger.render_text();
        if ledger.throttle.force(&text, Instant::now()) {
            ledger.propagate(Step::Metadata, &text, false);
        }
        ledger
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    pub fn state(&self, step: Step) -> StepState {
        self.steps[step.index()].state
    }

    pub fn note(&self, step: Step) -> &str {
        &self.steps[step.index()].note
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// `pending → running`. Every earlier step must be done or failed.
    pub async fn begin(&mut self, step: Step, note: &str) -> Result<(), ForensicsError> {
        self.ensure_open(step, "begin")?;
        if let Some(earlier) = Step::ALL[..step.index()]
            .iter()
            .find(|s| !self.state(**s).is_terminal())
        {
            return Err(self.order_error(*earlier, "skip"));
        }
        self.expect_state(step, StepState::Pending, "begin")?;

        self.flush_pending().await;
        self.transition(step, StepState::Running, note);
        Ok(())
    }

    /// `running → done`.
    pub async fn complete(&mut self, step: Step, note: &str) -> Result<(), ForensicsError> {
        self.ensure_open(step, "complete")?;
        self.expect_state(step, StepState::Running, "complete")?;
        self.transition(step, StepState::Done, note);
        Ok(())
    }

    /// `running → failed`. Later steps still run.
    pub async fn fail(&mut self, step: Step, note: &str) -> Result<(), ForensicsError> {
        self.ensure_open(step, "fail")?;
        self.expect_state(step, StepState::Running, "fail")?;
        self.transition(step, StepState::Failed, note);
        Ok(())
    }

    /// Final "completed" render. Not throttled.
    pub fn finish(&mut self) -> Result<(), ForensicsError> {
        if let Some(open) = Step::ALL.iter().find(|s| !self.state(**s).is_terminal()) {
            return Err(self.order_error(*open, "finish with"));
        }
        self.finished = true;
        let text = self.render_text();
        if self.throttle.force(&text, Instant::now()) {
            self.propagate(Step::ManipulationCheck, &text, true);
        }
        Ok(())
    }

    /// Full status text: header plus one line per step.
    pub fn render_text(&self) -> String {
        let header = if self.finished {
            "✅ Analysis complete"
        } else {
            "🔎 Analysis started"
        };
        let mut text = String::from(header);
        for step in Step::ALL {
            let entry = &self.steps[step.index()];
            text.push_str(&format!("\n• {} {}", entry.state.symbol(), step.label()));
            if !entry.note.is_empty() {
                text.push_str(&format!(" - {}", entry.note));
            }
        }
        text
    }

    fn transition(&mut self, step: Step, state: StepState, note: &str) {
        let entry = &mut self.steps[step.index()];
        entry.state = state;
        entry.note = note.to_string();
        debug!("Job {}: {} → {}", self.job_id, step, state.as_str());

        let text = self.render_text();
        if self.throttle.offer(&text, Instant::now()) {
            self.propagate(step, &text, false);
        } else {
            debug!("Job {}: render of {} throttled", self.job_id, step);
        }
    }

    /// With [`ThrottlePolicy::FlushLatest`], wait out the cooldown and send the
    /// latest text that was held back.
    async fn flush_pending(&mut self) {
        let Some(at) = self.throttle.flush_at() else {
            return;
        };
        sleep_until(at).await;
        let text = self.render_text();
        if self.throttle.offer(&text, Instant::now()) {
            let step = Step::ALL
                .iter()
                .rev()
                .copied()
                .find(|s| self.state(*s) != StepState::Pending)
                .unwrap_or(Step::Metadata);
            self.propagate(step, &text, false);
        }
    }

    fn propagate(&self, step: Step, text: &str, finished: bool) {
        let entry = &self.steps[step.index()];
        let update = ProgressUpdate {
            job_id: self.job_id,
            step,
            state: entry.state,
            note: &entry.note,
            text,
            finished,
        };
        if let Err(e) = self.callback.render(&update) {
            warn!("Job {}: {e}", self.job_id);
        }
    }

    fn ensure_open(&self, step: Step, action: &'static str) -> Result<(), ForensicsError> {
        if self.finished {
            return Err(ForensicsError::StepOrder {
                job_id: self.job_id,
                step: step.as_str(),
                action,
                state: "finished",
            });
        }
        Ok(())
    }

    fn expect_state(
        &self,
        step: Step,
        expected: StepState,
        action: &'static str,
    ) -> Result<(), ForensicsError> {
        if self.state(step) == expected {
            Ok(())
        } else {
            Err(self.order_error(step, action))
        }
    }

    fn order_error(&self, step: Step, action: &'static str) -> ForensicsError {
        ForensicsError::StepOrder {
            job_id: self.job_id,
            step: step.as_str(),
            action,
            state: self.state(step).as_str(),
        }
    }
}

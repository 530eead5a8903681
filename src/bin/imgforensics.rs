//! CLI binary for edgequake-imgforensics.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ForensicsConfig`, feeds every input file through one shared
//! `JobTracker` and prints the reports.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_imgforensics::pipeline::input;
use edgequake_imgforensics::{
    save_diff_image, ForensicReport, ForensicsConfig, ForensicsError, JobProgressCallback,
    JobTracker, NoopProgressCallback, ProgressCallback, ProgressError, ProgressUpdate,
    ReportSink, ThrottlePolicy,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One spinner per running job, showing the step that last changed.
struct CliProgressCallback {
    multi: MultiProgress,
    bars: Mutex<HashMap<u64, ProgressBar>>,
    /// File name per job id, filled in right after `submit`.
    names: Mutex<HashMap<u64, String>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            names: Mutex::new(HashMap::new()),
        })
    }

    fn name(&self, job_id: u64, name: String) {
        self.names.lock().unwrap().insert(job_id, name);
    }

    fn bar(&self, job_id: u64) -> ProgressBar {
        let bar = self
            .bars
            .lock()
            .unwrap()
            .entry(job_id)
            .or_insert_with(|| {
                let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(style);
                bar.enable_steady_tick(Duration::from_millis(80));
                bar
            })
            .clone();
        let prefix = self
            .names
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .unwrap_or_else(|| format!("job {job_id}"));
        bar.set_prefix(prefix);
        bar
    }

    fn finish(&self, job_id: u64) {
        if let Some(bar) = self.bars.lock().unwrap().remove(&job_id) {
            bar.finish_and_clear();
        }
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn render(&self, update: &ProgressUpdate<'_>) -> Result<(), ProgressError> {
        if update.finished {
            self.finish(update.job_id);
            return Ok(());
        }
        self.bar(update.job_id).set_message(format!(
            "{} {}  {}",
            update.state.symbol(),
            update.step.label(),
            dim(update.note)
        ));
        Ok(())
    }

    fn on_job_failed(&self, job_id: u64, error: &ForensicsError) {
        self.finish(job_id);
        let name = self
            .names
            .lock()
            .unwrap()
            .get(&job_id)
            .cloned()
            .unwrap_or_else(|| format!("job {job_id}"));
        let _ = self
            .multi
            .println(format!("{} {}  {}", red("✗"), bold(&name), red(&error.to_string())));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full report for one photo
  imgforensics photo.jpg

  # Several files at once, JSON to stdout
  imgforensics --json *.jpg > reports.json

  # Keep the ELA difference images for inspection
  imgforensics --ela-dir ela/ holiday/*.heic

  # Offline: no reverse geocoding
  imgforensics --no-geocode scan.tiff

  # French addresses, stricter edit threshold
  imgforensics --language fr --ela-threshold 20 photo.jpg

SUPPORTED FORMATS:
  jpg jpeg png heic tiff tif webp

ENVIRONMENT VARIABLES:
  IMGFORENSICS_LANGUAGE       Preferred address language (default: en)
  IMGFORENSICS_USER_AGENT     User-Agent sent to the geocoders
  IMGFORENSICS_NOMINATIM_URL  Primary geocoder base URL
  IMGFORENSICS_PHOTON_URL     Fallback geocoder base URL
  IMGFORENSICS_WORKERS        Concurrent analyses
  RUST_LOG                    Override log filter (e.g. edgequake_imgforensics=debug)

NOTES:
  The public Nominatim instance allows one request per second. Requests are
  spaced 1.5 s apart by default, so a batch of photos with GPS data takes at
  least that long per distinct location.
"#;

/// Forensic profile of images: metadata, GPS location and ELA.
#[derive(Parser, Debug)]
#[command(
    name = "imgforensics",
    version,
    about = "Forensic profile of images: metadata, GPS location and ELA",
    long_about = "Extract every metadata field several independent decoders can read, \
resolve embedded GPS coordinates to an address and nearby landmark, and score the image \
with Error Level Analysis to flag possible retouching.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image files to analyse.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output structured JSON (array of ForensicReport) instead of text.
    #[arg(long, env = "IMGFORENSICS_JSON")]
    json: bool,

    /// Write each ELA difference image to this directory as <stem>_<job>_ela.jpg.
    #[arg(long, env = "IMGFORENSICS_ELA_DIR")]
    ela_dir: Option<PathBuf>,

    /// Only print the summary, not every metadata field.
    #[arg(long)]
    summary: bool,

    /// Skip reverse geocoding (no network access).
    #[arg(long, env = "IMGFORENSICS_NO_GEOCODE")]
    no_geocode: bool,

    /// Preferred address language.
    #[arg(long, env = "IMGFORENSICS_LANGUAGE", default_value = "en")]
    language: String,

    /// User-Agent sent to the geocoding providers.
    #[arg(long, env = "IMGFORENSICS_USER_AGENT")]
    user_agent: Option<String>,

    /// Base URL of the primary geocoder (Nominatim API).
    #[arg(long, env = "IMGFORENSICS_NOMINATIM_URL")]
    nominatim_url: Option<String>,

    /// Base URL of the fallback geocoder (Photon API).
    #[arg(long, env = "IMGFORENSICS_PHOTON_URL")]
    photon_url: Option<String>,

    /// Minimum spacing between geocoder requests, in milliseconds.
    #[arg(long, env = "IMGFORENSICS_RATE_LIMIT_MS", default_value_t = 1500)]
    rate_limit_ms: u64,

    /// Number of images analysed concurrently.
    #[arg(short, long, env = "IMGFORENSICS_WORKERS", default_value_t = 4)]
    workers: usize,

    /// JPEG quality of the ELA recompression pass (1–100).
    #[arg(long, env = "IMGFORENSICS_ELA_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    ela_quality: u8,

    /// ELA score above which an image is reported as possibly edited.
    #[arg(long, env = "IMGFORENSICS_ELA_THRESHOLD", default_value_t = 25.0)]
    ela_threshold: f64,

    /// Largest accepted input, in MiB.
    #[arg(long, env = "IMGFORENSICS_MAX_SIZE_MB", default_value_t = 20)]
    max_size_mb: u64,

    /// What to do with progress updates inside the 0.5 s cooldown.
    #[arg(long, value_enum, default_value = "drop")]
    throttle: ThrottleArg,

    /// Disable progress spinners.
    #[arg(long, env = "IMGFORENSICS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMGFORENSICS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the reports.
    #[arg(short, long, env = "IMGFORENSICS_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ThrottleArg {
    Drop,
    Flush,
}

impl From<ThrottleArg> for ThrottlePolicy {
    fn from(v: ThrottleArg) -> Self {
        match v {
            ThrottleArg::Drop => ThrottlePolicy::DropInsideCooldown,
            ThrottleArg::Flush => ThrottlePolicy::FlushLatest,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Spinners give all the feedback that matters; library INFO logs would
    // tear them apart.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build tracker ────────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let cli_progress = show_progress.then(CliProgressCallback::new);
    let callback: ProgressCallback = match &cli_progress {
        Some(cb) => Arc::clone(cb) as ProgressCallback,
        None => Arc::new(NoopProgressCallback),
    };
    let tracker = Arc::new(
        JobTracker::from_config(config.clone(), callback)
            .context("Failed to set up geocoding client")?,
    );

    // ── Submit jobs ──────────────────────────────────────────────────────
    let (tx, mut rx) = mpsc::unbounded_channel::<ForensicReport>();
    let sink: Arc<dyn ReportSink> = Arc::new(tx);
    let mut handles = Vec::new();
    let mut failed = 0usize;

    for path in &cli.inputs {
        let name = display_name(path);
        match input::load_image(path, config.max_input_bytes).await {
            Ok(bytes) => {
                let handle = tracker.submit(path.display().to_string(), bytes, Arc::clone(&sink));
                if let Some(cb) = &cli_progress {
                    cb.name(handle.job_id, name);
                }
                handles.push(handle);
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {}  {}", red("✗"), bold(&name), red(&e.to_string()));
            }
        }
    }
    drop(sink);

    // ── Collect reports ──────────────────────────────────────────────────
    // The channel closes once every job has dropped its sink.
    let mut reports = Vec::new();
    while let Some(report) = rx.recv().await {
        reports.push(report);
    }
    for handle in handles {
        if handle.wait().await.is_err() {
            failed += 1;
        }
    }
    reports.sort_by_key(|r| r.job_id);

    // ── ELA images ───────────────────────────────────────────────────────
    if let Some(dir) = &cli.ela_dir {
        for report in &reports {
            let target = dir.join(ela_file_name(&report.owner, report.job_id));
            let written = save_diff_image(report, &target)
                .await
                .with_context(|| format!("Failed to save ELA image for {}", report.owner))?;
            if written && !cli.quiet {
                eprintln!("{} ELA image  →  {}", dim("·"), target.display());
            }
        }
    }

    // ── Print ────────────────────────────────────────────────────────────
    if cli.json {
        let json = serde_json::to_string_pretty(&reports).context("Failed to serialise reports")?;
        println!("{json}");
    } else {
        for report in &reports {
            print_report(report, cli.summary);
        }
    }

    let total = cli.inputs.len();
    if !cli.quiet {
        if failed == 0 {
            eprintln!("{} {} images analysed", green("✔"), bold(&total.to_string()));
        } else {
            eprintln!(
                "{} {}/{} images analysed  ({} failed)",
                if failed == total { red("✘") } else { yellow("⚠") },
                bold(&(total - failed).to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
    if failed == total {
        bail!("No image could be analysed");
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn build_config(cli: &Cli) -> Result<ForensicsConfig> {
    let mut builder = ForensicsConfig::builder()
        .language(cli.language.clone())
        .geocoding(!cli.no_geocode)
        .rate_limit_ms(cli.rate_limit_ms)
        .workers(cli.workers)
        .ela_quality(cli.ela_quality)
        .ela_threshold(cli.ela_threshold)
        .ela_low_threshold(cli.ela_threshold.min(10.0))
        .max_input_bytes(cli.max_size_mb.saturating_mul(1024 * 1024))
        .throttle_policy(cli.throttle.clone().into());
    if let Some(agent) = &cli.user_agent {
        builder = builder.user_agent(agent.clone());
    }
    if let Some(url) = &cli.nominatim_url {
        builder = builder.nominatim_url(url.clone());
    }
    if let Some(url) = &cli.photon_url {
        builder = builder.photon_url(url.clone());
    }
    builder.build().context("Invalid configuration")
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn file_stem(owner: &str) -> String {
    Path::new(owner)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

/// Job ids keep inputs with the same stem from overwriting each other.
fn ela_file_name(owner: &str, job_id: u64) -> String {
    format!("{}_{job_id}_ela.jpg", file_stem(owner))
}

fn gauge(percent: f64) -> String {
    const WIDTH: usize = 24;
    let filled = ((percent / 100.0) * WIDTH as f64).round() as usize;
    let filled = filled.min(WIDTH);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(WIDTH - filled))
}

fn print_report(report: &ForensicReport, summary: bool) {
    println!();
    println!("{} {}", cyan("◆"), bold(&report.owner));

    println!("  {}", bold(&format!("Metadata ({} entries)", report.entry_count)));
    if report.metadata.is_empty() {
        println!("    {}", dim("no metadata found"));
    } else if !summary {
        let width = report.metadata.keys().map(|k| k.len()).max().unwrap_or(0);
        for (key, value) in &report.metadata {
            println!("    {key:<width$}  {value}");
        }
    }

    println!("  {}", bold("Location"));
    match report.coordinates() {
        Some(c) => {
            println!("    Coordinates  {:.6}, {:.6}", c.lat, c.lon);
            if let Some(address) = &report.address {
                println!("    Address      {address}");
            }
            if let Some(landmark) = &report.landmark {
                println!("    Landmark     {landmark}");
            }
        }
        None => println!("    {}", dim("no GPS data")),
    }

    println!("  {}", bold("Manipulation"));
    match &report.manipulation {
        Some(m) => {
            let verdict = if m.is_edited {
                red(m.verdict())
            } else {
                green(m.verdict())
            };
            println!(
                "    ELA score    {:.2} / 255  {}  {} ({})",
                m.ela_score,
                gauge(m.gauge_percent()),
                verdict,
                m.risk.label()
            );
        }
        None => println!("    {}", dim("analysis not performed")),
    }

    let s = &report.stats;
    println!(
        "  {}",
        dim(&format!(
            "metadata {}ms · geolocation {}ms · ela {}ms · total {}ms",
            s.metadata_ms, s.geolocation_ms, s.manipulation_ms, s.total_ms
        ))
    );
}

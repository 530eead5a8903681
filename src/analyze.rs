//! One-shot entry points for callers that analyse a single image.
//!
//! Each call builds a fresh [`JobTracker`], so geocoding results are not
//! cached across calls. Long-running front-ends should hold one tracker and
//! use [`JobTracker::submit`] instead.

use crate::config::ForensicsConfig;
use crate::error::ForensicsError;
use crate::job::JobTracker;
use crate::output::ForensicReport;
use crate::pipeline::input;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Analyse an image file.
///
/// # Example
/// ```rust,no_run
/// use edgequake_imgforensics::{analyze_file, ForensicsConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let report = analyze_file("photo.jpg", &ForensicsConfig::default()).await?;
/// println!("{} metadata entries", report.entry_count);
/// if let Some(address) = &report.address {
///     println!("taken near {address}");
/// }
/// # Ok(())
/// # }
/// ```
pub async fn analyze_file(
    path: impl AsRef<Path>,
    config: &ForensicsConfig,
) -> Result<ForensicReport, ForensicsError> {
    let path = path.as_ref();
    input::check_extension(path)?;
    let bytes = input::load_image(path, config.max_input_bytes).await?;
    info!("Analysing {}", path.display());
    analyze_bytes(bytes, config).await
}

/// Analyse an in-memory image.
pub async fn analyze_bytes(
    bytes: Vec<u8>,
    config: &ForensicsConfig,
) -> Result<ForensicReport, ForensicsError> {
    analyze_with_callback(bytes, config, Arc::new(NoopProgressCallback)).await
}

/// Analyse an in-memory image, streaming step progress to `callback`.
pub async fn analyze_with_callback(
    bytes: Vec<u8>,
    config: &ForensicsConfig,
    callback: ProgressCallback,
) -> Result<ForensicReport, ForensicsError> {
    let tracker = JobTracker::from_config(config.clone(), callback)?;
    tracker.analyze("local", bytes).await
}

/// Blocking wrapper around [`analyze_file`].
pub fn analyze_sync(
    path: impl AsRef<Path>,
    config: &ForensicsConfig,
) -> Result<ForensicReport, ForensicsError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ForensicsError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(analyze_file(path, config))
}

/// Write the ELA difference image of `report` to `path`.
///
/// Returns `false` when the report carries no ELA result. The write goes
/// through a temporary sibling file and a rename so readers never see a
/// partial JPEG.
pub async fn save_diff_image(
    report: &ForensicReport,
    path: impl AsRef<Path>,
) -> Result<bool, ForensicsError> {
    let Some(manipulation) = &report.manipulation else {
        return Ok(false);
    };
    let path = path.as_ref();
    let write_err = |source| ForensicsError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("jpg.tmp");
    tokio::fs::write(&tmp_path, &manipulation.diff_image)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(true)
}

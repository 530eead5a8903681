//! Error types for the edgequake-imgforensics library.
//!
//! Four error types reflect four distinct failure modes:
//!
//! * [`ForensicsError`] is **fatal**: the job cannot proceed at all (input
//!   file missing or too large, invalid configuration, a broken job-state
//!   invariant). Returned as `Err(ForensicsError)` from the top-level entry
//!   points and reported once to the requester.
//!
//! * [`StageError`] is **non-fatal**: one extraction stage could not read the
//!   buffer. The cascade logs it and moves on to the next decoder.
//!
//! * [`GeoError`] is **non-fatal**: a geocoding provider failed. Drives the
//!   primary → secondary → sentinel fallback chain and never escapes
//!   [`crate::pipeline::geo::GeoService`].
//!
//! * [`ProgressError`] is returned by progress callbacks. The tracker logs it
//!   and keeps going; a broken status display must never break analysis.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-imgforensics library.
///
/// Stage and provider failures use [`StageError`] / [`GeoError`] and degrade
/// to empty or sentinel values instead of being propagated here.
#[derive(Debug, Error)]
pub enum ForensicsError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file extension is not one of the supported image formats.
    #[error("Format '{extension}' is not supported (expected one of: {supported})")]
    UnsupportedFormat {
        extension: String,
        supported: String,
    },

    /// The input exceeds the configured size limit.
    #[error("Image is too large: {size} bytes (limit {limit} bytes)")]
    InputTooLarge { size: u64, limit: u64 },

    /// The input buffer is empty.
    #[error("Image buffer is empty")]
    EmptyInput,

    // ── Job errors ────────────────────────────────────────────────────────
    /// A job id was used that the tracker does not know about.
    #[error("No state for job {job_id}")]
    UnknownJob { job_id: u64 },

    /// A step transition violated the fixed step order.
    #[error("Job {job_id}: cannot {action} step '{step}' while it is {state}")]
    StepOrder {
        job_id: u64,
        step: &'static str,
        action: &'static str,
        state: &'static str,
    },

    /// The report sink refused the finished report.
    #[error("Report delivery failed for job {job_id}: {reason}")]
    DeliveryFailed { job_id: u64, reason: String },

    /// A worker task panicked or was aborted.
    #[error("Worker for job {job_id} terminated abnormally: {detail}")]
    WorkerFailed { job_id: u64, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read the input file.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write an output file (report JSON, ELA image).
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure inside one extraction stage.
#[derive(Debug, Clone, Error, serde::Serialize)]
pub enum StageError {
    /// The decoder found nothing it could parse.
    #[error("{stage}: no metadata found")]
    NoMetadata { stage: &'static str },

    /// The decoder rejected the buffer.
    #[error("{stage}: decode failed: {detail}")]
    Decode { stage: &'static str, detail: String },

    /// Scratch file creation or write failed.
    #[error("{stage}: scratch file error: {detail}")]
    Scratch { stage: &'static str, detail: String },

    /// The decoder panicked on malformed input.
    #[error("{stage}: decoder panicked")]
    Panicked { stage: &'static str },
}

/// A non-fatal failure from a reverse-geocoding provider.
#[derive(Debug, Clone, Error)]
pub enum GeoError {
    /// The provider did not answer within its timeout.
    #[error("{provider}: timed out after {secs}s")]
    Timeout { provider: &'static str, secs: u64 },

    /// Connection, TLS or protocol failure.
    #[error("{provider}: request failed: {detail}")]
    Transport {
        provider: &'static str,
        detail: String,
    },

    /// The provider answered with a non-2xx status.
    #[error("{provider}: HTTP {status}")]
    Status { provider: &'static str, status: u16 },

    /// The response body was not the JSON we expect.
    #[error("{provider}: malformed response: {detail}")]
    Malformed {
        provider: &'static str,
        detail: String,
    },

    /// The provider answered but had nothing at these coordinates.
    #[error("{provider}: no result")]
    NoResult { provider: &'static str },
}

impl GeoError {
    /// Map a reqwest failure onto the provider error taxonomy.
    pub(crate) fn from_reqwest(provider: &'static str, secs: u64, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GeoError::Timeout { provider, secs }
        } else if let Some(status) = e.status() {
            GeoError::Status {
                provider,
                status: status.as_u16(),
            }
        } else {
            GeoError::Transport {
                provider,
                detail: e.to_string(),
            }
        }
    }
}

/// Error returned by a progress callback. Logged, never propagated.
#[derive(Debug, Clone, Error)]
#[error("progress callback failed: {0}")]
pub struct ProgressError(pub String);

//! Input loading: validate a user-supplied image path and read it into memory.
//!
//! Every later stage works on the same immutable byte buffer, so the file is
//! read exactly once here. Validation happens before the read: extension
//! whitelist, then size, so an oversized upload never lands in memory.

use crate::error::ForensicsError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions accepted as input, lowercase.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "tiff", "tif", "webp"];

/// Check a path's extension against [`SUPPORTED_EXTENSIONS`] (case-insensitive).
pub fn check_extension(path: &Path) -> Result<(), ForensicsError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(ForensicsError::UnsupportedFormat {
            extension: if ext.is_empty() {
                "(none)".to_string()
            } else {
                ext
            },
            supported: SUPPORTED_EXTENSIONS.join(", "),
        })
    }
}

/// Check a buffer length against the configured cap.
pub fn check_size(len: u64, limit: u64) -> Result<(), ForensicsError> {
    if len == 0 {
        return Err(ForensicsError::EmptyInput);
    }
    if len > limit {
        return Err(ForensicsError::InputTooLarge { size: len, limit });
    }
    Ok(())
}

/// Validate and read an image file.
pub async fn load_image(path: impl AsRef<Path>, max_bytes: u64) -> Result<Vec<u8>, ForensicsError> {
    let path: PathBuf = path.as_ref().to_path_buf();
    check_extension(&path)?;

    let meta = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) => return Err(map_io(path, e)),
    };
    if !meta.is_file() {
        return Err(ForensicsError::FileNotFound { path });
    }
    check_size(meta.len(), max_bytes)?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| map_io(path.clone(), e))?;
    // The file may have grown between stat and read.
    check_size(bytes.len() as u64, max_bytes)?;

    debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

fn map_io(path: PathBuf, e: std::io::Error) -> ForensicsError {
    match e.kind() {
        std::io::ErrorKind::NotFound => ForensicsError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => ForensicsError::PermissionDenied { path },
        _ => ForensicsError::ReadFailed { path, source: e },
    }
}

//! Stage 4: generic container metadata read from a scratch file.
//!
//! The probe wants a path, so the buffer is written to a [`NamedTempFile`]
//! first. The file is removed when this stage returns, on every path.
//!
//! The probe produces plaintext `Label: value` lines (track tags for
//! video/HEIF containers, container summary for still images), which are
//! split on the first `:` into entries.

use super::{Extractor, Source, StageOutput};
use crate::error::StageError;
use image::ImageReader;
use nom_exif::{MediaParser, MediaSource, TrackInfo, TrackInfoTag};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const TRACK_TAGS: &[(TrackInfoTag, &str)] = &[
    (TrackInfoTag::Make, "Camera manufacturer"),
    (TrackInfoTag::Model, "Camera model"),
    (TrackInfoTag::Software, "Producer"),
    (TrackInfoTag::CreateDate, "Creation date"),
    (TrackInfoTag::GpsIso6709, "Location"),
];

pub struct GenericContainer;

impl Extractor for GenericContainer {
    fn source(&self) -> Source {
        Source::GenericContainer
    }

    fn extract(&self, bytes: &[u8]) -> Result<StageOutput, StageError> {
        self.extract_in(bytes, &std::env::temp_dir())
    }
}

impl GenericContainer {
    /// Run the stage with its scratch file placed in `dir`.
    fn extract_in(&self, bytes: &[u8], dir: &Path) -> Result<StageOutput, StageError> {
        let stage = self.source().name();
        let scratch_err = |e: std::io::Error| StageError::Scratch {
            stage,
            detail: e.to_string(),
        };

        let mut scratch = NamedTempFile::new_in(dir).map_err(scratch_err)?;
        scratch.write_all(bytes).map_err(scratch_err)?;
        scratch.flush().map_err(scratch_err)?;

        let lines = probe(scratch.path(), bytes.len());

        if let Err(e) = scratch.close() {
            warn!("Stage {stage}: could not remove scratch file: {e}");
        }

        let mut out = StageOutput::default();
        for (key, value) in lines.iter().filter_map(|l| split_line(l)) {
            out.push(key, value);
        }
        if out.entries.is_empty() {
            return Err(StageError::NoMetadata { stage });
        }
        Ok(out)
    }
}

/// Plaintext description of the file at `path`.
fn probe(path: &Path, size: usize) -> Vec<String> {
    let mut lines = Vec::new();

    match MediaSource::file_path(path) {
        Ok(ms) if ms.has_track() => {
            let mut parser = MediaParser::new();
            let parsed: nom_exif::Result<TrackInfo> = parser.parse(ms);
            match parsed {
                Ok(info) => {
                    for (tag, label) in TRACK_TAGS {
                        if let Some(value) = info.get(*tag) {
                            lines.push(format!("- {label}: {value}"));
                        }
                    }
                }
                Err(e) => debug!("Track probe failed: {e}"),
            }
        }
        Ok(_) => {}
        Err(e) => debug!("Media probe failed: {e}"),
    }

    let reader = match ImageReader::open(path).and_then(|r| r.with_guessed_format()) {
        Ok(r) => r,
        Err(e) => {
            debug!("Container probe failed: {e}");
            return lines;
        }
    };
    let Some(format) = reader.format() else {
        return lines;
    };

    lines.push(format!("- MIME type: {}", format.to_mime_type()));
    lines.push(format!("- Compression: {format:?}"));
    if let Ok((w, h)) = reader.into_dimensions() {
        lines.push(format!("- Image width: {w} pixels"));
        lines.push(format!("- Image height: {h} pixels"));
    }
    lines.push(format!("- File size: {size} bytes"));
    lines
}

/// `"- Image width: 800 pixels"` → `("Image width", "800 pixels")`.
fn split_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim().trim_start_matches('-').trim();
    let value = value.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(w, h, image::Rgb([10, 20, 30]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn split_line_keeps_colons_in_value() {
        assert_eq!(
            split_line("- Creation date: 2024-01-02 10:11:12"),
            Some(("Creation date".into(), "2024-01-02 10:11:12".into()))
        );
        assert_eq!(split_line("no separator"), None);
        assert_eq!(split_line(": value"), None);
    }

    #[test]
    fn png_yields_container_summary() {
        let bytes = png(32, 16);
        let out = GenericContainer.extract(&bytes).unwrap();
        let get = |k: &str| {
            out.entries
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(get("MIME type").as_deref(), Some("image/png"));
        assert_eq!(get("Image width").as_deref(), Some("32 pixels"));
        assert_eq!(get("Image height").as_deref(), Some("16 pixels"));
        assert!(out.coordinates.is_none());
    }

    #[test]
    fn unrecognised_buffer_contributes_nothing() {
        assert!(matches!(
            GenericContainer.extract(b"plain text, not media"),
            Err(StageError::NoMetadata { .. })
        ));
    }

    fn scratch_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn scratch_file_is_removed_after_success() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GenericContainer.extract_in(&png(8, 8), dir.path()).is_ok());
        assert_eq!(scratch_files(dir.path()), 0);
    }

    #[test]
    fn scratch_file_is_removed_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GenericContainer
            .extract_in(b"plain text, not media", dir.path())
            .is_err());
        assert_eq!(scratch_files(dir.path()), 0);
    }

    #[test]
    fn missing_scratch_dir_is_a_scratch_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("missing");
        assert!(matches!(
            GenericContainer.extract_in(&png(8, 8), &gone),
            Err(StageError::Scratch { .. })
        ));
    }
}

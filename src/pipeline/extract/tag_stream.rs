//! Stage 2: a streaming EXIF tag walker (nom-exif).
//!
//! Reports every tag of IFD0 and IFD1 as `"<Group> <Tag>"`, skipping binary
//! thumbnail pointers and maker notes. GPS from this stage is the fallback
//! when the container stage found none.

use super::{Extractor, Source, StageOutput};
use crate::error::StageError;
use crate::output::Coordinates;
use crate::pipeline::coords::{coordinates_from, Angle};
use nom_exif::{ExifIter, GPSInfo, LatLng, MediaParser, MediaSource};
use std::io::Cursor;
use tracing::debug;

/// Tags whose values are offsets into the file or opaque blobs.
const SKIPPED: &[&str] = &[
    "MakerNote",
    "JPEGInterchangeFormat",
    "JPEGInterchangeFormatLength",
    "ThumbnailOffset",
    "ThumbnailLength",
    "StripOffsets",
    "StripByteCounts",
    "ExifOffset",
    "GPSInfo",
    "InteropOffset",
];

pub struct TagStream;

impl Extractor for TagStream {
    fn source(&self) -> Source {
        Source::TagStream
    }

    fn extract(&self, bytes: &[u8]) -> Result<StageOutput, StageError> {
        let stage = self.source().name();
        let decode = |e: nom_exif::Error| StageError::Decode {
            stage,
            detail: e.to_string(),
        };

        let ms = MediaSource::seekable(Cursor::new(bytes.to_vec())).map_err(decode)?;
        if !ms.has_exif() {
            return Err(StageError::NoMetadata { stage });
        }
        let mut parser = MediaParser::new();
        let iter: ExifIter = parser.parse(ms).map_err(decode)?;

        let mut out = StageOutput::default();
        out.coordinates = match iter.parse_gps_info() {
            Ok(Some(gps)) => gps_coordinates(&gps),
            Ok(None) => None,
            Err(e) => {
                debug!("Stage {stage}: unreadable GPS block: {e}");
                None
            }
        };

        for mut entry in iter {
            let name = match entry.tag() {
                Some(tag) => format!("{tag:?}"),
                None => format!("Tag 0x{:04X}", entry.tag_code()),
            };
            if SKIPPED.contains(&name.as_str()) {
                continue;
            }
            let Some(value) = entry.take_value() else {
                continue;
            };
            out.push(
                format!("{} {}", group(entry.ifd_index()), name),
                value.to_string(),
            );
        }

        if out.entries.is_empty() && out.coordinates.is_none() {
            return Err(StageError::NoMetadata { stage });
        }
        Ok(out)
    }
}

/// Degrees from the raw GPS rationals. The ISO 6709 rendering nom-exif
/// offers rounds to five decimals, so it is not used here.
fn gps_coordinates(gps: &GPSInfo) -> Option<Coordinates> {
    let lat = rationals(&gps.latitude);
    let lon = rationals(&gps.longitude);
    coordinates_from(
        Angle::Rationals(&lat),
        &gps.latitude_ref.to_string(),
        Angle::Rationals(&lon),
        &gps.longitude_ref.to_string(),
    )
}

fn rationals(v: &LatLng) -> [exif::Rational; 3] {
    [&v.0, &v.1, &v.2].map(|r| exif::Rational {
        num: r.0,
        denom: r.1,
    })
}

fn group(ifd: usize) -> String {
    match ifd {
        0 => "Image".to_string(),
        1 => "Thumbnail".to_string(),
        n => format!("IFD{n}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_names() {
        assert_eq!(group(0), "Image");
        assert_eq!(group(1), "Thumbnail");
        assert_eq!(group(3), "IFD3");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(TagStream.extract(b"\x00\x01\x02garbage").is_err());
    }

    #[test]
    fn empty_buffer_is_rejected() {
        assert!(TagStream.extract(&[]).is_err());
    }
}

//! Stage 1: the container's own EXIF block, read with kamadak-exif.
//!
//! This is the first-priority GPS source. Only the primary image IFD and its
//! Exif/GPS children are reported; the thumbnail IFD is left to the tag
//! stream stage.

use super::{Extractor, Source, StageOutput};
use crate::error::StageError;
use crate::pipeline::coords::{coordinates_from, Angle};
use crate::output::Coordinates;
use exif::{Exif, Field, In, Tag, Value};
use std::io::Cursor;

pub struct ContainerExif;

impl Extractor for ContainerExif {
    fn source(&self) -> Source {
        Source::Container
    }

    fn extract(&self, bytes: &[u8]) -> Result<StageOutput, StageError> {
        let stage = self.source().name();
        let exif = exif::Reader::new()
            .read_from_container(&mut Cursor::new(bytes))
            .map_err(|e| match e {
                exif::Error::NotFound(_) => StageError::NoMetadata { stage },
                other => StageError::Decode {
                    stage,
                    detail: other.to_string(),
                },
            })?;

        let mut out = StageOutput::default();
        for field in exif.fields().filter(|f| f.ifd_num == In::PRIMARY) {
            if field.tag == Tag::MakerNote {
                continue;
            }
            out.push(
                field.tag.to_string(),
                field.display_value().with_unit(&exif).to_string(),
            );
        }
        out.coordinates = gps_coordinates(&exif);

        if out.entries.is_empty() {
            return Err(StageError::NoMetadata { stage });
        }
        Ok(out)
    }
}

/// Read GPSLatitude/GPSLongitude with their references. A missing reference
/// is taken as north/east.
fn gps_coordinates(exif: &Exif) -> Option<Coordinates> {
    let lat = exif.get_field(Tag::GPSLatitude, In::PRIMARY)?;
    let lon = exif.get_field(Tag::GPSLongitude, In::PRIMARY)?;
    let (Value::Rational(lat_parts), Value::Rational(lon_parts)) = (&lat.value, &lon.value) else {
        return None;
    };
    let lat_ref = reference(exif.get_field(Tag::GPSLatitudeRef, In::PRIMARY));
    let lon_ref = reference(exif.get_field(Tag::GPSLongitudeRef, In::PRIMARY));

    coordinates_from(
        Angle::Rationals(lat_parts),
        &lat_ref,
        Angle::Rationals(lon_parts),
        &lon_ref,
    )
}

fn reference(field: Option<&Field>) -> String {
    match field.map(|f| &f.value) {
        Some(Value::Ascii(parts)) => parts
            .first()
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_without_exif_reports_nothing() {
        // Minimal JPEG: SOI + EOI.
        let err = ContainerExif.extract(&[0xFF, 0xD8, 0xFF, 0xD9]).unwrap_err();
        assert!(
            matches!(
                err,
                StageError::NoMetadata { .. } | StageError::Decode { .. }
            ),
            "got {err:?}"
        );
    }

    #[test]
    fn garbage_is_a_decode_failure() {
        assert!(ContainerExif.extract(b"not an image at all").is_err());
    }

    #[test]
    fn missing_reference_is_empty() {
        assert_eq!(reference(None), "");
    }
}

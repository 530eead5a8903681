//! Stage 3: IFD dictionary dump (little_exif).
//!
//! Keys are `<IFD>_<Tag>` with IFD one of `0th`, `Exif`, `GPS`, `Interop`.
//! This stage never contributes coordinates.

use super::{is_heif, Extractor, Source, StageOutput};
use crate::error::StageError;
use image::ImageFormat;
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use once_cell::sync::Lazy;
use regex::Regex;
use std::panic::{self, AssertUnwindSafe};

/// `uR64 { nominator: 1, denominator: 250 }` → `1/250`.
static RATIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[ui]R64 \{ nominator: (-?\d+), denominator: (-?\d+) \}").expect("valid regex")
});

/// Tags that live in IFD0 rather than the Exif sub-IFD.
const PRIMARY_IFD: &[u16] = &[
    0x0100, 0x0101, 0x0102, 0x0103, 0x0106, 0x010E, 0x010F, 0x0110, 0x0112, 0x0115, 0x011A,
    0x011B, 0x011C, 0x0128, 0x0131, 0x0132, 0x013B, 0x013E, 0x013F, 0x0211, 0x0212, 0x0213,
    0x0214, 0x8298,
];

pub struct IfdDictionary;

impl Extractor for IfdDictionary {
    fn source(&self) -> Source {
        Source::IfdDictionary
    }

    fn extract(&self, bytes: &[u8]) -> Result<StageOutput, StageError> {
        let stage = self.source().name();
        let Some(file_type) = file_extension(bytes) else {
            return Err(StageError::NoMetadata { stage });
        };

        let data = bytes.to_vec();
        // little_exif panics on some malformed segments.
        let metadata = panic::catch_unwind(AssertUnwindSafe(|| {
            Metadata::new_from_vec(&data, file_type)
        }))
        .map_err(|_| StageError::Panicked { stage })?
        .map_err(|e| StageError::Decode {
            stage,
            detail: format!("{e:?}"),
        })?;

        let mut out = StageOutput::default();
        for tag in &metadata {
            if is_pointer(tag) {
                continue;
            }
            let rendered = format!("{tag:?}");
            let (name, value) = split_debug(&rendered);
            out.push(format!("{}_{}", ifd_name(tag.as_u16(), name), name), value);
        }

        if out.entries.is_empty() {
            return Err(StageError::NoMetadata { stage });
        }
        Ok(out)
    }
}

fn file_extension(bytes: &[u8]) -> Option<FileExtension> {
    if is_heif(bytes) {
        return Some(FileExtension::HEIF);
    }
    match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => Some(FileExtension::JPEG),
        ImageFormat::Png => Some(FileExtension::PNG {
            as_zTXt_chunk: false,
        }),
        ImageFormat::WebP => Some(FileExtension::WEBP),
        ImageFormat::Tiff => Some(FileExtension::TIFF),
        _ => None,
    }
}

fn is_pointer(tag: &ExifTag) -> bool {
    matches!(
        tag,
        ExifTag::ExifOffset(_)
            | ExifTag::GPSInfo(_)
            | ExifTag::InteropOffset(_)
            | ExifTag::ThumbnailOffset(..)
            | ExifTag::ThumbnailLength(_)
            | ExifTag::StripOffsets(..)
            | ExifTag::StripByteCounts(_)
    )
}

fn ifd_name(code: u16, name: &str) -> &'static str {
    if name.starts_with("GPS") {
        "GPS"
    } else if name.starts_with("Interop") {
        "Interop"
    } else if PRIMARY_IFD.contains(&code) {
        "0th"
    } else {
        "Exif"
    }
}

/// Split a `Variant(payload)` debug rendering into name and display value.
fn split_debug(rendered: &str) -> (&str, String) {
    let Some((name, rest)) = rendered.split_once('(') else {
        return (rendered, String::new());
    };
    let payload = rest.strip_suffix(')').unwrap_or(rest);
    let payload = RATIONAL.replace_all(payload, "$1/$2");
    (name, payload.trim_matches('"').to_string())
}

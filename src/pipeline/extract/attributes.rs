//! Stage 5: attributes of the decoded image itself.

use super::{Extractor, Source, StageOutput};
use crate::error::StageError;
use image::{ColorType, GenericImageView};

pub struct DerivedAttributes;

impl Extractor for DerivedAttributes {
    fn source(&self) -> Source {
        Source::Derived
    }

    fn extract(&self, bytes: &[u8]) -> Result<StageOutput, StageError> {
        let stage = self.source().name();
        let format = image::guess_format(bytes).map_err(|_| StageError::NoMetadata { stage })?;
        let img = image::load_from_memory_with_format(bytes, format).map_err(|e| {
            StageError::Decode {
                stage,
                detail: e.to_string(),
            }
        })?;

        let (w, h) = img.dimensions();
        let mut out = StageOutput::default();
        out.push("Width", w.to_string());
        out.push("Height", h.to_string());
        out.push("Mode", mode(img.color()));
        out.push("Format", format!("{format:?}").to_uppercase());
        Ok(out)
    }
}

/// Short pixel-mode names, as image viewers usually print them.
fn mode(color: ColorType) -> String {
    match color {
        ColorType::L8 => "L".into(),
        ColorType::La8 => "LA".into(),
        ColorType::Rgb8 => "RGB".into(),
        ColorType::Rgba8 => "RGBA".into(),
        ColorType::L16 => "I;16".into(),
        ColorType::La16 => "LA;16".into(),
        ColorType::Rgb16 => "RGB;16".into(),
        ColorType::Rgba16 => "RGBA;16".into(),
        ColorType::Rgb32F => "RGB;F".into(),
        ColorType::Rgba32F => "RGBA;F".into(),
        other => format!("{other:?}"),
    }
}

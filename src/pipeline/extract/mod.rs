//! Metadata extraction cascade: five independent decoders, one merged map.
//!
//! Each decoder implements [`Extractor`] and reads the full buffer from the
//! start; none of them shares a cursor or parse state with another. The
//! [`Cascade`] runs them in a fixed order and folds their output into one
//! [`Extraction`]:
//!
//! ```text
//! bytes ─┬─ container   (kamadak-exif)  → Pillow_*      + coordinates (1st priority)
//!        ├─ tag_stream  (nom-exif)      → ExifRead_*    + coordinates (fallback)
//!        ├─ ifd         (little_exif)   → Piexif_<IFD>_*
//!        ├─ generic     (scratch file)  → Hachoir_*
//!        └─ attributes  (image)         → Image_*
//! ```
//!
//! The key prefix is applied here, not by the decoders, so two sources can
//! never write the same key. A stage that errors or panics contributes
//! nothing and the cascade moves on.

pub mod attributes;
pub mod container;
pub mod generic;
pub mod ifd;
pub mod tag_stream;

use crate::error::StageError;
use crate::output::{Coordinates, Extraction};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, warn};

/// Which decoder produced an entry. Owns the key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Container,
    TagStream,
    IfdDictionary,
    GenericContainer,
    Derived,
}

impl Source {
    /// Key prefix. Kept stable because report templates match on it.
    pub fn prefix(&self) -> &'static str {
        match self {
            Source::Container => "Pillow",
            Source::TagStream => "ExifRead",
            Source::IfdDictionary => "Piexif",
            Source::GenericContainer => "Hachoir",
            Source::Derived => "Image",
        }
    }

    /// Stage name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Source::Container => "container",
            Source::TagStream => "tag-stream",
            Source::IfdDictionary => "ifd",
            Source::GenericContainer => "generic",
            Source::Derived => "attributes",
        }
    }

    /// Only the two EXIF walkers are trusted for GPS.
    pub fn may_set_coordinates(&self) -> bool {
        matches!(self, Source::Container | Source::TagStream)
    }

    pub fn key(&self, tag: &str) -> String {
        format!("{}_{}", self.prefix(), tag)
    }
}

/// Unprefixed output of one decoder.
#[derive(Debug, Default)]
pub struct StageOutput {
    pub entries: Vec<(String, String)>,
    pub coordinates: Option<Coordinates>,
}

impl StageOutput {
    pub fn push(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        self.entries.push((tag.into(), value.into()));
    }
}

/// One metadata decoder.
///
/// Implementations must not assume anything about the buffer: garbage in
/// gives `Err`, never a partially-updated shared state.
pub trait Extractor: Send + Sync {
    fn source(&self) -> Source;

    fn extract(&self, bytes: &[u8]) -> Result<StageOutput, StageError>;
}

/// Ordered list of decoders folded into one [`Extraction`].
pub struct Cascade {
    stages: Vec<Box<dyn Extractor>>,
}

impl Default for Cascade {
    fn default() -> Self {
        Self::standard()
    }
}

impl Cascade {
    /// The five production decoders in priority order.
    pub fn standard() -> Self {
        Self::with_stages(vec![
            Box::new(container::ContainerExif),
            Box::new(tag_stream::TagStream),
            Box::new(ifd::IfdDictionary),
            Box::new(generic::GenericContainer),
            Box::new(attributes::DerivedAttributes),
        ])
    }

    pub fn with_stages(stages: Vec<Box<dyn Extractor>>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage over `bytes`. Never fails.
    pub fn run(&self, bytes: &[u8]) -> Extraction {
        let mut merged = Extraction::default();

        for stage in &self.stages {
            let source = stage.source();
            let start = Instant::now();
            let result = panic::catch_unwind(AssertUnwindSafe(|| stage.extract(bytes)))
                .unwrap_or(Err(StageError::Panicked {
                    stage: source.name(),
                }));

            match result {
                Ok(output) => {
                    debug!(
                        "Stage {}: {} entries in {}ms",
                        source.name(),
                        output.entries.len(),
                        start.elapsed().as_millis()
                    );
                    merge(&mut merged, source, output);
                }
                Err(StageError::NoMetadata { stage }) => debug!("Stage {stage}: nothing found"),
                Err(e) => warn!("Metadata stage skipped: {e}"),
            }
        }

        merged
    }
}

fn merge(merged: &mut Extraction, source: Source, output: StageOutput) {
    for (tag, value) in output.entries {
        merged.metadata.insert(source.key(&tag), value);
        merged.entry_count += 1;
    }

    if !source.may_set_coordinates() {
        return;
    }
    match (merged.coordinates, output.coordinates) {
        (None, Some(found)) => {
            debug!("Coordinates from {}: {}", source.name(), found);
            merged.coordinates = Some(found);
        }
        (Some(kept), Some(other)) if kept != other => {
            debug!(
                "Ignoring {} coordinates {} (already have {})",
                source.name(),
                other,
                kept
            );
        }
        _ => {}
    }
}

/// Sniff an ISO-BMFF HEIF/HEIC brand; `image::guess_format` does not know it.
pub(crate) fn is_heif(bytes: &[u8]) -> bool {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return false;
    }
    matches!(
        &bytes[8..12],
        b"heic" | b"heix" | b"heim" | b"heis" | b"hevc" | b"mif1" | b"msf1"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        source: Source,
        entries: Vec<(&'static str, &'static str)>,
        coordinates: Option<Coordinates>,
    }

    impl Extractor for Fixed {
        fn source(&self) -> Source {
            self.source
        }

        fn extract(&self, _bytes: &[u8]) -> Result<StageOutput, StageError> {
            let mut out = StageOutput::default();
            for (k, v) in &self.entries {
                out.push(*k, *v);
            }
            out.coordinates = self.coordinates;
            Ok(out)
        }
    }

    struct Failing(Source);

    impl Extractor for Failing {
        fn source(&self) -> Source {
            self.0
        }

        fn extract(&self, _bytes: &[u8]) -> Result<StageOutput, StageError> {
            Err(StageError::Decode {
                stage: self.0.name(),
                detail: "corrupt".into(),
            })
        }
    }

    struct Panicking;

    impl Extractor for Panicking {
        fn source(&self) -> Source {
            Source::IfdDictionary
        }

        fn extract(&self, _bytes: &[u8]) -> Result<StageOutput, StageError> {
            panic!("decoder bug");
        }
    }

    fn fixed(
        source: Source,
        entries: Vec<(&'static str, &'static str)>,
        coordinates: Option<Coordinates>,
    ) -> Box<dyn Extractor> {
        Box::new(Fixed {
            source,
            entries,
            coordinates,
        })
    }

    #[test]
    fn second_decoder_supplies_missing_coordinates() {
        let cascade = Cascade::with_stages(vec![
            fixed(Source::Container, vec![("Make", "Canon")], None),
            fixed(
                Source::TagStream,
                vec![("Image Make", "Canon")],
                Some(Coordinates::new(48.8584, 2.2945)),
            ),
        ]);
        let out = cascade.run(b"");
        assert_eq!(out.coordinates, Some(Coordinates::new(48.8584, 2.2945)));
    }

    #[test]
    fn first_decoder_coordinates_are_never_overwritten() {
        let cascade = Cascade::with_stages(vec![
            fixed(Source::Container, vec![], Some(Coordinates::new(1.0, 2.0))),
            fixed(Source::TagStream, vec![], Some(Coordinates::new(3.0, 4.0))),
        ]);
        assert_eq!(
            cascade.run(b"").coordinates,
            Some(Coordinates::new(1.0, 2.0))
        );
    }

    #[test]
    fn non_gps_sources_cannot_set_coordinates() {
        let cascade = Cascade::with_stages(vec![fixed(
            Source::IfdDictionary,
            vec![],
            Some(Coordinates::new(3.0, 4.0)),
        )]);
        assert_eq!(cascade.run(b"").coordinates, None);
    }

    #[test]
    fn same_tag_from_different_sources_does_not_collide() {
        let cascade = Cascade::with_stages(vec![
            fixed(Source::Container, vec![("Make", "A")], None),
            fixed(Source::TagStream, vec![("Make", "B")], None),
            fixed(Source::IfdDictionary, vec![("Make", "C")], None),
            fixed(Source::GenericContainer, vec![("Make", "D")], None),
        ]);
        let out = cascade.run(b"");
        assert_eq!(out.metadata.len(), 4);
        assert_eq!(out.metadata["Pillow_Make"], "A");
        assert_eq!(out.metadata["ExifRead_Make"], "B");
        assert_eq!(out.metadata["Piexif_Make"], "C");
        assert_eq!(out.metadata["Hachoir_Make"], "D");
        assert_eq!(out.entry_count, 4);
    }

    #[test]
    fn failing_and_panicking_stages_are_isolated() {
        let cascade = Cascade::with_stages(vec![
            Box::new(Failing(Source::Container)),
            Box::new(Panicking),
            fixed(Source::Derived, vec![("Width", "10")], None),
        ]);
        let out = cascade.run(b"anything");
        assert_eq!(out.metadata.len(), 1);
        assert_eq!(out.metadata["Image_Width"], "10");
    }

    #[test]
    fn entry_count_includes_rewritten_keys() {
        let cascade = Cascade::with_stages(vec![fixed(
            Source::TagStream,
            vec![("X", "1"), ("X", "2")],
            None,
        )]);
        let out = cascade.run(b"");
        assert_eq!(out.metadata.len(), 1);
        assert_eq!(out.metadata["ExifRead_X"], "2");
        assert_eq!(out.entry_count, 2);
    }

    #[test]
    fn garbage_yields_empty_extraction() {
        let out = Cascade::standard().run(b"definitely not an image");
        assert!(out.metadata.is_empty(), "got {:?}", out.metadata);
        assert!(out.coordinates.is_none());
        assert_eq!(out.entry_count, 0);
    }

    #[test]
    fn heif_brand_sniffing() {
        let mut heic = vec![0, 0, 0, 24];
        heic.extend_from_slice(b"ftypheic");
        assert!(is_heif(&heic));
        assert!(!is_heif(b"\xFF\xD8\xFF\xE0"));
        assert!(!is_heif(&[]));
    }
}

//! Shared fixtures for the integration tests: synthetic images and fake
//! geocoding providers. Nothing here touches the network.

#![allow(dead_code)]

use edgequake_imgforensics::pipeline::geo::{
    AddressDetails, GeoCache, GeoService, LandmarkSource, RateGate, ReverseGeocoder,
};
use edgequake_imgforensics::{Coordinates, GeoError};
use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use futures::future::BoxFuture;
use futures::FutureExt;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageEncoder, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Route library logs to the test harness. `RUST_LOG` overrides the level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ── Images ───────────────────────────────────────────────────────────────────

/// Smooth gradient: compresses cleanly, so ELA stays low.
pub fn gradient(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, 128])
    })
}

/// Single colour: every 8x8 block decodes identically, so the ELA
/// difference is constant and the score stays near zero.
pub fn flat(w: u32, h: u32) -> RgbImage {
    RgbImage::from_pixel(w, h, Rgb([96, 140, 180]))
}

pub fn jpeg(img: &RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 92)
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .unwrap();
    buf
}

pub fn png(img: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Degrees, minutes and seconds (to 1/10000 s) of `|value|`.
fn dms(value: f64) -> Vec<Rational> {
    let value = value.abs();
    let degrees = value.trunc();
    let minutes = ((value - degrees) * 60.0).trunc();
    let seconds = ((value - degrees) * 60.0 - minutes) * 60.0;
    vec![
        Rational { num: degrees as u32, denom: 1 },
        Rational { num: minutes as u32, denom: 1 },
        Rational {
            num: (seconds * 10_000.0).round() as u32,
            denom: 10_000,
        },
    ]
}

fn ascii(s: &str) -> Value {
    Value::Ascii(vec![s.as_bytes().to_vec()])
}

/// A JPEG whose APP1 segment carries Make, Model and a GPS position.
pub fn jpeg_with_gps(lat: f64, lon: f64) -> Vec<u8> {
    let fields = [
        Field {
            tag: Tag::Make,
            ifd_num: In::PRIMARY,
            value: ascii("TestCam"),
        },
        Field {
            tag: Tag::Model,
            ifd_num: In::PRIMARY,
            value: ascii("TC-1"),
        },
        Field {
            tag: Tag::GPSLatitudeRef,
            ifd_num: In::PRIMARY,
            value: ascii(if lat < 0.0 { "S" } else { "N" }),
        },
        Field {
            tag: Tag::GPSLatitude,
            ifd_num: In::PRIMARY,
            value: Value::Rational(dms(lat)),
        },
        Field {
            tag: Tag::GPSLongitudeRef,
            ifd_num: In::PRIMARY,
            value: ascii(if lon < 0.0 { "W" } else { "E" }),
        },
        Field {
            tag: Tag::GPSLongitude,
            ifd_num: In::PRIMARY,
            value: Value::Rational(dms(lon)),
        },
    ];

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    let plain = jpeg(&flat(64, 48));
    let segment_len = (2 + 6 + tiff.len()) as u16;
    let mut out = Vec::with_capacity(plain.len() + tiff.len() + 10);
    out.extend_from_slice(&plain[..2]); // SOI
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&plain[2..]);
    out
}

// ── Fake providers ───────────────────────────────────────────────────────────

/// Geocoder that answers with a fixed address (or fails) and counts calls.
pub struct FakeGeocoder {
    pub name: &'static str,
    pub answer: Option<String>,
    pub calls: AtomicUsize,
}

impl FakeGeocoder {
    pub fn answering(name: &'static str, address: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            answer: Some(address.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            answer: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReverseGeocoder for FakeGeocoder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn reverse(&self, _c: Coordinates) -> BoxFuture<'_, Result<String, GeoError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer.clone();
        let provider = self.name;
        async move { answer.ok_or(GeoError::NoResult { provider }) }.boxed()
    }
}

/// Landmark source with a fixed address block.
pub struct FakeLandmarks(pub AddressDetails);

impl LandmarkSource for FakeLandmarks {
    fn address_details(&self, _c: Coordinates) -> BoxFuture<'_, Result<AddressDetails, GeoError>> {
        let details = self.0.clone();
        async move { Ok(details) }.boxed()
    }
}

pub fn eiffel_details() -> AddressDetails {
    [
        ("tourism", "Tour Eiffel"),
        ("road", "Avenue Anatole France"),
        ("city", "Paris"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Service over the given fakes with a fresh cache and no rate spacing.
pub fn service(
    primary: Arc<FakeGeocoder>,
    secondary: Arc<FakeGeocoder>,
    details: AddressDetails,
) -> GeoService {
    GeoService::new(
        primary,
        secondary,
        Arc::new(FakeLandmarks(details)),
        Arc::new(GeoCache::new(16, Duration::from_secs(3600))),
        Arc::new(RateGate::new(Duration::ZERO)),
    )
}

//! Probe decoding: raw image bytes in, grayscale bitmap and marker tag out.
//!
//! The overlay renderer stamps every file it writes with a private EXIF
//! tag (`0x04BC = "overlay"`). The tag is read from the container header
//! before any pixel data is touched, so tagged probes never pay for a
//! full decode.

use std::io::Cursor;

use image::{GrayImage, ImageDecoder, ImageReader};

use crate::types::{DetectError, Dimensions};

/// EXIF tag number the overlay renderer writes.
pub const MARKER_TAG: u16 = 0x04BC;

/// Value of [`MARKER_TAG`] on overlaid files.
pub const MARKER_VALUE: &[u8] = b"overlay";

/// Decode raw image bytes and convert to grayscale.
///
/// Supports PNG, JPEG, BMP, and WebP formats (whatever the `image` crate
/// can decode), using the standard luminance weights.
///
/// # Errors
///
/// Returns [`DetectError::EmptyInput`] if `bytes` is empty.
/// Returns [`DetectError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_grayscale(bytes: &[u8]) -> Result<GrayImage, DetectError> {
    if bytes.is_empty() {
        return Err(DetectError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_luma8())
}

/// Returns `true` if the encoded image carries the overlay marker tag.
///
/// Reads the EXIF block through the `image` decoder first and falls back
/// to scanning the container directly (JPEG APP1, TIFF). Missing or
/// malformed EXIF counts as "no marker".
#[must_use]
pub fn has_marker_tag(bytes: &[u8]) -> bool {
    if let Some(raw) = exif_from_decoder(bytes) {
        return marker_in_exif(&raw);
    }
    let mut cursor = Cursor::new(bytes);
    exif::Reader::new()
        .read_from_container(&mut cursor)
        .is_ok_and(|exif| exif_has_marker(&exif))
}

/// Returns `true` if a raw TIFF-structured EXIF block carries the marker.
#[must_use]
pub fn marker_in_exif(raw: &[u8]) -> bool {
    exif::Reader::new()
        .read_raw(raw.to_vec())
        .is_ok_and(|exif| exif_has_marker(&exif))
}

fn exif_from_decoder(bytes: &[u8]) -> Option<Vec<u8>> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    let mut decoder = reader.into_decoder().ok()?;
    decoder.exif_metadata().ok().flatten()
}

fn exif_has_marker(exif: &exif::Exif) -> bool {
    exif.fields()
        .filter(|field| field.tag.number() == MARKER_TAG)
        .any(|field| match &field.value {
            exif::Value::Ascii(values) => values
                .iter()
                .any(|v| trim_nul(v) == MARKER_VALUE),
            exif::Value::Undefined(bytes, _) | exif::Value::Byte(bytes) => {
                trim_nul(bytes) == MARKER_VALUE
            }
            _ => false,
        })
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| *b != 0)
        .map_or(0, |idx| idx + 1);
    &bytes[..end]
}

#[derive(Debug)]
enum Pixels {
    Decoded(GrayImage),
    /// Decoding was skipped because the marker already decided the verdict.
    Skipped,
    Failed(String),
}

/// One image under examination.
///
/// Construction never fails: a corrupt file becomes a probe whose
/// detection is [`Verdict::Undecidable`](crate::Verdict::Undecidable).
#[derive(Debug)]
pub struct ProbeImage {
    marker: bool,
    pixels: Pixels,
}

impl ProbeImage {
    /// Build a probe from encoded image bytes.
    ///
    /// The marker tag is checked first; tagged probes are not decoded.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if has_marker_tag(bytes) {
            return Self {
                marker: true,
                pixels: Pixels::Skipped,
            };
        }
        let pixels = match decode_grayscale(bytes) {
            Ok(gray) => Pixels::Decoded(gray),
            Err(e) => Pixels::Failed(e.to_string()),
        };
        Self {
            marker: false,
            pixels,
        }
    }

    /// Build an untagged probe from an already decoded bitmap.
    #[must_use]
    pub const fn from_gray(image: GrayImage) -> Self {
        Self {
            marker: false,
            pixels: Pixels::Decoded(image),
        }
    }

    /// Mark this probe as carrying the overlay marker tag.
    #[must_use]
    pub const fn with_marker(mut self) -> Self {
        self.marker = true;
        self
    }

    /// Whether the overlay marker tag is present.
    #[must_use]
    pub const fn has_marker(&self) -> bool {
        self.marker
    }

    /// The decoded grayscale bitmap, if decoding ran and succeeded.
    #[must_use]
    pub const fn image(&self) -> Option<&GrayImage> {
        match &self.pixels {
            Pixels::Decoded(gray) => Some(gray),
            Pixels::Skipped | Pixels::Failed(_) => None,
        }
    }

    /// Pixel dimensions of the decoded bitmap.
    #[must_use]
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.image().map(Dimensions::of)
    }

    /// The decode failure message, if decoding failed.
    #[must_use]
    pub fn decode_error(&self) -> Option<&str> {
        match &self.pixels {
            Pixels::Failed(msg) => Some(msg),
            Pixels::Decoded(_) | Pixels::Skipped => None,
        }
    }
}

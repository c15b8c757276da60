//! Shared types for overlay detection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can build probes and
/// templates without depending on `image` directly.
pub use image::GrayImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimensions value.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of a grayscale image.
    #[must_use]
    pub fn of(image: &GrayImage) -> Self {
        Self::new(image.width(), image.height())
    }

    /// Returns `true` if `other` fits inside `self` on both axes.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        other.width <= self.width && other.height <= self.height
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Target shape of an artwork slot.
///
/// Episodes carry landscape stills; items and seasons carry portrait
/// posters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShapeClass {
    /// Poster artwork (items and seasons).
    #[default]
    Portrait,
    /// Still artwork (episodes).
    Landscape,
}

impl fmt::Display for ShapeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Portrait => f.write_str("portrait"),
            Self::Landscape => f.write_str("landscape"),
        }
    }
}

/// What to report for probes smaller than
/// [`DetectorConfig::min_dimension`] on either axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UndersizedPolicy {
    /// Treat the probe as overlay-free (usable).
    #[default]
    Absent,
    /// Treat the probe as unsafe; callers reject it.
    Undecidable,
}

/// Configuration for [`OverlayDetector`](crate::OverlayDetector).
///
/// Overlay renders are always produced at one fixed canvas per shape
/// class; anything else is assumed to be a user-provided original and is
/// exempt from pixel comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Canvas size of rendered portrait overlays.
    pub portrait: Dimensions,
    /// Canvas size of rendered landscape overlays.
    pub landscape: Dimensions,
    /// Smallest width or height that is compared against templates.
    pub min_dimension: u32,
    /// Correlation at or above which a template counts as found.
    pub match_threshold: f32,
    /// Verdict for probes below `min_dimension`.
    pub undersized: UndersizedPolicy,
}

impl DetectorConfig {
    /// Default portrait canvas (1000x1500).
    pub const DEFAULT_PORTRAIT: Dimensions = Dimensions::new(1000, 1500);
    /// Default landscape canvas (1920x1080).
    pub const DEFAULT_LANDSCAPE: Dimensions = Dimensions::new(1920, 1080);
    /// Default minimum dimension (500 px).
    pub const DEFAULT_MIN_DIMENSION: u32 = 500;
    /// Default correlation threshold.
    pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.95;

    /// The standard canvas for a shape class.
    #[must_use]
    pub const fn standard_size(&self, shape: ShapeClass) -> Dimensions {
        match shape {
            ShapeClass::Portrait => self.portrait,
            ShapeClass::Landscape => self.landscape,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            portrait: Self::DEFAULT_PORTRAIT,
            landscape: Self::DEFAULT_LANDSCAPE,
            min_dimension: Self::DEFAULT_MIN_DIMENSION,
            match_threshold: Self::DEFAULT_MATCH_THRESHOLD,
            undersized: UndersizedPolicy::default(),
        }
    }
}

/// Three-way detection result.
///
/// `Undecidable` is never "safe to use": a probe that could not be
/// examined might itself carry an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// An overlay is present.
    Present,
    /// No overlay was found.
    Absent,
    /// The probe could not be examined.
    Undecidable,
}

impl Verdict {
    /// Returns `true` only for [`Verdict::Absent`].
    #[must_use]
    pub const fn is_clean(self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => f.write_str("overlay present"),
            Self::Absent => f.write_str("overlay absent"),
            Self::Undecidable => f.write_str("undecidable"),
        }
    }
}

/// Why a detection ended the way it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetectionReason {
    /// The probe carries the overlay marker tag.
    MarkerTag,
    /// The probe is not the standard canvas for its shape class.
    NonStandardSize {
        /// Probe dimensions.
        actual: Dimensions,
        /// Standard canvas for the shape class.
        expected: Dimensions,
    },
    /// The probe is below the minimum dimension.
    Undersized {
        /// Probe dimensions.
        actual: Dimensions,
        /// Configured minimum.
        min: u32,
    },
    /// A template correlated above the threshold.
    TemplateMatch {
        /// Template name (file stem).
        template: String,
        /// Peak correlation.
        score: f32,
    },
    /// Every comparable template stayed below the threshold.
    NoTemplateMatch {
        /// Best peak correlation seen, if any template was comparable.
        best: Option<f32>,
    },
    /// The probe bytes could not be decoded.
    Undecodable(String),
}

impl fmt::Display for DetectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarkerTag => f.write_str("overlay marker tag found"),
            Self::NonStandardSize { actual, expected } => {
                write!(f, "non-standard size {actual} (overlay canvas is {expected})")
            }
            Self::Undersized { actual, min } => {
                write!(f, "dimensions {actual} below the {min}px minimum")
            }
            Self::TemplateMatch { template, score } => {
                write!(f, "template {template} matched with score {score:.3}")
            }
            Self::NoTemplateMatch { best: Some(best) } => {
                write!(f, "no template matched (best score {best:.3})")
            }
            Self::NoTemplateMatch { best: None } => f.write_str("no comparable template"),
            Self::Undecodable(msg) => write!(f, "image could not be decoded: {msg}"),
        }
    }
}

/// Outcome of one detection call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// The verdict.
    pub verdict: Verdict,
    /// What decided it.
    pub reason: DetectionReason,
}

impl Detection {
    pub(crate) const fn new(verdict: Verdict, reason: DetectionReason) -> Self {
        Self { verdict, reason }
    }
}

/// Errors that can occur while decoding a probe image.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_overlay_canvases() {
        let config = DetectorConfig::default();
        assert_eq!(config.portrait, Dimensions::new(1000, 1500));
        assert_eq!(config.landscape, Dimensions::new(1920, 1080));
        assert_eq!(config.min_dimension, 500);
        assert!((config.match_threshold - 0.95).abs() < f32::EPSILON);
        assert_eq!(config.undersized, UndersizedPolicy::Absent);
    }

    #[test]
    fn standard_size_follows_shape() {
        let config = DetectorConfig::default();
        assert_eq!(
            config.standard_size(ShapeClass::Portrait),
            config.portrait
        );
        assert_eq!(
            config.standard_size(ShapeClass::Landscape),
            config.landscape
        );
    }

    #[test]
    fn contains_checks_both_axes() {
        let outer = Dimensions::new(10, 20);
        assert!(outer.contains(Dimensions::new(10, 20)));
        assert!(outer.contains(Dimensions::new(3, 4)));
        assert!(!outer.contains(Dimensions::new(11, 4)));
        assert!(!outer.contains(Dimensions::new(3, 21)));
    }

    #[test]
    fn only_absent_is_clean() {
        assert!(Verdict::Absent.is_clean());
        assert!(!Verdict::Present.is_clean());
        assert!(!Verdict::Undecidable.is_clean());
    }

    #[test]
    fn reason_display_is_readable() {
        let reason = DetectionReason::NonStandardSize {
            actual: Dimensions::new(680, 1000),
            expected: Dimensions::new(1000, 1500),
        };
        assert_eq!(
            reason.to_string(),
            "non-standard size 680x1000 (overlay canvas is 1000x1500)",
        );
        assert_eq!(
            DetectionReason::NoTemplateMatch { best: None }.to_string(),
            "no comparable template",
        );
    }

    #[test]
    fn error_empty_input_display() {
        assert_eq!(DetectError::EmptyInput.to_string(), "input image data is empty");
    }

    #[test]
    fn detector_config_serde_round_trip() {
        let config = DetectorConfig {
            min_dimension: 32,
            undersized: UndersizedPolicy::Undecidable,
            ..DetectorConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: DetectorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}

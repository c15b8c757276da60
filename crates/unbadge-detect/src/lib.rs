//! unbadge-detect: decide whether a poster already carries an overlay stamp.
//!
//! Matches a probe image against a fixed, pre-supplied set of overlay
//! templates using zero-mean normalized cross-correlation. This is not
//! general image recognition: only the loaded templates are ever found.
//!
//! Apart from [`TemplateStore::load`], this crate has **no I/O** -- it
//! operates on in-memory byte slices and bitmaps. Fetching images from a
//! catalog or disk lives in the callers.

pub mod correlate;
pub mod detect;
pub mod probe;
pub mod template;
pub mod types;

pub use detect::OverlayDetector;
pub use probe::{MARKER_TAG, MARKER_VALUE, ProbeImage};
pub use template::{OverlayTemplate, TemplateError, TemplateStore};
pub use types::{
    DetectError, Detection, DetectionReason, DetectorConfig, Dimensions, GrayImage, ShapeClass,
    UndersizedPolicy, Verdict,
};

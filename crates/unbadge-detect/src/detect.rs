//! The overlay detector.
//!
//! Checks run in a fixed order and the first decisive one wins:
//!
//! 1. marker tag present → [`Verdict::Present`] (no pixel work)
//! 2. probe undecodable → [`Verdict::Undecidable`]
//! 3. probe not the standard canvas of its shape class → [`Verdict::Absent`]
//! 4. probe below the minimum dimension → per [`UndersizedPolicy`]
//! 5. any template correlating at or above the threshold → [`Verdict::Present`]
//! 6. otherwise → [`Verdict::Absent`]

use std::cell::OnceCell;

use tracing::{debug, error};

use crate::correlate::ImageSpectrum;
use crate::probe::ProbeImage;
use crate::template::TemplateStore;
use crate::types::{
    Detection, DetectionReason, DetectorConfig, Dimensions, ShapeClass, UndersizedPolicy, Verdict,
};

/// Decides whether a probe already carries one of the known overlays.
///
/// Holds the run's template set and thresholds; pure over its inputs and
/// safe to reuse for every detection in a run.
#[derive(Debug, Clone)]
pub struct OverlayDetector {
    templates: TemplateStore,
    config: DetectorConfig,
}

impl OverlayDetector {
    /// Create a detector over a loaded template set.
    #[must_use]
    pub const fn new(templates: TemplateStore, config: DetectorConfig) -> Self {
        Self { templates, config }
    }

    /// The detector's configuration.
    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// The template set.
    #[must_use]
    pub const fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// Examine one probe destined for a slot of the given shape.
    #[must_use]
    pub fn detect(&self, probe: &ProbeImage, shape: ShapeClass) -> Detection {
        if probe.has_marker() {
            return Detection::new(Verdict::Present, DetectionReason::MarkerTag);
        }

        let Some(image) = probe.image() else {
            let msg = probe.decode_error().unwrap_or("no pixel data").to_string();
            return Detection::new(Verdict::Undecidable, DetectionReason::Undecodable(msg));
        };
        let actual = Dimensions::of(image);

        let expected = self.config.standard_size(shape);
        if actual != expected {
            return Detection::new(
                Verdict::Absent,
                DetectionReason::NonStandardSize { actual, expected },
            );
        }

        let min = self.config.min_dimension;
        if actual.width < min || actual.height < min {
            error!("Image Error: Dimensions {actual} must be greater than {min}x{min}");
            let verdict = match self.config.undersized {
                UndersizedPolicy::Absent => Verdict::Absent,
                UndersizedPolicy::Undecidable => Verdict::Undecidable,
            };
            return Detection::new(verdict, DetectionReason::Undersized { actual, min });
        }

        let threshold = self.config.match_threshold;
        let mut best: Option<f32> = None;
        let spectrum = OnceCell::new();
        for template in self.templates.iter() {
            if !actual.contains(template.dimensions()) {
                debug!(
                    template = template.name(),
                    "template {} is larger than probe {actual}, skipped",
                    template.dimensions(),
                );
                continue;
            }
            let Some(peak) = spectrum
                .get_or_init(|| ImageSpectrum::new(image))
                .as_ref()
                .and_then(|s| s.peak(template, Some(threshold)))
            else {
                continue;
            };
            if peak.score >= threshold {
                return Detection::new(
                    Verdict::Present,
                    DetectionReason::TemplateMatch {
                        template: template.name().to_string(),
                        score: peak.score,
                    },
                );
            }
            best = Some(best.map_or(peak.score, |b| b.max(peak.score)));
        }

        Detection::new(Verdict::Absent, DetectionReason::NoTemplateMatch { best })
    }

    /// Decode `bytes` and examine them.
    #[must_use]
    pub fn detect_bytes(&self, bytes: &[u8], shape: ShapeClass) -> Detection {
        self.detect(&ProbeImage::from_bytes(bytes), shape)
    }
}

//! The poster-source waterfall.

use tracing::{debug, info};

use crate::source::{PosterSource, SourceContext};
use crate::types::{ArtworkSlot, CandidateKind, ResolutionOutcome};

/// Evaluates poster sources in priority order and stops at the first hit.
pub struct PosterSourceResolver<'a> {
    ctx: SourceContext<'a>,
    sources: Vec<Box<dyn PosterSource>>,
}

impl<'a> PosterSourceResolver<'a> {
    /// A resolver running the standard five-stage waterfall.
    #[must_use]
    pub fn new(ctx: SourceContext<'a>) -> Self {
        let sources = CandidateKind::WATERFALL
            .into_iter()
            .map(|kind| Box::new(kind) as Box<dyn PosterSource>)
            .collect();
        Self { ctx, sources }
    }

    /// A resolver running a custom stage list, in the order given.
    #[must_use]
    pub fn with_sources(ctx: SourceContext<'a>, sources: Vec<Box<dyn PosterSource>>) -> Self {
        Self { ctx, sources }
    }

    /// The shared stage context.
    #[must_use]
    pub const fn context(&self) -> &SourceContext<'a> {
        &self.ctx
    }

    /// Find a clean replacement for `slot`.
    ///
    /// Each stage is entered only if every earlier stage was empty or
    /// rejected. The outcome carries every rejection along the way.
    #[must_use]
    pub fn resolve(&self, slot: &ArtworkSlot) -> ResolutionOutcome {
        let mut trail = Vec::new();
        for source in &self.sources {
            let stage = source.evaluate(slot, &self.ctx);
            for rejection in &stage.rejected {
                debug!(stage = %source.kind(), "rejected: {rejection}");
            }
            trail.extend(stage.rejected);
            if let Some(chosen) = stage.accepted {
                info!("Image Source: {}", chosen.kind);
                info!("Image Path: {}", chosen.location);
                return ResolutionOutcome {
                    chosen: Some(chosen),
                    trail,
                    alternates: stage.alternates,
                };
            }
        }
        ResolutionOutcome::none(trail)
    }
}

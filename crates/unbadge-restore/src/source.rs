//! Poster sources: one strategy per waterfall stage.
//!
//! This module defines the [`PosterSource`] trait and implements it for
//! [`CandidateKind`], so each stage of the waterfall is selected by its
//! kind. Every stage either produces one accepted [`Candidate`] or a list
//! of [`Rejection`]s explaining why it had nothing.
//!
//! Trust rules:
//!
//! - asset files and remote metadata URLs are accepted unconditionally;
//! - archived originals must detect [`Verdict::Absent`];
//! - user-uploaded catalog alternates must detect [`Verdict::Absent`],
//!   agent-provided ones are accepted directly.
//!
//! [`Verdict::Absent`]: unbadge_detect::Verdict::Absent

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use unbadge_detect::probe::has_marker_tag;
use unbadge_detect::{OverlayDetector, ShapeClass};

use crate::catalog::{Catalog, CatalogImage, CatalogItem};
use crate::types::{
    ArtworkSlot, AssetLocation, Candidate, CandidateKind, ItemKey, Location, RejectReason,
    Rejection,
};

/// Extensions tried for archived originals, in order.
pub const ORIGINAL_EXTENSIONS: [&str; 2] = ["png", "jpg"];

/// Everything a stage needs besides the slot itself.
#[derive(Clone, Copy)]
pub struct SourceContext<'a> {
    /// The catalog holding the slot's alternates.
    pub catalog: &'a dyn Catalog,
    /// Validates candidates that are not trusted by construction.
    pub detector: &'a OverlayDetector,
    /// Folder of archived pre-overlay originals, named by item key.
    pub original_dir: Option<&'a Path>,
}

/// What one stage produced.
#[derive(Debug, Default)]
pub struct StageOutcome {
    /// The stage's accepted candidate.
    pub accepted: Option<Candidate>,
    /// For catalog-native stages, the listing the candidate came from,
    /// positioned just past it.
    pub alternates: Option<AlternateQueue>,
    /// Candidates the stage examined and refused, or why it was empty.
    pub rejected: Vec<Rejection>,
}

impl StageOutcome {
    fn rejected(rejection: Rejection) -> Self {
        Self {
            rejected: vec![rejection],
            ..Self::default()
        }
    }
}

/// Trait for waterfall stages.
pub trait PosterSource {
    /// Which stage this is.
    fn kind(&self) -> CandidateKind;

    /// Look for an acceptable candidate for `slot`.
    fn evaluate(&self, slot: &ArtworkSlot, ctx: &SourceContext<'_>) -> StageOutcome;
}

impl PosterSource for CandidateKind {
    fn kind(&self) -> CandidateKind {
        *self
    }

    fn evaluate(&self, slot: &ArtworkSlot, ctx: &SourceContext<'_>) -> StageOutcome {
        match *self {
            Self::Asset => evaluate_asset(slot),
            Self::Original => evaluate_original(slot, ctx),
            Self::CatalogNative => evaluate_alternates(*self, &slot.item, 0, ctx),
            Self::RemoteMetadata => evaluate_remote(slot),
            Self::ParentCatalogNative => match &slot.parent {
                Some(parent) => evaluate_alternates(*self, parent, 0, ctx),
                None => StageOutcome::rejected(Rejection::missing(*self, "no parent item")),
            },
        }
    }
}

// ───────────────────────────── Asset ──────────────────────────────

fn evaluate_asset(slot: &ArtworkSlot) -> StageOutcome {
    let kind = CandidateKind::Asset;
    let Some(asset) = &slot.asset else {
        return StageOutcome::rejected(Rejection::missing(kind, "no asset directory"));
    };
    let Some(path) = find_asset_file(asset) else {
        info!("No Asset Found");
        return StageOutcome::rejected(Rejection::missing(kind, "no asset found"));
    };

    // Assets are uploaded byte-for-byte. A rendered file in the asset
    // folder would re-introduce the overlay, so say so loudly.
    if std::fs::read(&path).is_ok_and(|bytes| has_marker_tag(&bytes)) {
        warn!(
            "Asset Warning: {} carries the overlay marker tag",
            path.display()
        );
    }

    StageOutcome {
        accepted: Some(Candidate {
            kind,
            location: Location::File(path),
            ordinal: None,
        }),
        ..StageOutcome::default()
    }
}

/// First file (by name) in the asset directory named `<stem>.<ext>`.
#[must_use]
pub fn find_asset_file(asset: &AssetLocation) -> Option<PathBuf> {
    let prefix = format!("{}.", asset.stem);
    let mut matches: Vec<PathBuf> = std::fs::read_dir(&asset.directory)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&prefix) && name.len() > prefix.len())
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

// ──────────────────────────── Original ────────────────────────────

fn evaluate_original(slot: &ArtworkSlot, ctx: &SourceContext<'_>) -> StageOutcome {
    let kind = CandidateKind::Original;
    let Some(dir) = ctx.original_dir else {
        return StageOutcome::rejected(Rejection::missing(kind, "no original folder"));
    };

    let mut rejected = Vec::new();
    for ext in ORIGINAL_EXTENSIONS {
        let path = dir.join(format!("{}.{ext}", slot.item.key));
        if !path.is_file() {
            continue;
        }
        let location = Location::File(path.clone());
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                rejected.push(Rejection {
                    kind,
                    location: Some(location),
                    reason: RejectReason::Unreadable(e.to_string()),
                });
                continue;
            }
        };
        let detection = ctx.detector.detect_bytes(&bytes, slot.shape());
        debug!("Original Poster: {}: {}", detection.verdict, detection.reason);
        if detection.verdict.is_clean() {
            return StageOutcome {
                accepted: Some(Candidate {
                    kind,
                    location,
                    ordinal: None,
                }),
                alternates: None,
                rejected,
            };
        }
        rejected.push(Rejection {
            kind,
            location: Some(location),
            reason: RejectReason::NotClean(detection),
        });
    }

    info!("No Original Found");
    if rejected.is_empty() {
        rejected.push(Rejection::missing(kind, "no original found"));
    }
    StageOutcome {
        rejected,
        ..StageOutcome::default()
    }
}

// ───────────────────────── Remote metadata ────────────────────────

fn evaluate_remote(slot: &ArtworkSlot) -> StageOutcome {
    let kind = CandidateKind::RemoteMetadata;
    match &slot.remote_poster {
        Some(url) => StageOutcome {
            accepted: Some(Candidate {
                kind,
                location: Location::Url(url.clone()),
                ordinal: None,
            }),
            ..StageOutcome::default()
        },
        None => {
            info!("No TMDb Image Found");
            StageOutcome::rejected(Rejection::missing(kind, "no metadata image"))
        }
    }
}

// ──────────────────────── Catalog alternates ──────────────────────

/// Evaluate `owner`'s alternates, returning the `skip`-th accepted one.
fn evaluate_alternates(
    kind: CandidateKind,
    owner: &CatalogItem,
    skip: usize,
    ctx: &SourceContext<'_>,
) -> StageOutcome {
    let images = match ctx.catalog.alternates(&owner.key) {
        Ok(images) => images,
        Err(e) => {
            return StageOutcome::rejected(Rejection {
                kind,
                location: None,
                reason: RejectReason::Unreadable(e.to_string()),
            });
        }
    };
    if images.is_empty() {
        return StageOutcome::rejected(Rejection::missing(kind, "no catalog images"));
    }

    let mut queue = AlternateQueue::new(kind, owner, images);
    let mut rejected = Vec::new();
    let accepted = queue.nth_accepted(skip, ctx, &mut rejected);
    if accepted.is_none() {
        info!("No Clean Plex Image Found");
        rejected.push(Rejection::missing(kind, "no clean catalog image"));
    }
    StageOutcome {
        alternates: accepted.as_ref().map(|_| queue),
        accepted,
        rejected,
    }
}

/// A materialized alternates listing with a cursor.
///
/// The listing is fetched once; retries walk forward through it and never
/// re-query the catalog. The cursor only moves forward, so the number of
/// candidates a queue can ever yield is bounded by [`len`](Self::len).
#[derive(Debug, Clone)]
pub struct AlternateQueue {
    kind: CandidateKind,
    owner: ItemKey,
    shape: ShapeClass,
    images: Vec<CatalogImage>,
    next: usize,
}

impl AlternateQueue {
    /// Wrap a listing fetched for `owner`.
    #[must_use]
    pub fn new(kind: CandidateKind, owner: &CatalogItem, images: Vec<CatalogImage>) -> Self {
        Self {
            kind,
            owner: owner.key.clone(),
            shape: owner.kind.shape(),
            images,
            next: 0,
        }
    }

    /// Stage the listing belongs to.
    #[must_use]
    pub const fn kind(&self) -> CandidateKind {
        self.kind
    }

    /// Item whose alternates these are.
    #[must_use]
    pub const fn owner(&self) -> &ItemKey {
        &self.owner
    }

    /// Total listing length.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.images.len()
    }

    /// Returns `true` if the listing is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Entries not yet visited.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.images.len().saturating_sub(self.next)
    }

    /// Advance to the next acceptable alternate.
    ///
    /// Agent-provided images are accepted as-is. User uploads are fetched
    /// and must detect clean; anything else (overlay present, undecidable,
    /// fetch failure) is pushed onto `rejected`.
    pub fn next_accepted(
        &mut self,
        ctx: &SourceContext<'_>,
        rejected: &mut Vec<Rejection>,
    ) -> Option<Candidate> {
        while self.next < self.images.len() {
            let ordinal = self.next + 1;
            let image = &self.images[self.next];
            self.next += 1;
            if image.selected {
                debug!("Plex Poster {ordinal}: currently selected");
            }

            if let Some(reason) = self.screen(image, ordinal, ctx) {
                rejected.push(Rejection {
                    kind: self.kind,
                    location: Some(image.location.clone()),
                    reason,
                });
                continue;
            }
            return Some(Candidate {
                kind: self.kind,
                location: image.location.clone(),
                ordinal: Some(ordinal),
            });
        }
        None
    }

    /// Skip `skip` acceptable alternates and return the next one.
    pub fn nth_accepted(
        &mut self,
        skip: usize,
        ctx: &SourceContext<'_>,
        rejected: &mut Vec<Rejection>,
    ) -> Option<Candidate> {
        for _ in 0..skip {
            self.next_accepted(ctx, rejected)?;
        }
        self.next_accepted(ctx, rejected)
    }

    /// `None` if the image is acceptable, otherwise why not.
    fn screen(
        &self,
        image: &CatalogImage,
        ordinal: usize,
        ctx: &SourceContext<'_>,
    ) -> Option<RejectReason> {
        if !image.user_uploaded {
            return None;
        }
        let bytes = match ctx.catalog.fetch_image(&image.location) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Plex Poster {ordinal}: failed to fetch: {e}");
                return Some(RejectReason::Unreadable(e.to_string()));
            }
        };
        let detection = ctx.detector.detect_bytes(&bytes, self.shape);
        debug!(
            "Plex Poster {ordinal}: {}: {}",
            detection.verdict, detection.reason
        );
        if detection.verdict.is_clean() {
            None
        } else {
            Some(RejectReason::NotClean(detection))
        }
    }
}

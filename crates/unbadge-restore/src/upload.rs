//! Applying a resolved candidate: upload, bounded retry, label cleanup.

use std::fmt;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogError, CatalogItem};
use crate::source::SourceContext;
use crate::types::{ArtworkSlot, Candidate, ItemKey, Location, Rejection, ResolutionOutcome};

/// Labels removed from an item once its artwork is restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPolicy {
    labels: Vec<String>,
}

impl LabelPolicy {
    /// Label the overlay tool adds to every item it renders.
    pub const BASE_LABEL: &'static str = "Overlay";

    /// The base label plus `extras`, deduplicated case-insensitively.
    #[must_use]
    pub fn new<I, S>(extras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels = vec![Self::BASE_LABEL.to_string()];
        for extra in extras {
            let extra: String = extra.into();
            let extra = extra.trim();
            if !extra.is_empty() && !labels.iter().any(|l| l.eq_ignore_ascii_case(extra)) {
                labels.push(extra.to_string());
            }
        }
        Self { labels }
    }

    /// Every label in the removal set.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The item's labels that are in the removal set, spelled as the item
    /// has them.
    #[must_use]
    pub fn to_remove<'i>(&self, item: &'i CatalogItem) -> Vec<&'i str> {
        item.labels
            .iter()
            .filter(|tag| self.labels.iter().any(|l| l.eq_ignore_ascii_case(tag)))
            .map(String::as_str)
            .collect()
    }
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

/// How applying a slot's outcome ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadStatus {
    /// The catalog accepted an upload.
    Applied,
    /// Dry run: the upload was only logged.
    Previewed,
    /// Resolution found nothing to upload.
    NothingToApply,
    /// Every attempt was refused by the catalog.
    Rejected,
    /// A non-recoverable catalog error stopped the attempt.
    Failed,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => f.write_str("applied"),
            Self::Previewed => f.write_str("previewed"),
            Self::NothingToApply => f.write_str("nothing to apply"),
            Self::Rejected => f.write_str("rejected"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Result of [`UploadAttemptController::apply`].
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// How it ended.
    pub status: UploadStatus,
    /// The candidate that was uploaded (or previewed).
    pub applied: Option<Candidate>,
    /// Upload calls made.
    pub attempts: usize,
    /// Labels actually removed from the item.
    pub labels_removed: Vec<String>,
    /// Last catalog error, if the upload did not succeed.
    pub error: Option<String>,
    /// Alternates passed over while looking for a retry candidate.
    pub rejected: Vec<Rejection>,
}

impl UploadOutcome {
    const fn new(status: UploadStatus) -> Self {
        Self {
            status,
            applied: None,
            attempts: 0,
            labels_removed: Vec::new(),
            error: None,
            rejected: Vec::new(),
        }
    }
}

/// Performs the catalog mutation for a resolved slot.
pub struct UploadAttemptController<'a> {
    ctx: SourceContext<'a>,
    labels: &'a LabelPolicy,
    dry_run: bool,
}

impl<'a> UploadAttemptController<'a> {
    /// Create a controller.
    #[must_use]
    pub const fn new(ctx: SourceContext<'a>, labels: &'a LabelPolicy, dry_run: bool) -> Self {
        Self {
            ctx,
            labels,
            dry_run,
        }
    }

    /// Upload the chosen candidate and reconcile labels.
    ///
    /// A recoverable rejection of a catalog-native candidate advances to
    /// the next accepted entry of the same listing. The number of upload
    /// calls never exceeds the listing's length. Other candidate kinds get
    /// exactly one attempt.
    pub fn apply(&self, outcome: ResolutionOutcome, slot: &ArtworkSlot) -> UploadOutcome {
        let Some(mut candidate) = outcome.chosen else {
            error!("Image Error: No Image Found to Restore");
            return UploadOutcome::new(UploadStatus::NothingToApply);
        };

        if self.dry_run {
            info!("Dry Run: poster not uploaded");
            for label in self.labels.to_remove(&slot.item) {
                info!("Dry Run: {label} Label not removed");
            }
            return UploadOutcome {
                applied: Some(candidate),
                ..UploadOutcome::new(UploadStatus::Previewed)
            };
        }

        let mut queue = outcome
            .alternates
            .filter(|_| candidate.kind.is_catalog_native());
        let max_attempts = queue.as_ref().map_or(1, |q| q.len().max(1));
        let mut rejected = Vec::new();
        let mut attempts = 0;

        while attempts < max_attempts {
            attempts += 1;
            let err = match upload(&self.ctx, &slot.item.key, &candidate.location) {
                Ok(()) => {
                    info!("Poster Successfully Reset");
                    let labels_removed = self.reconcile_labels(&slot.item);
                    return UploadOutcome {
                        status: UploadStatus::Applied,
                        applied: Some(candidate),
                        attempts,
                        labels_removed,
                        error: None,
                        rejected,
                    };
                }
                Err(err) => err,
            };

            if !err.is_recoverable() {
                error!("Upload Error: {err}");
                return UploadOutcome {
                    attempts,
                    error: Some(err.to_string()),
                    rejected,
                    ..UploadOutcome::new(UploadStatus::Failed)
                };
            }

            warn!(
                "Upload Error: {} {} refused: {err}",
                candidate.kind, candidate.location
            );
            let seen = rejected.len();
            let next = queue
                .as_mut()
                .and_then(|q| q.next_accepted(&self.ctx, &mut rejected));
            for rejection in &rejected[seen..] {
                debug!("Retry skipped {rejection}");
            }
            match next {
                Some(next) => {
                    info!("Retrying with {} image {}", next.kind, next.location);
                    candidate = next;
                }
                None => {
                    return UploadOutcome {
                        attempts,
                        error: Some(err.to_string()),
                        rejected,
                        ..UploadOutcome::new(UploadStatus::Rejected)
                    };
                }
            }
        }

        error!("Upload Error: gave up after {attempts} attempts");
        UploadOutcome {
            attempts,
            error: Some(format!("gave up after {attempts} attempts")),
            rejected,
            ..UploadOutcome::new(UploadStatus::Rejected)
        }
    }

    fn reconcile_labels(&self, item: &CatalogItem) -> Vec<String> {
        let mut removed = Vec::new();
        for label in self.labels.to_remove(item) {
            match self.ctx.catalog.remove_label(item, label) {
                Ok(()) => {
                    info!("{label} Label Removed");
                    removed.push(label.to_string());
                }
                Err(e) => warn!("Label Error: failed to remove {label}: {e}"),
            }
        }
        removed
    }
}

/// Files are uploaded by content, everything else by reference.
fn upload(ctx: &SourceContext<'_>, key: &ItemKey, location: &Location) -> Result<(), CatalogError> {
    match location {
        Location::File(path) => ctx.catalog.upload_file(key, path),
        Location::Url(url) => ctx.catalog.upload_url(key, url),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogImage, ItemKind};
    use crate::source::AlternateQueue;
    use crate::test_support::{FakeCatalog, Upload, blank_detector};
    use crate::types::{CandidateKind, RejectReason, SlotKind};

    fn slot_with_labels(labels: &[&str]) -> ArtworkSlot {
        let mut item = CatalogItem::new("5", "Alien", ItemKind::Movie);
        for label in labels {
            item = item.with_label(*label);
        }
        ArtworkSlot::new(item, SlotKind::Primary)
    }

    fn url_candidate(kind: CandidateKind, url: &str, ordinal: Option<usize>) -> Candidate {
        Candidate {
            kind,
            location: Location::Url(url.into()),
            ordinal,
        }
    }

    #[test]
    fn label_policy_always_holds_base_label() {
        let policy = LabelPolicy::new(["Reset", "overlay", " ", "Reset"]);
        assert_eq!(policy.labels(), ["Overlay", "Reset"]);
    }

    #[test]
    fn removal_set_is_intersection_with_item_labels() {
        let policy = LabelPolicy::new(["Badge"]);
        let item = slot_with_labels(&["overlay", "Favorites", "Badge"]).item;
        assert_eq!(policy.to_remove(&item), ["overlay", "Badge"]);
    }

    #[test]
    fn success_removes_labels() {
        let catalog = FakeCatalog::default();
        let detector = blank_detector();
        let policy = LabelPolicy::default();
        let ctx = SourceContext {
            catalog: &catalog,
            detector: &detector,
            original_dir: None,
        };
        let slot = slot_with_labels(&["Overlay", "Kids"]);
        let outcome = ResolutionOutcome {
            chosen: Some(url_candidate(
                CandidateKind::RemoteMetadata,
                "https://tmdb/x.jpg",
                None,
            )),
            trail: Vec::new(),
            alternates: None,
        };
        let result = UploadAttemptController::new(ctx, &policy, false).apply(outcome, &slot);
        assert_eq!(result.status, UploadStatus::Applied);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.labels_removed, ["Overlay"]);
        assert_eq!(
            catalog.uploads(),
            [Upload::Url("5".into(), "https://tmdb/x.jpg".into())]
        );
        assert_eq!(catalog.removed_labels(), [("5".to_string(), "Overlay".to_string())]);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let catalog = FakeCatalog::default();
        let detector = blank_detector();
        let policy = LabelPolicy::default();
        let ctx = SourceContext {
            catalog: &catalog,
            detector: &detector,
            original_dir: None,
        };
        let slot = slot_with_labels(&["Overlay"]);
        let outcome = ResolutionOutcome {
            chosen: Some(url_candidate(CandidateKind::RemoteMetadata, "u", None)),
            trail: Vec::new(),
            alternates: None,
        };
        let result = UploadAttemptController::new(ctx, &policy, true).apply(outcome, &slot);
        assert_eq!(result.status, UploadStatus::Previewed);
        assert_eq!(result.attempts, 0);
        assert!(catalog.uploads().is_empty());
        assert!(catalog.removed_labels().is_empty());
    }

    #[test]
    fn nothing_chosen_is_nothing_to_apply() {
        let catalog = FakeCatalog::default();
        let detector = blank_detector();
        let policy = LabelPolicy::default();
        let ctx = SourceContext {
            catalog: &catalog,
            detector: &detector,
            original_dir: None,
        };
        let result = UploadAttemptController::new(ctx, &policy, false)
            .apply(ResolutionOutcome::none(Vec::new()), &slot_with_labels(&[]));
        assert_eq!(result.status, UploadStatus::NothingToApply);
        assert!(catalog.uploads().is_empty());
    }

    #[test]
    fn remote_rejection_is_not_retried() {
        let catalog = FakeCatalog::default().rejecting_uploads();
        let detector = blank_detector();
        let policy = LabelPolicy::default();
        let ctx = SourceContext {
            catalog: &catalog,
            detector: &detector,
            original_dir: None,
        };
        let outcome = ResolutionOutcome {
            chosen: Some(url_candidate(CandidateKind::RemoteMetadata, "u", None)),
            trail: Vec::new(),
            alternates: None,
        };
        let result =
            UploadAttemptController::new(ctx, &policy, false).apply(outcome, &slot_with_labels(&[]));
        assert_eq!(result.status, UploadStatus::Rejected);
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn catalog_rejection_advances_to_next_alternate() {
        let catalog = FakeCatalog::default().rejecting_url("a");
        let detector = blank_detector();
        let policy = LabelPolicy::default();
        let ctx = SourceContext {
            catalog: &catalog,
            detector: &detector,
            original_dir: None,
        };
        let slot = slot_with_labels(&["Overlay"]);
        let mut queue = AlternateQueue::new(
            CandidateKind::CatalogNative,
            &slot.item,
            vec![CatalogImage::provided("a"), CatalogImage::provided("b")],
        );
        let first = queue.next_accepted(&ctx, &mut Vec::new()).unwrap();
        let outcome = ResolutionOutcome {
            chosen: Some(first),
            trail: Vec::new(),
            alternates: Some(queue),
        };
        let result = UploadAttemptController::new(ctx, &policy, false).apply(outcome, &slot);
        assert_eq!(result.status, UploadStatus::Applied);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.applied.unwrap().ordinal, Some(2));
        assert_eq!(result.labels_removed, ["Overlay"]);
    }

    #[test]
    fn alternates_passed_over_during_retry_are_kept() {
        let catalog = FakeCatalog::default().rejecting_url("a");
        let detector = blank_detector();
        let policy = LabelPolicy::default();
        let ctx = SourceContext {
            catalog: &catalog,
            detector: &detector,
            original_dir: None,
        };
        let slot = slot_with_labels(&[]);
        let mut queue = AlternateQueue::new(
            CandidateKind::CatalogNative,
            &slot.item,
            vec![
                CatalogImage::provided("a"),
                CatalogImage::uploaded("u1"),
                CatalogImage::uploaded("u2"),
                CatalogImage::provided("b"),
            ],
        );
        let first = queue.next_accepted(&ctx, &mut Vec::new()).unwrap();
        let outcome = ResolutionOutcome {
            chosen: Some(first),
            trail: Vec::new(),
            alternates: Some(queue),
        };
        let result = UploadAttemptController::new(ctx, &policy, false).apply(outcome, &slot);
        assert_eq!(result.status, UploadStatus::Applied);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.applied.unwrap().ordinal, Some(4));

        let skipped: Vec<_> = result
            .rejected
            .iter()
            .map(|r| r.location.clone().unwrap())
            .collect();
        assert_eq!(
            skipped,
            [Location::Url("u1".into()), Location::Url("u2".into())]
        );
        assert!(result
            .rejected
            .iter()
            .all(|r| matches!(r.reason, RejectReason::Unreadable(_))));
    }

    #[test]
    fn fatal_error_stops_immediately() {
        let catalog = FakeCatalog::default().failing_uploads();
        let detector = blank_detector();
        let policy = LabelPolicy::default();
        let ctx = SourceContext {
            catalog: &catalog,
            detector: &detector,
            original_dir: None,
        };
        let slot = slot_with_labels(&[]);
        let mut queue = AlternateQueue::new(
            CandidateKind::CatalogNative,
            &slot.item,
            vec![CatalogImage::provided("a"), CatalogImage::provided("b")],
        );
        let first = queue.next_accepted(&ctx, &mut Vec::new()).unwrap();
        let outcome = ResolutionOutcome {
            chosen: Some(first),
            trail: Vec::new(),
            alternates: Some(queue),
        };
        let result = UploadAttemptController::new(ctx, &policy, false).apply(outcome, &slot);
        assert_eq!(result.status, UploadStatus::Failed);
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn label_removal_failure_is_not_fatal() {
        let catalog = FakeCatalog::default().failing_label_removal();
        let detector = blank_detector();
        let policy = LabelPolicy::default();
        let ctx = SourceContext {
            catalog: &catalog,
            detector: &detector,
            original_dir: None,
        };
        let outcome = ResolutionOutcome {
            chosen: Some(url_candidate(CandidateKind::RemoteMetadata, "u", None)),
            trail: Vec::new(),
            alternates: None,
        };
        let result = UploadAttemptController::new(ctx, &policy, false)
            .apply(outcome, &slot_with_labels(&["Overlay"]));
        assert_eq!(result.status, UploadStatus::Applied);
        assert!(result.labels_removed.is_empty());
    }
}

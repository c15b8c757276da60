//! Run configuration for the restore driver.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::catalog::CatalogItem;
use crate::types::ItemKey;
use crate::upload::LabelPolicy;

/// Where in the library a run begins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StartPoint {
    /// Every item, from the top.
    #[default]
    Full,
    /// From the item an interrupted run was working on.
    Checkpoint(ItemKey),
    /// From the first item with this title.
    ResumeTitle(String),
    /// Only the item with this key or title.
    Single(String),
}

impl StartPoint {
    /// Pick the start point from operator requests and the checkpoint.
    ///
    /// An explicit single item beats an explicit resume title, which beats
    /// a stored checkpoint, which beats a full run. `ignore_checkpoint`
    /// drops the checkpoint from consideration.
    #[must_use]
    pub fn choose(
        item: Option<String>,
        resume: Option<String>,
        checkpoint: Option<ItemKey>,
        ignore_checkpoint: bool,
    ) -> Self {
        if let Some(item) = item.filter(|s| !s.trim().is_empty()) {
            return Self::Single(item.trim().to_string());
        }
        if let Some(title) = resume.filter(|s| !s.trim().is_empty()) {
            return Self::ResumeTitle(title.trim().to_string());
        }
        match checkpoint {
            Some(key) if !ignore_checkpoint => Self::Checkpoint(key),
            _ => Self::Full,
        }
    }

    /// Narrow the library listing to the items this run processes.
    ///
    /// A checkpoint or resume title that matches nothing is logged and
    /// the whole listing is kept; an unmatched single item yields nothing.
    #[must_use]
    pub fn select(&self, items: Vec<CatalogItem>) -> Vec<CatalogItem> {
        match self {
            Self::Full => items,
            Self::Checkpoint(key) => {
                info!("Resuming from checkpoint item {key}");
                from_first(items, |item| &item.key == key, || {
                    warn!("Checkpoint item {key} not found in library, starting from the top");
                })
            }
            Self::ResumeTitle(title) => {
                info!("Resume From \"{title}\"");
                from_first(items, |item| item.title == *title, || {
                    warn!("Resume title \"{title}\" not found in library, starting from the top");
                })
            }
            Self::Single(wanted) => {
                let selected: Vec<CatalogItem> = items
                    .into_iter()
                    .filter(|item| {
                        item.key.as_str() == wanted || item.title.eq_ignore_ascii_case(wanted)
                    })
                    .collect();
                if selected.is_empty() {
                    warn!("Item \"{wanted}\" not found in library");
                }
                selected
            }
        }
    }
}

fn from_first(
    items: Vec<CatalogItem>,
    matches: impl Fn(&CatalogItem) -> bool,
    not_found: impl FnOnce(),
) -> Vec<CatalogItem> {
    match items.iter().position(matches) {
        Some(start) => items.into_iter().skip(start).collect(),
        None => {
            not_found();
            items
        }
    }
}

/// Immutable settings for one restore run.
#[derive(Debug, Clone, Default)]
pub struct RestoreConfig {
    /// Root of the curator asset folders.
    pub asset_root: Option<PathBuf>,
    /// Asset files sit directly in the root, prefixed by asset name.
    pub flat_assets: bool,
    /// Folder of archived originals named `<item key>.png|jpg`.
    pub original_dir: Option<PathBuf>,
    /// Also restore season posters of shows.
    pub seasons: bool,
    /// Also restore episode stills of shows.
    pub episodes: bool,
    /// Log what would be uploaded without changing the catalog.
    pub dry_run: bool,
    /// Labels removed after a successful upload.
    pub labels: LabelPolicy,
    /// Where the run begins.
    pub start: StartPoint,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::ItemKind;

    fn library() -> Vec<CatalogItem> {
        vec![
            CatalogItem::new("1", "Alien", ItemKind::Movie),
            CatalogItem::new("2", "Heat", ItemKind::Movie),
            CatalogItem::new("3", "Ran", ItemKind::Movie),
        ]
    }

    fn keys(items: &[CatalogItem]) -> Vec<&str> {
        items.iter().map(|i| i.key.as_str()).collect()
    }

    #[test]
    fn explicit_requests_supersede_checkpoint() {
        let cp = Some(ItemKey::new("2"));
        assert_eq!(
            StartPoint::choose(Some("Ran".into()), Some("Heat".into()), cp.clone(), false),
            StartPoint::Single("Ran".into())
        );
        assert_eq!(
            StartPoint::choose(None, Some("Heat".into()), cp.clone(), false),
            StartPoint::ResumeTitle("Heat".into())
        );
        assert_eq!(
            StartPoint::choose(None, None, cp.clone(), false),
            StartPoint::Checkpoint(ItemKey::new("2"))
        );
        assert_eq!(StartPoint::choose(None, None, cp, true), StartPoint::Full);
        assert_eq!(
            StartPoint::choose(Some("  ".into()), None, None, false),
            StartPoint::Full
        );
    }

    #[test]
    fn checkpoint_resumes_at_recorded_item() {
        let selected = StartPoint::Checkpoint(ItemKey::new("2")).select(library());
        assert_eq!(keys(&selected), ["2", "3"]);
    }

    #[test]
    fn unknown_checkpoint_processes_everything() {
        let selected = StartPoint::Checkpoint(ItemKey::new("99")).select(library());
        assert_eq!(keys(&selected), ["1", "2", "3"]);
    }

    #[test]
    fn resume_title_starts_at_match() {
        let selected = StartPoint::ResumeTitle("Heat".into()).select(library());
        assert_eq!(keys(&selected), ["2", "3"]);
    }

    #[test]
    fn single_item_by_key_or_title() {
        assert_eq!(keys(&StartPoint::Single("3".into()).select(library())), ["3"]);
        assert_eq!(keys(&StartPoint::Single("alien".into()).select(library())), ["1"]);
        assert!(StartPoint::Single("Nope".into()).select(library()).is_empty());
    }
}

//! The run driver: walk the library and restore every slot in turn.
//!
//! Processing is strictly sequential. Before each item the checkpoint is
//! rewritten with the item's key; the cancellation flag is polled between
//! slots. A run that reaches the end of its item list clears the
//! checkpoint, an interrupted run leaves it in place. Single-item runs
//! never touch the checkpoint.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use unbadge_detect::OverlayDetector;

use crate::assets::ItemAssets;
use crate::catalog::{Catalog, CatalogError, CatalogItem, ItemKind, MetadataProvider, ProviderArtwork};
use crate::checkpoint::{CheckpointError, ResumeCheckpoint};
use crate::config::{RestoreConfig, StartPoint};
use crate::guid::{external_ids, media_kind, resolve_tmdb_id};
use crate::report::{RunReport, SlotRecord};
use crate::resolve::PosterSourceResolver;
use crate::source::SourceContext;
use crate::types::{ArtworkSlot, SlotKind};
use crate::upload::UploadAttemptController;

const SEPARATOR_WIDTH: usize = 100;

/// Errors that end a run early.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The library could not be listed.
    #[error("failed to list library items: {0}")]
    Library(#[source] CatalogError),

    /// The resume point could not be persisted.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Restores artwork for a library, one slot at a time.
pub struct Restorer<'a> {
    catalog: &'a dyn Catalog,
    metadata: Option<&'a dyn MetadataProvider>,
    detector: &'a OverlayDetector,
    config: &'a RestoreConfig,
    cancel: &'a AtomicBool,
}

/// Provider data for one top-level item.
#[derive(Default)]
struct RemoteArtwork {
    id: Option<u64>,
    artwork: ProviderArtwork,
}

impl<'a> Restorer<'a> {
    /// Create a driver.
    ///
    /// `metadata` is optional; without it no slot gets a remote-metadata
    /// candidate. Setting `cancel` stops the run at the next slot
    /// boundary.
    #[must_use]
    pub const fn new(
        catalog: &'a dyn Catalog,
        metadata: Option<&'a dyn MetadataProvider>,
        detector: &'a OverlayDetector,
        config: &'a RestoreConfig,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            catalog,
            metadata,
            detector,
            config,
            cancel,
        }
    }

    /// Process every selected item of the library.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Library`] if the library cannot be listed and
    /// [`RunError::Checkpoint`] if the resume point cannot be written.
    /// Per-item failures are recorded in the report instead.
    pub fn run(&self, checkpoint: &mut dyn ResumeCheckpoint) -> Result<RunReport, RunError> {
        let items = self.catalog.library_items().map_err(RunError::Library)?;
        let items = self.config.start.select(items);
        let total = items.len();
        let tracked = !matches!(self.config.start, StartPoint::Single(_));
        let mut report = RunReport::default();

        for (i, listed) in items.iter().enumerate() {
            if self.cancelled() {
                report.interrupted = true;
                break;
            }
            if tracked {
                checkpoint.record(&listed.key)?;
            }
            info!("{}", separator());
            info!("Resetting {}/{total} {}", i + 1, listed.title);
            self.process_item(listed, &mut report);
            if report.interrupted {
                break;
            }
        }

        if report.interrupted {
            if tracked {
                warn!("Run interrupted; it will resume from the recorded item");
            } else {
                warn!("Run interrupted");
            }
        } else if tracked {
            checkpoint.clear()?;
        }
        info!("{}", separator());
        report.log_summary();
        Ok(report)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn process_item(&self, listed: &CatalogItem, report: &mut RunReport) {
        let start = Instant::now();
        let item = match self.catalog.reload(&listed.key) {
            Ok(item) => item,
            Err(e) => {
                error!("Plex Error: {} Failed to Load: {e}", listed.display_title());
                report.push(SlotRecord::failed(
                    &listed.title,
                    &SlotKind::Primary.to_string(),
                    e.to_string(),
                ));
                return;
            }
        };

        let assets = self
            .config
            .asset_root
            .as_deref()
            .and_then(|root| ItemAssets::locate(root, self.config.flat_assets, &item));
        if let Some(assets) = &assets {
            debug!("Asset folder {} at {}", assets.name(), assets.directory().display());
        }
        let remote = self.remote_artwork(&item);

        let mut slot = ArtworkSlot::new(item.clone(), SlotKind::Primary);
        slot.asset = assets.as_ref().map(|a| a.location_for(SlotKind::Primary));
        slot.remote_poster.clone_from(&remote.artwork.poster);
        self.restore_slot(&item.title, &slot, report);
        info!("Run Time: {}", format_elapsed(start.elapsed()));

        if item.kind == ItemKind::Show && (self.config.seasons || self.config.episodes) {
            self.process_seasons(&item, assets.as_ref(), &remote, report);
        }
    }

    fn process_seasons(
        &self,
        show: &CatalogItem,
        assets: Option<&ItemAssets>,
        remote: &RemoteArtwork,
        report: &mut RunReport,
    ) {
        let seasons = match self.catalog.children(&show.key) {
            Ok(seasons) => seasons,
            Err(e) => {
                error!("Plex Error: {} seasons failed to load: {e}", show.title);
                return;
            }
        };

        for listed in seasons {
            if self.cancelled() {
                report.interrupted = true;
                return;
            }
            let number = listed.index.unwrap_or(0);
            let kind = SlotKind::Season { number };
            let start = Instant::now();
            if self.config.seasons {
                info!("{}", separator());
                info!("Resetting {} Season {number}: {}", show.title, listed.title);
            }
            let season = match self.catalog.reload(&listed.key) {
                Ok(season) => season,
                Err(e) => {
                    error!("Plex Error: {} Failed to Load: {e}", listed.display_title());
                    report.push(SlotRecord::failed(&show.title, &kind.to_string(), e.to_string()));
                    continue;
                }
            };

            if self.config.seasons {
                let mut slot = ArtworkSlot::new(season.clone(), kind);
                slot.parent = Some(show.clone());
                slot.asset = assets.map(|a| a.location_for(kind));
                slot.remote_poster = remote.artwork.season_posters.get(&number).cloned();
                self.restore_slot(&show.title, &slot, report);
                info!("Run Time: {}", format_elapsed(start.elapsed()));
            }

            if self.config.episodes {
                self.process_episodes(show, &season, number, assets, remote, report);
                if report.interrupted {
                    return;
                }
            }
        }
    }

    fn process_episodes(
        &self,
        show: &CatalogItem,
        season: &CatalogItem,
        season_number: u32,
        assets: Option<&ItemAssets>,
        remote: &RemoteArtwork,
        report: &mut RunReport,
    ) {
        let stills = self.episode_stills(remote, season_number);
        let episodes = match self.catalog.children(&season.key) {
            Ok(episodes) => episodes,
            Err(e) => {
                error!("Plex Error: {} episodes failed to load: {e}", season.title);
                return;
            }
        };

        for listed in episodes {
            if self.cancelled() {
                report.interrupted = true;
                return;
            }
            let start = Instant::now();
            let number = listed.index.unwrap_or(0);
            let kind = SlotKind::Episode {
                season: listed.parent_index.unwrap_or(season_number),
                episode: number,
            };
            info!("{}", separator());
            info!("Resetting {} Episode {kind}: {}", show.title, listed.title);
            let episode = match self.catalog.reload(&listed.key) {
                Ok(episode) => episode,
                Err(e) => {
                    error!("Plex Error: {} Failed to Load: {e}", listed.display_title());
                    report.push(SlotRecord::failed(&show.title, &kind.to_string(), e.to_string()));
                    continue;
                }
            };

            let mut slot = ArtworkSlot::new(episode, kind);
            slot.parent = Some(season.clone());
            slot.asset = assets.map(|a| a.location_for(kind));
            slot.remote_poster = stills.get(&number).cloned();
            self.restore_slot(&show.title, &slot, report);
            info!("Run Time: {}", format_elapsed(start.elapsed()));
        }
    }

    fn restore_slot(&self, title: &str, slot: &ArtworkSlot, report: &mut RunReport) {
        let ctx = SourceContext {
            catalog: self.catalog,
            detector: self.detector,
            original_dir: self.config.original_dir.as_deref(),
        };
        debug!("Resolving artwork for {}", slot.label());
        let outcome = PosterSourceResolver::new(ctx).resolve(slot);
        let result = UploadAttemptController::new(ctx, &self.config.labels, self.config.dry_run)
            .apply(outcome, slot);
        report.push(SlotRecord::from_upload(title, &slot.kind.to_string(), &result));
    }

    fn remote_artwork(&self, item: &CatalogItem) -> RemoteArtwork {
        let Some(provider) = self.metadata else {
            return RemoteArtwork::default();
        };
        let Some(kind) = media_kind(item.kind) else {
            return RemoteArtwork::default();
        };
        let Some(id) = resolve_tmdb_id(&external_ids(item), kind, provider) else {
            return RemoteArtwork::default();
        };
        match provider.artwork(id, kind) {
            Ok(artwork) => RemoteArtwork {
                id: Some(id),
                artwork,
            },
            Err(e) => {
                error!("TMDb Error: {e}");
                RemoteArtwork {
                    id: Some(id),
                    artwork: ProviderArtwork::default(),
                }
            }
        }
    }

    fn episode_stills(&self, remote: &RemoteArtwork, season: u32) -> BTreeMap<u32, String> {
        let (Some(provider), Some(id)) = (self.metadata, remote.id) else {
            return BTreeMap::new();
        };
        provider.episode_stills(id, season).unwrap_or_else(|e| {
            error!("TMDb Error: Episodes of Season {season} not found: {e}");
            BTreeMap::new()
        })
    }
}

fn separator() -> String {
    "=".repeat(SEPARATOR_WIDTH)
}

/// `H:MM:SS`, whole seconds.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

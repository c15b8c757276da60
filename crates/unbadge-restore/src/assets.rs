//! Locating a curator's asset folder for an item.
//!
//! Assets are organized by the media's own folder name. In nested mode an
//! item owns a directory `<root>/.../<asset name>/` holding `poster.*`,
//! `Season01.*` and `S01E02.*`. In flat mode every file sits directly in
//! the root as `<asset name>.*`, `<asset name>_Season01.*` and so on.

use std::path::{Path, PathBuf};

use tracing::{error, warn};
use walkdir::WalkDir;

use crate::catalog::{CatalogItem, ItemKind};
use crate::types::{AssetLocation, SlotKind};

/// Deepest nesting level searched below the asset root.
pub const MAX_ASSET_DEPTH: usize = 4;

/// Make a folder name safe to use as a file name.
///
/// Removes characters that are invalid on common filesystems, and
/// trailing dots and spaces.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') && !c.is_control())
        .collect();
    cleaned.trim_end_matches(['.', ' ']).to_string()
}

/// Asset name for an item, taken from its first media location.
///
/// Movies are named by the folder containing the file; shows by their
/// own folder.
#[must_use]
pub fn asset_name(item: &CatalogItem) -> Option<String> {
    let location = item.locations.first()?.replace('\\', "/");
    let location = location.trim_end_matches('/');
    let mut parts = location.rsplit('/');
    let name = if item.kind == ItemKind::Movie {
        parts.nth(1)?
    } else {
        parts.next()?
    };
    let name = sanitize_filename(name);
    (!name.is_empty()).then_some(name)
}

/// Where an item's assets live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAssets {
    directory: PathBuf,
    name: String,
    flat: bool,
}

impl ItemAssets {
    /// Find the asset directory for `item` under `root`.
    ///
    /// Returns `None` (after logging) if the item has no location or no
    /// directory matches.
    #[must_use]
    pub fn locate(root: &Path, flat: bool, item: &CatalogItem) -> Option<Self> {
        let Some(name) = asset_name(item) else {
            error!("Asset Error: No video filepath found for {}", item.title);
            return None;
        };

        if flat {
            return Some(Self {
                directory: root.to_path_buf(),
                name,
                flat,
            });
        }

        let direct = root.join(&name);
        let directory = if direct.is_dir() {
            Some(direct)
        } else {
            find_nested(root, &name)
        };
        let Some(directory) = directory else {
            warn!("Asset Warning: No Asset Directory Found");
            return None;
        };
        Some(Self {
            directory,
            name,
            flat,
        })
    }

    /// The directory holding this item's asset files.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The item's asset name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Asset location for one slot of this item.
    #[must_use]
    pub fn location_for(&self, kind: SlotKind) -> AssetLocation {
        let stem = match (kind, self.flat) {
            (SlotKind::Primary, false) => "poster".to_string(),
            (SlotKind::Primary, true) => self.name.clone(),
            (SlotKind::Season { number }, false) => format!("Season{number:02}"),
            (SlotKind::Season { number }, true) => format!("{}_Season{number:02}", self.name),
            (SlotKind::Episode { season, episode }, false) => {
                format!("S{season:02}E{episode:02}")
            }
            (SlotKind::Episode { season, episode }, true) => {
                format!("{}_S{season:02}E{episode:02}", self.name)
            }
        };
        AssetLocation {
            directory: self.directory.clone(),
            stem,
        }
    }
}

/// First directory named `name` at depth 2..=`MAX_ASSET_DEPTH + 1`,
/// shallowest level first, by path order within a level.
fn find_nested(root: &Path, name: &str) -> Option<PathBuf> {
    (2..=MAX_ASSET_DEPTH + 1).find_map(|depth| {
        let mut matches: Vec<PathBuf> = WalkDir::new(root)
            .min_depth(depth)
            .max_depth(depth)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir() && entry.file_name() == name)
            .map(walkdir::DirEntry::into_path)
            .collect();
        matches.sort();
        matches.into_iter().next()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_reserved_characters() {
        assert_eq!(sanitize_filename("Alien: Covenant?"), "Alien Covenant");
        assert_eq!(sanitize_filename("Mr. Robot..  "), "Mr. Robot");
        assert_eq!(sanitize_filename("a\tb"), "ab");
    }

    #[test]
    fn movie_name_is_parent_folder() {
        let item = CatalogItem::new("1", "Heat", ItemKind::Movie)
            .with_location("/media/movies/Heat (1995)/Heat (1995).mkv");
        assert_eq!(asset_name(&item).unwrap(), "Heat (1995)");
    }

    #[test]
    fn show_name_is_own_folder_with_windows_separators() {
        let item = CatalogItem::new("2", "Lost", ItemKind::Show)
            .with_location("D:\\TV\\Lost (2004)\\");
        assert_eq!(asset_name(&item).unwrap(), "Lost (2004)");
    }

    #[test]
    fn no_location_has_no_name() {
        let item = CatalogItem::new("3", "Nothing", ItemKind::Movie);
        assert!(asset_name(&item).is_none());
    }

    #[test]
    fn direct_directory_is_preferred() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("Heat (1995)")).unwrap();
        std::fs::create_dir_all(root.path().join("Crime/Heat (1995)")).unwrap();
        let item = CatalogItem::new("1", "Heat", ItemKind::Movie)
            .with_location("/m/Heat (1995)/Heat.mkv");
        let assets = ItemAssets::locate(root.path(), false, &item).unwrap();
        assert_eq!(assets.directory(), root.path().join("Heat (1995)"));
        assert_eq!(assets.name(), "Heat (1995)");
    }

    #[test]
    fn nested_directory_is_found_shallowest_first() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("a/b/Heat (1995)")).unwrap();
        std::fs::create_dir_all(root.path().join("z/Heat (1995)")).unwrap();
        let item = CatalogItem::new("1", "Heat", ItemKind::Movie)
            .with_location("/m/Heat (1995)/Heat.mkv");
        let assets = ItemAssets::locate(root.path(), false, &item).unwrap();
        assert_eq!(assets.directory(), root.path().join("z/Heat (1995)"));
    }

    #[test]
    fn too_deep_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("1/2/3/4/5/Heat (1995)")).unwrap();
        let item = CatalogItem::new("1", "Heat", ItemKind::Movie)
            .with_location("/m/Heat (1995)/Heat.mkv");
        assert!(ItemAssets::locate(root.path(), false, &item).is_none());
    }

    #[test]
    fn stems_follow_mode() {
        let root = tempfile::tempdir().unwrap();
        let show = CatalogItem::new("2", "Lost", ItemKind::Show).with_location("/tv/Lost");

        let flat = ItemAssets::locate(root.path(), true, &show).unwrap();
        assert_eq!(flat.directory(), root.path());
        assert_eq!(flat.location_for(SlotKind::Primary).stem, "Lost");
        assert_eq!(
            flat.location_for(SlotKind::Season { number: 1 }).stem,
            "Lost_Season01"
        );
        assert_eq!(
            flat.location_for(SlotKind::Episode {
                season: 1,
                episode: 12
            })
            .stem,
            "Lost_S01E12"
        );

        std::fs::create_dir(root.path().join("Lost")).unwrap();
        let nested = ItemAssets::locate(root.path(), false, &show).unwrap();
        assert_eq!(nested.location_for(SlotKind::Primary).stem, "poster");
        assert_eq!(
            nested.location_for(SlotKind::Season { number: 0 }).stem,
            "Season00"
        );
        assert_eq!(
            nested
                .location_for(SlotKind::Episode {
                    season: 2,
                    episode: 3
                })
                .stem,
            "S02E03"
        );
    }
}

//! External ids from catalog guids, and provider id resolution.
//!
//! Catalog items name their metadata source in a primary guid. Modern
//! agents use `plex://` and list the real ids separately (`tmdb://603`,
//! `imdb://tt0133093`, `tvdb://81189`); legacy and NFO agents embed a
//! single id in the primary guid itself.

use tracing::{error, warn};
use url::Url;

use crate::catalog::{CatalogItem, ExternalSource, ItemKind, MediaKind, MetadataProvider};

/// Ids the catalog knows for an item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalIds {
    /// TMDb id.
    pub tmdb: Option<u64>,
    /// TheTVDB id.
    pub tvdb: Option<u64>,
    /// IMDb id (`tt...`).
    pub imdb: Option<String>,
}

impl ExternalIds {
    /// Returns `true` if no id is known.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tmdb.is_none() && self.tvdb.is_none() && self.imdb.is_none()
    }
}

/// Split `scheme://id...` into the last scheme segment and the host.
fn scheme_and_id(guid: &str) -> Option<(String, String)> {
    let url = Url::parse(guid).ok()?;
    let scheme = url.scheme().rsplit('.').next()?.to_string();
    let id = url.host_str()?.to_string();
    Some((scheme, id))
}

/// Extract external ids from an item's primary and secondary guids.
#[must_use]
pub fn external_ids(item: &CatalogItem) -> ExternalIds {
    let mut ids = ExternalIds::default();
    let Some((agent, id)) = item.guid.as_deref().and_then(scheme_and_id) else {
        return ids;
    };

    match agent.as_str() {
        "plex" => {
            for guid in &item.guids {
                let Some((scheme, value)) = scheme_and_id(guid) else {
                    continue;
                };
                match scheme.as_str() {
                    "tmdb" => ids.tmdb = value.parse().ok(),
                    "tvdb" => ids.tvdb = value.parse().ok(),
                    "imdb" => ids.imdb = Some(value),
                    _ => {}
                }
            }
        }
        "imdb" => ids.imdb = Some(id),
        "thetvdb" => ids.tvdb = id.parse().ok(),
        "themoviedb" => ids.tmdb = id.parse().ok(),
        "xbmcnfo" | "xbmcnfotv" => {
            if id.len() > 10 {
                warn!("XBMC NFO Local ID: {id}");
            }
            match id.parse::<u64>() {
                Ok(number) if agent == "xbmcnfo" => ids.tmdb = Some(number),
                Ok(number) => ids.tvdb = Some(number),
                Err(_) => ids.imdb = Some(id),
            }
        }
        _ => {}
    }
    ids
}

/// The provider lookup kind for a catalog item, if it has one.
#[must_use]
pub const fn media_kind(kind: ItemKind) -> Option<MediaKind> {
    match kind {
        ItemKind::Movie => Some(MediaKind::Movie),
        ItemKind::Show => Some(MediaKind::Show),
        ItemKind::Season | ItemKind::Episode | ItemKind::Other => None,
    }
}

/// Resolve an item's TMDb id, asking the provider to translate IMDb or
/// TVDB ids when the catalog has no TMDb id. TVDB ids only resolve shows.
///
/// Provider errors are logged and yield `None`.
pub fn resolve_tmdb_id(
    ids: &ExternalIds,
    kind: MediaKind,
    provider: &dyn MetadataProvider,
) -> Option<u64> {
    if ids.is_empty() {
        error!("Plex Error: No External GUIDs found");
        return None;
    }
    if let Some(tmdb) = ids.tmdb {
        return Some(tmdb);
    }

    let mut found = None;
    if let Some(imdb) = &ids.imdb {
        match provider.find(ExternalSource::Imdb, imdb, kind) {
            Ok(id) => found = id,
            Err(e) => error!("{e}"),
        }
    }
    if found.is_none()
        && kind == MediaKind::Show
        && let Some(tvdb) = ids.tvdb
    {
        match provider.find(ExternalSource::Tvdb, &tvdb.to_string(), kind) {
            Ok(id) => found = id,
            Err(e) => error!("{e}"),
        }
    }
    if found.is_none() {
        error!("Plex Error: TMDb ID Not Found");
    }
    found
}

//! Collaborator traits: the media catalog and the metadata provider.
//!
//! The restore core never talks to a server directly. Concrete clients
//! (see the `unbadge-io` crate) implement these traits; tests implement
//! them in memory.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use unbadge_detect::ShapeClass;

use crate::types::{ItemKey, Location};

/// Errors returned by a [`Catalog`].
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalog refused the request (bad request or not found).
    #[error("catalog rejected the request: {0}")]
    Rejected(String),

    /// The catalog refused our credentials.
    #[error("catalog refused the token (HTTP {0})")]
    Unauthorized(u16),

    /// The server could not be reached or the connection failed mid-call.
    #[error("catalog transport error: {0}")]
    Transport(String),

    /// The response could not be understood.
    #[error("unexpected catalog response: {0}")]
    Parse(String),

    /// A local file could not be read for upload.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl CatalogError {
    /// Whether the failure applies to this request only, so a different
    /// candidate may still succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Errors returned by a [`MetadataProvider`].
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The provider has no entry for the id.
    #[error("metadata provider has no entry for {0}")]
    NotFound(String),

    /// The provider could not be reached or answered with an error status.
    #[error("metadata provider request failed: {0}")]
    Request(String),

    /// The response could not be understood.
    #[error("unexpected metadata provider response: {0}")]
    Parse(String),
}

/// Kind of a catalog entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    /// A film.
    Movie,
    /// A series.
    Show,
    /// A season of a series.
    Season,
    /// An episode of a season.
    Episode,
    /// Anything else the catalog reports.
    Other,
}

impl ItemKind {
    /// Numeric type code used by catalog label edits.
    #[must_use]
    pub const fn type_code(self) -> Option<u8> {
        match self {
            Self::Movie => Some(1),
            Self::Show => Some(2),
            Self::Season => Some(3),
            Self::Episode => Some(4),
            Self::Other => None,
        }
    }

    /// Shape of this kind's artwork: episodes carry landscape stills.
    #[must_use]
    pub const fn shape(self) -> ShapeClass {
        match self {
            Self::Episode => ShapeClass::Landscape,
            Self::Movie | Self::Show | Self::Season | Self::Other => ShapeClass::Portrait,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie => f.write_str("Movie"),
            Self::Show => f.write_str("Show"),
            Self::Season => f.write_str("Season"),
            Self::Episode => f.write_str("Episode"),
            Self::Other => f.write_str("Item"),
        }
    }
}

/// A catalog entity as far as restoration cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Native key.
    pub key: ItemKey,
    /// Display title.
    pub title: String,
    /// Entity kind.
    pub kind: ItemKind,
    /// Primary agent guid (`plex://movie/...`, `com.plexapp.agents.imdb://...`).
    pub guid: Option<String>,
    /// Secondary external guids (`tmdb://123`, `imdb://tt...`).
    pub guids: Vec<String>,
    /// Filesystem locations of the media.
    pub locations: Vec<String>,
    /// Current label tags.
    pub labels: Vec<String>,
    /// Library section the item belongs to.
    pub section: Option<String>,
    /// Season number (seasons) or episode number (episodes).
    pub index: Option<u32>,
    /// Season number of an episode.
    pub parent_index: Option<u32>,
}

impl CatalogItem {
    /// An item with only identity fields set.
    #[must_use]
    pub fn new(key: impl Into<String>, title: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            key: ItemKey::new(key),
            title: title.into(),
            kind,
            guid: None,
            guids: Vec::new(),
            locations: Vec::new(),
            labels: Vec::new(),
            section: None,
            index: None,
            parent_index: None,
        }
    }

    /// Set the primary guid.
    #[must_use]
    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }

    /// Add a secondary guid.
    #[must_use]
    pub fn with_external_guid(mut self, guid: impl Into<String>) -> Self {
        self.guids.push(guid.into());
        self
    }

    /// Add a media location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.locations.push(location.into());
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Set the season or episode number.
    #[must_use]
    pub const fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the parent season number of an episode.
    #[must_use]
    pub const fn with_parent_index(mut self, parent_index: u32) -> Self {
        self.parent_index = Some(parent_index);
        self
    }

    /// Title prefixed by kind, as shown in progress lines.
    #[must_use]
    pub fn display_title(&self) -> String {
        format!("{}: {}", self.kind, self.title)
    }
}

/// One entry in an item's list of alternate images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogImage {
    /// Re-fetchable reference, also usable for upload by reference.
    pub location: Location,
    /// The image was uploaded by a user or tool rather than supplied by a
    /// metadata agent, so it may carry an overlay.
    pub user_uploaded: bool,
    /// The image is the one currently shown.
    pub selected: bool,
}

impl CatalogImage {
    /// An agent-provided image.
    #[must_use]
    pub fn provided(url: impl Into<String>) -> Self {
        Self {
            location: Location::Url(url.into()),
            user_uploaded: false,
            selected: false,
        }
    }

    /// A user-uploaded image.
    #[must_use]
    pub fn uploaded(url: impl Into<String>) -> Self {
        Self {
            location: Location::Url(url.into()),
            user_uploaded: true,
            selected: false,
        }
    }
}

/// The media catalog whose artwork is being restored.
pub trait Catalog {
    /// Every top-level item of the configured library, in catalog order.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn library_items(&self) -> Result<Vec<CatalogItem>, CatalogError>;

    /// Fetch a fresh copy of one item.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be loaded.
    fn reload(&self, key: &ItemKey) -> Result<CatalogItem, CatalogError>;

    /// Children of an item (seasons of a show, episodes of a season).
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn children(&self, key: &ItemKey) -> Result<Vec<CatalogItem>, CatalogError>;

    /// Alternate images for an item, in display order.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn alternates(&self, key: &ItemKey) -> Result<Vec<CatalogImage>, CatalogError>;

    /// Download the bytes behind an alternate's location.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be fetched.
    fn fetch_image(&self, location: &Location) -> Result<Vec<u8>, CatalogError>;

    /// Set an item's artwork from a URL or catalog reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog rejects the upload.
    fn upload_url(&self, key: &ItemKey, url: &str) -> Result<(), CatalogError>;

    /// Set an item's artwork from a local file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the catalog rejects
    /// the upload.
    fn upload_file(&self, key: &ItemKey, path: &Path) -> Result<(), CatalogError>;

    /// Remove one label from an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the edit is refused.
    fn remove_label(&self, item: &CatalogItem, label: &str) -> Result<(), CatalogError>;
}

/// Namespace of an external identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalSource {
    /// IMDb (`tt...`).
    Imdb,
    /// TheTVDB (numeric).
    Tvdb,
}

/// Whether a provider lookup is for a film or a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// A film.
    Movie,
    /// A series.
    Show,
}

/// Artwork URLs the provider holds for one title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderArtwork {
    /// Main poster URL.
    pub poster: Option<String>,
    /// Season number to season poster URL.
    pub season_posters: BTreeMap<u32, String>,
}

/// Remote metadata source for clean artwork.
pub trait MetadataProvider {
    /// Translate an external id into the provider's own id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup request fails.
    fn find(
        &self,
        source: ExternalSource,
        id: &str,
        kind: MediaKind,
    ) -> Result<Option<u64>, MetadataError>;

    /// Poster URLs for a title (and its seasons, for shows).
    ///
    /// # Errors
    ///
    /// Returns an error if the title cannot be fetched.
    fn artwork(&self, id: u64, kind: MediaKind) -> Result<ProviderArtwork, MetadataError>;

    /// Episode number to still URL for one season of a show.
    ///
    /// # Errors
    ///
    /// Returns an error if the season cannot be fetched.
    fn episode_stills(&self, id: u64, season: u32) -> Result<BTreeMap<u32, String>, MetadataError>;
}

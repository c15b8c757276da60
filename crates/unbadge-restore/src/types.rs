//! Slots, candidates, and resolution outcomes.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use unbadge_detect::{Detection, ShapeClass};

use crate::catalog::CatalogItem;
use crate::source::AlternateQueue;

/// The catalog's native key for an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Wrap a catalog key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Which artwork position a slot restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotKind {
    /// The poster of a movie or show.
    Primary,
    /// A season poster.
    Season {
        /// Season number.
        number: u32,
    },
    /// An episode still.
    Episode {
        /// Season number.
        season: u32,
        /// Episode number within the season.
        episode: u32,
    },
}

impl SlotKind {
    /// Target shape: episodes are landscape, everything else portrait.
    #[must_use]
    pub const fn shape(self) -> ShapeClass {
        match self {
            Self::Episode { .. } => ShapeClass::Landscape,
            Self::Primary | Self::Season { .. } => ShapeClass::Portrait,
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("Poster"),
            Self::Season { number } => write!(f, "Season {number}"),
            Self::Episode { season, episode } => write!(f, "S{season:02}E{episode:02}"),
        }
    }
}

/// Where a curator's asset for a slot would live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocation {
    /// Directory to search.
    pub directory: PathBuf,
    /// File name stem; any extension matches.
    pub stem: String,
}

/// One artwork position to restore.
#[derive(Debug, Clone)]
pub struct ArtworkSlot {
    /// The catalog entity whose artwork is replaced.
    pub item: CatalogItem,
    /// Which position this is.
    pub kind: SlotKind,
    /// The entity to borrow alternates from as a last resort.
    pub parent: Option<CatalogItem>,
    /// Where a curator asset would be, when an asset folder is configured.
    pub asset: Option<AssetLocation>,
    /// The metadata provider's image URL for this slot.
    pub remote_poster: Option<String>,
}

impl ArtworkSlot {
    /// A slot for `item` with no asset, parent or remote poster.
    #[must_use]
    pub const fn new(item: CatalogItem, kind: SlotKind) -> Self {
        Self {
            item,
            kind,
            parent: None,
            asset: None,
            remote_poster: None,
        }
    }

    /// The slot's target shape.
    #[must_use]
    pub const fn shape(&self) -> ShapeClass {
        self.kind.shape()
    }

    /// Human-readable name used for log grouping and the report.
    #[must_use]
    pub fn label(&self) -> String {
        match self.kind {
            SlotKind::Primary => self.item.title.clone(),
            SlotKind::Season { number } => {
                if self.item.title == format!("Season {number}") {
                    self.item.title.clone()
                } else {
                    format!("Season {number}: {}", self.item.title)
                }
            }
            SlotKind::Episode { .. } => format!("Episode {}: {}", self.kind, self.item.title),
        }
    }
}

/// Origin of a candidate image, in waterfall priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateKind {
    /// Curator asset folder. Trusted unconditionally.
    Asset,
    /// Archived pre-overlay original. Must detect clean.
    Original,
    /// The item's own catalog alternates. Uploads must detect clean.
    CatalogNative,
    /// The metadata provider's current image. Trusted unconditionally.
    RemoteMetadata,
    /// The parent entity's catalog alternates. Uploads must detect clean.
    ParentCatalogNative,
}

impl CandidateKind {
    /// Every stage in priority order.
    pub const WATERFALL: [Self; 5] = [
        Self::Asset,
        Self::Original,
        Self::CatalogNative,
        Self::RemoteMetadata,
        Self::ParentCatalogNative,
    ];

    /// Whether the candidate comes from a catalog alternates listing.
    #[must_use]
    pub const fn is_catalog_native(self) -> bool {
        matches!(self, Self::CatalogNative | Self::ParentCatalogNative)
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asset => f.write_str("asset"),
            Self::Original => f.write_str("original"),
            Self::CatalogNative => f.write_str("catalog"),
            Self::RemoteMetadata => f.write_str("metadata"),
            Self::ParentCatalogNative => f.write_str("parent catalog"),
        }
    }
}

/// Where a candidate's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    /// A local file, uploaded by content.
    File(PathBuf),
    /// A catalog reference or remote URL, uploaded by reference.
    Url(String),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// A possible replacement image for a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Origin.
    pub kind: CandidateKind,
    /// Where it lives.
    pub location: Location,
    /// Position among catalog alternates (catalog-native kinds only).
    pub ordinal: Option<usize>,
}

/// Why a candidate or a whole stage was passed over.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// The stage had nothing to offer.
    Missing(&'static str),
    /// Detection did not come back clean.
    NotClean(Detection),
    /// The image or listing could not be read.
    Unreadable(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(what) => f.write_str(what),
            Self::NotClean(detection) => {
                write!(f, "{}: {}", detection.verdict, detection.reason)
            }
            Self::Unreadable(msg) => write!(f, "unreadable: {msg}"),
        }
    }
}

/// One entry of the diagnostic trail.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Stage that rejected.
    pub kind: CandidateKind,
    /// The specific candidate, when one was examined.
    pub location: Option<Location>,
    /// Why.
    pub reason: RejectReason,
}

impl Rejection {
    pub(crate) const fn missing(kind: CandidateKind, what: &'static str) -> Self {
        Self {
            kind,
            location: None,
            reason: RejectReason::Missing(what),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} {location}: {}", self.kind, self.reason),
            None => write!(f, "{}: {}", self.kind, self.reason),
        }
    }
}

/// Result of running the waterfall for one slot.
#[derive(Debug)]
pub struct ResolutionOutcome {
    /// The accepted candidate, if any stage produced one.
    pub chosen: Option<Candidate>,
    /// Every rejection on the way, in evaluation order.
    pub trail: Vec<Rejection>,
    /// Unvisited alternates of the listing that produced `chosen`
    /// (catalog-native kinds only), for upload retries.
    pub alternates: Option<AlternateQueue>,
}

impl ResolutionOutcome {
    /// An outcome where no stage produced a candidate.
    #[must_use]
    pub const fn none(trail: Vec<Rejection>) -> Self {
        Self {
            chosen: None,
            trail,
            alternates: None,
        }
    }
}

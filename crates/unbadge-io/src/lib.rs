//! unbadge-io: HTTP clients behind the restore traits.
//!
//! [`PlexCatalog`] implements [`unbadge_restore::Catalog`] against a Plex
//! Media Server and [`TmdbProvider`] implements
//! [`unbadge_restore::MetadataProvider`] against TMDb. Both are blocking
//! and share one timeout per request.

pub mod http;
pub mod plex;
pub mod tmdb;

pub use http::DEFAULT_TIMEOUT_SECS;
pub use plex::{LibraryKind, LibrarySection, PlexCatalog, PlexError};
pub use tmdb::TmdbProvider;

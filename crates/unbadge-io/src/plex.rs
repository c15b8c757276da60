//! Plex Media Server catalog client.
//!
//! Talks to the server's JSON API with the `X-Plex-Token` header. Only
//! the handful of endpoints restoration needs are covered: library
//! listing, item reload, children, poster alternates, poster upload and
//! label removal.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};
use unbadge_restore::{
    Catalog, CatalogError, CatalogImage, CatalogItem, ItemKey, ItemKind, Location,
};

use crate::http::{agent, classify_catalog_failure, join_url, read_body};

const TOKEN_HEADER: &str = "X-Plex-Token";

/// Errors establishing a connection to the configured library.
#[derive(Debug, thiserror::Error)]
pub enum PlexError {
    /// The server could not be queried.
    #[error("Plex Error: {0}")]
    Request(#[from] CatalogError),

    /// No library has the configured name.
    #[error("Plex Error: Library Name: {name} not found. Options: {}", .available.join(", "))]
    LibraryNotFound {
        /// Requested library.
        name: String,
        /// Libraries the server has.
        available: Vec<String>,
    },

    /// The server address is not a usable URL.
    #[error("Plex Error: invalid server URL {url}: {source}")]
    InvalidUrl {
        /// Address as configured.
        url: String,
        /// Parse failure.
        source: url::ParseError,
    },

    /// The library holds something other than movies or shows.
    #[error("Plex Error: Plex Library must be a Movie or Show library (found {0})")]
    UnsupportedLibrary(String),
}

/// Kind of library being restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryKind {
    /// Movies.
    Movie,
    /// TV shows.
    Show,
}

/// One library section on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySection {
    /// Section key.
    pub key: String,
    /// Display name.
    pub title: String,
    /// Content type.
    pub kind: LibraryKind,
}

// ───────────────────────────── Wire types ─────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "MediaContainer")]
    container: MediaContainer,
}

#[derive(Debug, Default, Deserialize)]
struct MediaContainer {
    #[serde(rename = "Directory", default)]
    directories: Vec<SectionEntry>,
    #[serde(rename = "Metadata", default)]
    metadata: Vec<MetadataEntry>,
    #[serde(rename = "librarySectionID")]
    section_id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SectionEntry {
    key: String,
    title: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataEntry {
    rating_key: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "type", default)]
    kind: String,
    guid: Option<String>,
    index: Option<u32>,
    parent_index: Option<u32>,
    #[serde(rename = "librarySectionID")]
    section_id: Option<serde_json::Value>,
    #[serde(rename = "Guid", default)]
    guids: Vec<GuidEntry>,
    #[serde(rename = "Label", default)]
    labels: Vec<LabelEntry>,
    #[serde(rename = "Location", default)]
    locations: Vec<PathEntry>,
    #[serde(rename = "Media", default)]
    media: Vec<MediaEntry>,
}

#[derive(Debug, Deserialize)]
struct GuidEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct LabelEntry {
    tag: String,
}

#[derive(Debug, Deserialize)]
struct PathEntry {
    path: String,
}

#[derive(Debug, Deserialize)]
struct MediaEntry {
    #[serde(rename = "Part", default)]
    parts: Vec<PartEntry>,
}

#[derive(Debug, Deserialize)]
struct PartEntry {
    file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PosterEntry {
    key: String,
    #[serde(default)]
    rating_key: String,
    #[serde(default)]
    selected: bool,
}

fn section_string(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn item_kind(kind: &str) -> ItemKind {
    match kind {
        "movie" => ItemKind::Movie,
        "show" => ItemKind::Show,
        "season" => ItemKind::Season,
        "episode" => ItemKind::Episode,
        _ => ItemKind::Other,
    }
}

impl MetadataEntry {
    fn into_item(self, fallback_section: Option<&str>) -> CatalogItem {
        let mut locations: Vec<String> = self.locations.into_iter().map(|l| l.path).collect();
        locations.extend(
            self.media
                .into_iter()
                .flat_map(|m| m.parts)
                .filter_map(|p| p.file),
        );
        CatalogItem {
            key: ItemKey::new(self.rating_key),
            title: self.title,
            kind: item_kind(&self.kind),
            guid: self.guid,
            guids: self.guids.into_iter().map(|g| g.id).collect(),
            locations,
            labels: self.labels.into_iter().map(|l| l.tag).collect(),
            section: section_string(self.section_id.as_ref())
                .or_else(|| fallback_section.map(str::to_string)),
            index: self.index,
            parent_index: self.parent_index,
        }
    }
}

impl PosterEntry {
    fn into_image(self) -> CatalogImage {
        CatalogImage {
            user_uploaded: self.rating_key.starts_with("upload"),
            selected: self.selected,
            location: Location::Url(self.key),
        }
    }
}

// ───────────────────────────── Client ─────────────────────────────

/// A connected Plex library.
pub struct PlexCatalog {
    agent: ureq::Agent,
    base_url: String,
    token: String,
    section: LibrarySection,
}

impl PlexCatalog {
    /// Connect to `base_url` and find the library named `library`.
    ///
    /// # Errors
    ///
    /// Returns [`PlexError::InvalidUrl`] if `base_url` does not parse,
    /// [`PlexError::Request`] if the server cannot be queried or
    /// refuses the token, [`PlexError::LibraryNotFound`] if no library
    /// has that name, and [`PlexError::UnsupportedLibrary`] if it is not a
    /// movie or show library.
    pub fn connect(
        base_url: &str,
        token: &str,
        library: &str,
        timeout: Duration,
    ) -> Result<Self, PlexError> {
        let agent = agent(timeout);
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        url::Url::parse(&base_url).map_err(|source| PlexError::InvalidUrl {
            url: base_url.clone(),
            source,
        })?;
        let url = join_url(&base_url, "/library/sections");
        let envelope: Envelope = get_json(&agent, &url, token)?;
        info!("Plex Connection Successful");

        let section = select_section(envelope.container.directories, library)?;
        debug!(key = %section.key, "library section selected");
        Ok(Self {
            agent,
            base_url,
            token: token.to_string(),
            section,
        })
    }

    /// The connected library section.
    #[must_use]
    pub const fn section(&self) -> &LibrarySection {
        &self.section
    }

    /// Absolute URL for a server-relative path or a remote URL unchanged.
    fn resolve(&self, location: &str) -> String {
        if location.starts_with('/') {
            join_url(&self.base_url, location)
        } else {
            location.to_string()
        }
    }

    fn metadata(&self, path: &str) -> Result<Vec<CatalogItem>, CatalogError> {
        let envelope: Envelope = get_json(&self.agent, &self.resolve(path), &self.token)?;
        let section = section_string(envelope.container.section_id.as_ref());
        let fallback = section.as_deref().or(Some(self.section.key.as_str()));
        Ok(envelope
            .container
            .metadata
            .into_iter()
            .map(|entry| entry.into_item(fallback))
            .collect())
    }

    fn send(&self, request: ureq::Request) -> Result<ureq::Response, CatalogError> {
        request
            .set(TOKEN_HEADER, &self.token)
            .call()
            .map_err(|e| classify_catalog_failure(&e))
    }
}

fn select_section(sections: Vec<SectionEntry>, library: &str) -> Result<LibrarySection, PlexError> {
    let available: Vec<String> = sections.iter().map(|s| s.title.clone()).collect();
    let Some(entry) = sections.into_iter().find(|s| s.title == library) else {
        return Err(PlexError::LibraryNotFound {
            name: library.to_string(),
            available,
        });
    };
    let kind = match entry.kind.as_str() {
        "movie" => LibraryKind::Movie,
        "show" => LibraryKind::Show,
        other => return Err(PlexError::UnsupportedLibrary(other.to_string())),
    };
    Ok(LibrarySection {
        key: entry.key,
        title: entry.title,
        kind,
    })
}

fn get_json<T: serde::de::DeserializeOwned>(
    agent: &ureq::Agent,
    url: &str,
    token: &str,
) -> Result<T, CatalogError> {
    agent
        .get(url)
        .set(TOKEN_HEADER, token)
        .set("Accept", "application/json")
        .call()
        .map_err(|e| classify_catalog_failure(&e))?
        .into_json()
        .map_err(|e| CatalogError::Parse(e.to_string()))
}

/// Query string for removing one label from an item.
fn label_removal_query(kind: ItemKind, key: &ItemKey, label: &str) -> Option<String> {
    let code = kind.type_code()?;
    Some(format!(
        "type={code}&id={}&{}={}",
        urlencoding::encode(key.as_str()),
        urlencoding::encode("label[].tag.tag-"),
        urlencoding::encode(label)
    ))
}

impl Catalog for PlexCatalog {
    fn library_items(&self) -> Result<Vec<CatalogItem>, CatalogError> {
        self.metadata(&format!("/library/sections/{}/all", self.section.key))
    }

    fn reload(&self, key: &ItemKey) -> Result<CatalogItem, CatalogError> {
        self.metadata(&format!(
            "/library/metadata/{}?includeGuids=1",
            urlencoding::encode(key.as_str())
        ))?
        .into_iter()
        .next()
        .ok_or_else(|| CatalogError::Rejected(format!("item {key} not found")))
    }

    fn children(&self, key: &ItemKey) -> Result<Vec<CatalogItem>, CatalogError> {
        self.metadata(&format!(
            "/library/metadata/{}/children",
            urlencoding::encode(key.as_str())
        ))
    }

    fn alternates(&self, key: &ItemKey) -> Result<Vec<CatalogImage>, CatalogError> {
        #[derive(Deserialize)]
        struct Posters {
            #[serde(rename = "MediaContainer")]
            container: PosterContainer,
        }
        #[derive(Deserialize)]
        struct PosterContainer {
            #[serde(rename = "Metadata", default)]
            metadata: Vec<PosterEntry>,
        }

        let url = self.resolve(&format!(
            "/library/metadata/{}/posters",
            urlencoding::encode(key.as_str())
        ));
        let posters: Posters = get_json(&self.agent, &url, &self.token)?;
        Ok(posters
            .container
            .metadata
            .into_iter()
            .map(PosterEntry::into_image)
            .collect())
    }

    fn fetch_image(&self, location: &Location) -> Result<Vec<u8>, CatalogError> {
        let Location::Url(url) = location else {
            return Err(CatalogError::Rejected(format!(
                "{location} is not a catalog image"
            )));
        };
        let request = self.agent.get(&self.resolve(url));
        let response = if url.starts_with('/') {
            self.send(request)?
        } else {
            request.call().map_err(|e| classify_catalog_failure(&e))?
        };
        read_body(response)
    }

    fn upload_url(&self, key: &ItemKey, url: &str) -> Result<(), CatalogError> {
        // Local references carry the token in the query string.
        let source = if url.starts_with('/') {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!(
                "{}{separator}{TOKEN_HEADER}={}",
                self.resolve(url),
                urlencoding::encode(&self.token)
            )
        } else {
            url.to_string()
        };
        let endpoint = self.resolve(&format!(
            "/library/metadata/{}/posters?url={}",
            urlencoding::encode(key.as_str()),
            urlencoding::encode(&source)
        ));
        self.send(self.agent.post(&endpoint))?;
        Ok(())
    }

    fn upload_file(&self, key: &ItemKey, path: &Path) -> Result<(), CatalogError> {
        let bytes = std::fs::read(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let endpoint = self.resolve(&format!(
            "/library/metadata/{}/posters",
            urlencoding::encode(key.as_str())
        ));
        self.agent
            .post(&endpoint)
            .set(TOKEN_HEADER, &self.token)
            .send_bytes(&bytes)
            .map_err(|e| classify_catalog_failure(&e))?;
        Ok(())
    }

    fn remove_label(&self, item: &CatalogItem, label: &str) -> Result<(), CatalogError> {
        let query = label_removal_query(item.kind, &item.key, label).ok_or_else(|| {
            CatalogError::Rejected(format!("labels cannot be edited on {}", item.kind))
        })?;
        let section = item.section.as_deref().unwrap_or(&self.section.key);
        let endpoint = self.resolve(&format!("/library/sections/{section}/all?{query}"));
        self.send(self.agent.put(&endpoint))?;
        Ok(())
    }
}

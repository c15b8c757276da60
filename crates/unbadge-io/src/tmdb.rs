//! The Movie Database (TMDb) v3 client.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use unbadge_restore::{ExternalSource, MediaKind, MetadataError, MetadataProvider, ProviderArtwork};

use crate::http::{agent, classify_metadata_failure, join_url};

/// Public API root.
pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org";

/// Prefix turning a `poster_path` into a full-size image URL.
pub const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/original";

#[derive(Debug, Deserialize)]
struct FindResults {
    #[serde(default)]
    movie_results: Vec<FoundEntry>,
    #[serde(default)]
    tv_results: Vec<FoundEntry>,
}

#[derive(Debug, Deserialize)]
struct FoundEntry {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Title {
    poster_path: Option<String>,
    #[serde(default)]
    seasons: Vec<SeasonEntry>,
}

#[derive(Debug, Deserialize)]
struct SeasonEntry {
    season_number: u32,
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeasonDetails {
    #[serde(default)]
    episodes: Vec<EpisodeEntry>,
}

#[derive(Debug, Deserialize)]
struct EpisodeEntry {
    episode_number: u32,
    still_path: Option<String>,
}

fn image_url(path: &str) -> String {
    format!("{IMAGE_BASE_URL}{path}")
}

impl Title {
    fn into_artwork(self) -> ProviderArtwork {
        ProviderArtwork {
            poster: self.poster_path.as_deref().map(image_url),
            season_posters: self
                .seasons
                .into_iter()
                .filter_map(|s| Some((s.season_number, image_url(&s.poster_path?))))
                .collect(),
        }
    }
}

impl SeasonDetails {
    fn into_stills(self) -> BTreeMap<u32, String> {
        self.episodes
            .into_iter()
            .filter_map(|e| Some((e.episode_number, image_url(&e.still_path?))))
            .collect()
    }
}

/// Blocking TMDb client authenticated with a v3 API key.
pub struct TmdbProvider {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl TmdbProvider {
    /// A client for the public API.
    #[must_use]
    pub fn new(api_key: &str, timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, api_key, timeout)
    }

    /// A client for a different API root.
    #[must_use]
    pub fn with_base_url(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            agent: agent(timeout),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
        }
    }

    /// Check the API key with a configuration request.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Request`] if the key is refused or the
    /// service cannot be reached.
    pub fn validate(&self) -> Result<(), MetadataError> {
        let _: serde_json::Value = self.get("/3/configuration", &[], "configuration")?;
        info!("TMDb Connection Successful");
        Ok(())
    }

    fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T, MetadataError> {
        let mut request = self
            .agent
            .get(&join_url(&self.base_url, path))
            .query("api_key", &self.api_key);
        for (name, value) in query {
            request = request.query(name, value);
        }
        debug!(path, "tmdb request");
        request
            .call()
            .map_err(|e| classify_metadata_failure(&e, what))?
            .into_json()
            .map_err(|e| MetadataError::Parse(format!("{what}: {e}")))
    }
}

const fn external_source(source: ExternalSource) -> &'static str {
    match source {
        ExternalSource::Imdb => "imdb_id",
        ExternalSource::Tvdb => "tvdb_id",
    }
}

impl MetadataProvider for TmdbProvider {
    fn find(
        &self,
        source: ExternalSource,
        id: &str,
        kind: MediaKind,
    ) -> Result<Option<u64>, MetadataError> {
        let results: FindResults = self.get(
            &format!("/3/find/{}", urlencoding::encode(id)),
            &[("external_source", external_source(source))],
            &format!("find {id}"),
        )?;
        let matches = match kind {
            MediaKind::Movie => results.movie_results,
            MediaKind::Show => results.tv_results,
        };
        Ok(matches.first().map(|entry| entry.id))
    }

    fn artwork(&self, id: u64, kind: MediaKind) -> Result<ProviderArtwork, MetadataError> {
        let (path, what) = match kind {
            MediaKind::Movie => (format!("/3/movie/{id}"), format!("movie {id}")),
            MediaKind::Show => (format!("/3/tv/{id}"), format!("show {id}")),
        };
        let title: Title = self.get(&path, &[], &what)?;
        Ok(title.into_artwork())
    }

    fn episode_stills(&self, id: u64, season: u32) -> Result<BTreeMap<u32, String>, MetadataError> {
        let details: SeasonDetails = self.get(
            &format!("/3/tv/{id}/season/{season}"),
            &[],
            &format!("show {id} season {season}"),
        )?;
        Ok(details.into_stills())
    }
}

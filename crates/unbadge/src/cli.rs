//! Command-line and environment configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use unbadge_detect::{DetectorConfig, TemplateError, UndersizedPolicy};
use unbadge_io::{DEFAULT_TIMEOUT_SECS, PlexError};
use unbadge_restore::{FileCheckpoint, ItemKey, LabelPolicy, RestoreConfig, StartPoint};

/// Fatal configuration problems, reported before any item is touched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Error: No Plex URL Provided")]
    MissingUrl,

    #[error("Error: No Plex Token Provided")]
    MissingToken,

    #[error("Error: No Plex Library Name Provided")]
    MissingLibrary,

    #[error("failed to load {}: {source}", .path.display())]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },

    #[error("Folder Error: {what} Folder Path Not Found: {}", .path.display())]
    FolderNotFound { what: &'static str, path: PathBuf },

    #[error("Folder Error: failed to create {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Templates(#[from] TemplateError),

    #[error(transparent)]
    Plex(#[from] PlexError),
}

/// Restore posters in a Plex library to their overlay-free versions.
///
/// Every option can also be given through its environment variable or a
/// `.env` file in the config folder.
#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Plex URL of the server to connect to.
    #[arg(short, long, env = "PLEX_URL")]
    pub url: Option<String>,

    /// Plex token of the server to connect to.
    #[arg(short, long, env = "PLEX_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Name of the Plex library to reset.
    #[arg(short, long, env = "PLEX_LIBRARY")]
    pub library: Option<String>,

    /// Asset folder scanned for curated posters.
    #[arg(short, long, env = "PMM_ASSET", value_name = "DIR")]
    pub asset: Option<PathBuf>,

    /// Folder of archived pre-overlay originals (`<rating key>.png|jpg`).
    #[arg(short, long, env = "PMM_ORIGINAL", value_name = "DIR")]
    pub original: Option<PathBuf>,

    /// TMDb v3 API key for restoring posters from TMDb.
    #[arg(long, env = "TMDBAPI", hide_env_values = true, value_name = "KEY")]
    pub tmdbapi: Option<String>,

    /// Title of the item to resume restoring from.
    #[arg(long, env = "RESUME", value_name = "TITLE")]
    pub resume: Option<String>,

    /// Restore only this item (rating key or title).
    #[arg(long, env = "ITEM", value_name = "KEY_OR_TITLE")]
    pub item: Option<String>,

    /// Request timeout in seconds.
    #[arg(
        long,
        env = "TIMEOUT",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..),
        value_name = "SECS"
    )]
    pub timeout: u64,

    /// Report what would change without touching Plex.
    #[arg(short, long, env = "DRY_RUN")]
    pub dry_run: bool,

    /// Asset folder uses flat file names (`<name>.png`, `<name>_Season01.png`).
    #[arg(short, long, env = "PMM_FLAT")]
    pub flat: bool,

    /// Also restore season posters.
    #[arg(short, long, env = "SEASON")]
    pub season: bool,

    /// Also restore episode stills.
    #[arg(short, long, env = "EPISODE")]
    pub episode: bool,

    /// Log at trace level, including every request.
    #[arg(long, env = "TRACE")]
    pub trace: bool,

    /// Folder of built-in overlay templates (`*.png`).
    #[arg(long, env = "OVERLAY_DIR", value_name = "DIR")]
    pub overlay_dir: Option<PathBuf>,

    /// Folder holding `.env`, `resume.txt` and user overlay templates.
    #[arg(long, env = "CONFIG_DIR", default_value = "config", value_name = "DIR")]
    pub config_dir: PathBuf,

    /// Extra labels to remove after a restore, besides `Overlay`.
    #[arg(long, env = "REMOVE_LABELS", value_delimiter = ',', value_name = "LABEL")]
    pub remove_labels: Vec<String>,

    /// Start from the top even if an interrupted run left a resume point.
    #[arg(long, env = "IGNORE_CHECKPOINT")]
    pub ignore_checkpoint: bool,

    /// Treat posters too small to examine as unusable instead of clean.
    #[arg(long)]
    pub undersized_undecidable: bool,

    /// Print the final report to stdout as JSON.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Values that must never appear in log output.
    #[must_use]
    pub fn secrets(&self) -> Vec<String> {
        let mut secrets = Vec::new();
        if let Some(url) = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            secrets.push(url.to_string());
            secrets.push(urlencoding::encode(url).into_owned());
            if let Ok(parsed) = url::Url::parse(url)
                && let Some(host) = parsed.host_str()
            {
                secrets.push(match parsed.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                });
            }
        }
        secrets.extend(self.token.iter().cloned());
        secrets.extend(self.tmdbapi.iter().cloned());
        secrets
    }

    /// Validate into a [`RunConfig`].
    ///
    /// Relative defaults (`overlays/`, `assets/`, `originals/`) are looked
    /// up under `base`. The user template folder is created if missing.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for missing connection settings, a
    /// configured folder that does not exist, or a user template folder
    /// that cannot be created.
    pub fn into_config(self, base: &Path) -> Result<RunConfig, ConfigError> {
        let plex_url = required(self.url).ok_or(ConfigError::MissingUrl)?;
        let plex_token = required(self.token).ok_or(ConfigError::MissingToken)?;
        let library = required(self.library).ok_or(ConfigError::MissingLibrary)?;

        let overlay_dir = self.overlay_dir.unwrap_or_else(|| base.join("overlays"));
        let user_overlay_dir = self.config_dir.join("overlays");
        if !user_overlay_dir.exists() {
            std::fs::create_dir_all(&user_overlay_dir).map_err(|source| {
                ConfigError::CreateDir {
                    path: user_overlay_dir.clone(),
                    source,
                }
            })?;
        }

        let asset_root = folder("Asset", self.asset, &base.join("assets"))?;
        let original_dir = folder("Original", self.original, &base.join("originals"))?;

        let detector = DetectorConfig {
            undersized: if self.undersized_undecidable {
                UndersizedPolicy::Undecidable
            } else {
                UndersizedPolicy::Absent
            },
            ..DetectorConfig::default()
        };

        Ok(RunConfig {
            plex_url,
            plex_token,
            library,
            tmdb_key: required(self.tmdbapi),
            timeout: Duration::from_secs(self.timeout),
            overlay_dir,
            user_overlay_dir,
            checkpoint_path: self
                .config_dir
                .join(FileCheckpoint::DEFAULT_FILE_NAME),
            ignore_checkpoint: self.ignore_checkpoint,
            item: self.item,
            resume: self.resume,
            json: self.json,
            detector,
            restore: RestoreConfig {
                asset_root,
                flat_assets: self.flat,
                original_dir,
                seasons: self.season,
                episodes: self.episode,
                dry_run: self.dry_run,
                labels: LabelPolicy::new(self.remove_labels),
                start: StartPoint::Full,
            },
        })
    }
}

fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// An explicitly configured folder, which must exist, or the default when
/// it exists and is not empty.
fn folder(
    what: &'static str,
    configured: Option<PathBuf>,
    default: &Path,
) -> Result<Option<PathBuf>, ConfigError> {
    match configured {
        Some(path) => {
            let path = std::path::absolute(&path).unwrap_or(path);
            if path.is_dir() {
                Ok(Some(path))
            } else {
                Err(ConfigError::FolderNotFound { what, path })
            }
        }
        None => Ok(non_empty_dir(default).then(|| default.to_path_buf())),
    }
}

fn non_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_some())
}

/// Load `<config_dir>/.env` into the process environment.
///
/// Variables already set are left alone. A missing file is not an error.
///
/// # Errors
///
/// Returns [`ConfigError::EnvFile`] if the file exists but cannot be
/// parsed.
pub fn load_env_file(config_dir: &Path) -> Result<bool, ConfigError> {
    let path = config_dir.join(".env");
    dotenvy::from_path(&path)
        .map(|()| true)
        .or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            _ => Err(ConfigError::EnvFile { path, source: err }),
        })
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub plex_url: String,
    pub plex_token: String,
    pub library: String,
    pub tmdb_key: Option<String>,
    pub timeout: Duration,
    /// Built-in template folder.
    pub overlay_dir: PathBuf,
    /// User template folder, matched after the built-in ones.
    pub user_overlay_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    pub ignore_checkpoint: bool,
    pub item: Option<String>,
    pub resume: Option<String>,
    pub json: bool,
    pub detector: DetectorConfig,
    /// Restore settings; `start` is filled in by [`RunConfig::restore_config`].
    pub restore: RestoreConfig,
}

impl RunConfig {
    /// Restore settings with the start point chosen against `stored`, the
    /// resume point an interrupted run left behind.
    #[must_use]
    pub fn restore_config(&self, stored: Option<ItemKey>) -> RestoreConfig {
        RestoreConfig {
            start: StartPoint::choose(
                self.item.clone(),
                self.resume.clone(),
                stored,
                self.ignore_checkpoint,
            ),
            ..self.restore.clone()
        }
    }
}

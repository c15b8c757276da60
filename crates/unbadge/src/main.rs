//! unbadge: restore overlay-free posters for a Plex library.
//!
//! Configuration comes from flags, environment variables and
//! `<config_dir>/.env`. Ctrl-C stops the run after the current slot and
//! leaves a resume point in `<config_dir>/resume.txt`.
//!
//! Exit status: 0 on success, 1 on a fatal error, 2 when some slots
//! failed, 130 when interrupted.

mod cli;
mod logging;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use clap::Parser;
use tracing::{error, info, warn};
use unbadge_detect::{OverlayDetector, TemplateStore};
use unbadge_io::{PlexCatalog, TmdbProvider};
use unbadge_restore::run::format_elapsed;
use unbadge_restore::{
    CheckpointError, FileCheckpoint, MetadataProvider, Restorer, ResumeCheckpoint, RunError,
    RunReport,
};

use crate::cli::{Cli, ConfigError, RunConfig};
use crate::logging::Redactor;

#[derive(Debug, thiserror::Error)]
enum Fatal {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("failed to write report: {0}")]
    Report(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    // A first parse finds the config folder; the second sees its `.env`.
    let env_file = cli::load_env_file(&Cli::parse().config_dir);
    let cli = Cli::parse();

    logging::init(cli.trace, Redactor::new(cli.secrets()));

    let started = Instant::now();
    let result = env_file
        .map_err(Fatal::from)
        .and_then(|_| run(cli));
    info!("Runtime: {}", format_elapsed(started.elapsed()));

    match result {
        Ok(report) => finished(&report),
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Exit status of a run that reached its end or was interrupted.
fn finished(report: &RunReport) -> ExitCode {
    if report.interrupted {
        ExitCode::from(130)
    } else if report.has_failures() {
        warn!("Some slots failed, see the summary above");
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

fn run(cli: Cli) -> Result<RunReport, Fatal> {
    info!("Complete Overlay Reset");
    let config = cli.into_config(Path::new("."))?;

    let templates = TemplateStore::load(&config.overlay_dir, Some(&config.user_overlay_dir))
        .map_err(ConfigError::from)?;
    info!("{} overlay templates loaded", templates.len());
    let detector = OverlayDetector::new(templates, config.detector.clone());

    let catalog = PlexCatalog::connect(
        &config.plex_url,
        &config.plex_token,
        &config.library,
        config.timeout,
    )
    .map_err(ConfigError::from)?;

    let tmdb = connect_tmdb(&config);

    let mut checkpoint = FileCheckpoint::new(&config.checkpoint_path);
    let restore = config.restore_config(checkpoint.load()?);

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Interrupt handler unavailable, Ctrl-C will stop immediately: {e}");
    }

    if restore.dry_run {
        info!("Dry Run: no changes will be made in Plex");
    }
    let report = Restorer::new(
        &catalog,
        tmdb.as_ref().map(|t| t as &dyn MetadataProvider),
        &detector,
        &restore,
        &cancel,
    )
    .run(&mut checkpoint)?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(report)
}

/// A TMDb client if a key is configured and accepted.
fn connect_tmdb(config: &RunConfig) -> Option<TmdbProvider> {
    let key = config.tmdb_key.as_deref()?;
    let provider = TmdbProvider::new(key, config.timeout);
    match provider.validate() {
        Ok(()) => Some(provider),
        Err(e) => {
            error!("TMDb Error: {e}");
            None
        }
    }
}

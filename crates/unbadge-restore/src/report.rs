//! Per-run report: one row per processed slot.

use std::fmt;

use serde::Serialize;
use tracing::info;

use crate::types::CandidateKind;
use crate::upload::{UploadOutcome, UploadStatus};

/// Final status of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotStatus {
    /// A clean image was uploaded.
    Restored,
    /// Dry run: a clean image was found but not uploaded.
    Previewed,
    /// No stage produced an acceptable image.
    NotFound,
    /// The item could not be loaded or every upload failed.
    Failed,
}

impl From<UploadStatus> for SlotStatus {
    fn from(status: UploadStatus) -> Self {
        match status {
            UploadStatus::Applied => Self::Restored,
            UploadStatus::Previewed => Self::Previewed,
            UploadStatus::NothingToApply => Self::NotFound,
            UploadStatus::Rejected | UploadStatus::Failed => Self::Failed,
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restored => f.write_str("Restored"),
            Self::Previewed => f.write_str("Previewed"),
            Self::NotFound => f.write_str("Not Found"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}

/// One row of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotRecord {
    /// Title of the top-level item.
    pub title: String,
    /// Which slot (`Poster`, `Season 1`, `S01E02`).
    pub slot: String,
    /// Outcome.
    pub status: SlotStatus,
    /// Stage that supplied the image.
    pub source: Option<CandidateKind>,
    /// Upload calls made.
    pub attempts: usize,
    /// Labels removed after the upload.
    pub labels_removed: Vec<String>,
    /// Error or diagnostic text.
    pub detail: Option<String>,
}

impl SlotRecord {
    /// Row for a slot whose outcome was applied.
    #[must_use]
    pub fn from_upload(title: &str, slot: &str, outcome: &UploadOutcome) -> Self {
        Self {
            title: title.to_string(),
            slot: slot.to_string(),
            status: outcome.status.into(),
            source: outcome.applied.as_ref().map(|c| c.kind),
            attempts: outcome.attempts,
            labels_removed: outcome.labels_removed.clone(),
            detail: outcome.error.clone(),
        }
    }

    /// Row for a slot that failed before resolution.
    #[must_use]
    pub fn failed(title: &str, slot: &str, detail: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            slot: slot.to_string(),
            status: SlotStatus::Failed,
            source: None,
            attempts: 0,
            labels_removed: Vec::new(),
            detail: Some(detail.into()),
        }
    }
}

/// Everything a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Rows in processing order.
    pub records: Vec<SlotRecord>,
    /// The run was stopped by an interrupt before finishing.
    pub interrupted: bool,
}

impl RunReport {
    /// Append a row.
    pub fn push(&mut self, record: SlotRecord) {
        self.records.push(record);
    }

    /// Rows with the given status.
    #[must_use]
    pub fn count(&self, status: SlotStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Returns `true` if any row failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.count(SlotStatus::Failed) > 0
    }

    /// Log the summary table line by line.
    pub fn log_summary(&self) {
        for line in self.to_string().lines() {
            info!("{line}");
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title_width = self
            .records
            .iter()
            .map(|r| r.title.chars().count())
            .max()
            .unwrap_or(0)
            .max("Title".len());
        let slot_width = self
            .records
            .iter()
            .map(|r| r.slot.chars().count())
            .max()
            .unwrap_or(0)
            .max("Slot".len());

        writeln!(
            f,
            "{:<title_width$} | {:<slot_width$} | {:<9} | Source",
            "Title", "Slot", "Status"
        )?;
        writeln!(
            f,
            "{}-+-{}-+-{}-+-{}",
            "-".repeat(title_width),
            "-".repeat(slot_width),
            "-".repeat(9),
            "-".repeat(14)
        )?;
        for record in &self.records {
            let source = record
                .source
                .map_or_else(|| "-".to_string(), |s| s.to_string());
            writeln!(
                f,
                "{:<title_width$} | {:<slot_width$} | {:<9} | {source}",
                record.title,
                record.slot,
                record.status.to_string()
            )?;
        }
        write!(
            f,
            "{} restored, {} previewed, {} not found, {} failed",
            self.count(SlotStatus::Restored),
            self.count(SlotStatus::Previewed),
            self.count(SlotStatus::NotFound),
            self.count(SlotStatus::Failed),
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

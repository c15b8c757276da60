//! unbadge-restore: find and apply overlay-free artwork for catalog items.
//!
//! For each artwork slot (an item's poster, a season poster, an episode
//! still) a fixed waterfall of sources is searched:
//!
//! 1. curator asset folder
//! 2. archived pre-overlay original
//! 3. the item's own catalog alternates
//! 4. the remote metadata provider
//! 5. the parent item's catalog alternates
//!
//! Candidates that might themselves carry an overlay are checked with
//! [`unbadge_detect::OverlayDetector`] before being trusted. The chosen
//! image is uploaded with a bounded retry over the same listing, and the
//! overlay labels are removed afterwards.
//!
//! The catalog and metadata provider are traits ([`Catalog`],
//! [`MetadataProvider`]); concrete HTTP clients live in `unbadge-io`.

pub mod assets;
pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod guid;
pub mod report;
pub mod resolve;
pub mod run;
pub mod source;
pub mod types;
pub mod upload;

pub use catalog::{
    Catalog, CatalogError, CatalogImage, CatalogItem, ExternalSource, ItemKind, MediaKind,
    MetadataError, MetadataProvider, ProviderArtwork,
};
pub use checkpoint::{CheckpointError, FileCheckpoint, ResumeCheckpoint};
pub use config::{RestoreConfig, StartPoint};
pub use report::{RunReport, SlotRecord, SlotStatus};
pub use resolve::PosterSourceResolver;
pub use run::{Restorer, RunError};
pub use source::{AlternateQueue, PosterSource, SourceContext};
pub use types::{
    ArtworkSlot, AssetLocation, Candidate, CandidateKind, ItemKey, Location, RejectReason, Rejection,
    ResolutionOutcome, SlotKind,
};
pub use upload::{LabelPolicy, UploadAttemptController, UploadOutcome, UploadStatus};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    //! In-memory catalog for unit tests.

    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, HashSet};
    use std::path::{Path, PathBuf};

    use unbadge_detect::{DetectorConfig, OverlayDetector, TemplateStore};

    use crate::catalog::{Catalog, CatalogError, CatalogImage, CatalogItem};
    use crate::types::{ItemKey, Location};

    /// A detector with no templates and default thresholds.
    pub fn blank_detector() -> OverlayDetector {
        OverlayDetector::new(TemplateStore::default(), DetectorConfig::default())
    }

    /// One recorded upload call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Upload {
        Url(String, String),
        File(String, PathBuf),
    }

    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    enum UploadMode {
        #[default]
        Accept,
        Reject,
        Fail,
    }

    #[derive(Default)]
    pub struct FakeCatalog {
        items: Vec<CatalogItem>,
        children: HashMap<String, Vec<CatalogItem>>,
        alternates: HashMap<String, Vec<CatalogImage>>,
        images: HashMap<String, Vec<u8>>,
        unloadable: HashSet<String>,
        rejected_urls: HashSet<String>,
        upload_mode: UploadMode,
        label_removal_fails: bool,
        fetches: Cell<usize>,
        uploads: RefCell<Vec<Upload>>,
        removed: RefCell<Vec<(String, String)>>,
    }

    impl FakeCatalog {
        pub fn with_item(mut self, item: CatalogItem) -> Self {
            self.items.push(item);
            self
        }

        pub fn with_children(mut self, key: &str, children: Vec<CatalogItem>) -> Self {
            self.children.insert(key.to_string(), children);
            self
        }

        pub fn with_alternates(mut self, key: &str, images: Vec<CatalogImage>) -> Self {
            self.alternates.insert(key.to_string(), images);
            self
        }

        #[allow(dead_code)]
        pub fn with_image(mut self, url: &str, bytes: Vec<u8>) -> Self {
            self.images.insert(url.to_string(), bytes);
            self
        }

        pub fn unloadable(mut self, key: &str) -> Self {
            self.unloadable.insert(key.to_string());
            self
        }

        pub fn rejecting_url(mut self, url: &str) -> Self {
            self.rejected_urls.insert(url.to_string());
            self
        }

        pub fn rejecting_uploads(mut self) -> Self {
            self.upload_mode = UploadMode::Reject;
            self
        }

        pub fn failing_uploads(mut self) -> Self {
            self.upload_mode = UploadMode::Fail;
            self
        }

        pub fn failing_label_removal(mut self) -> Self {
            self.label_removal_fails = true;
            self
        }

        pub fn fetches(&self) -> usize {
            self.fetches.get()
        }

        pub fn uploads(&self) -> Vec<Upload> {
            self.uploads.borrow().clone()
        }

        pub fn removed_labels(&self) -> Vec<(String, String)> {
            self.removed.borrow().clone()
        }

        fn find(&self, key: &ItemKey) -> Option<&CatalogItem> {
            self.items
                .iter()
                .chain(self.children.values().flatten())
                .find(|item| &item.key == key)
        }

        fn check_upload(&self, target: &str) -> Result<(), CatalogError> {
            match self.upload_mode {
                UploadMode::Reject => Err(CatalogError::Rejected("400 Bad Request".into())),
                UploadMode::Fail => Err(CatalogError::Transport("connection reset".into())),
                UploadMode::Accept if self.rejected_urls.contains(target) => {
                    Err(CatalogError::Rejected("404 Not Found".into()))
                }
                UploadMode::Accept => Ok(()),
            }
        }
    }

    impl Catalog for FakeCatalog {
        fn library_items(&self) -> Result<Vec<CatalogItem>, CatalogError> {
            Ok(self.items.clone())
        }

        fn reload(&self, key: &ItemKey) -> Result<CatalogItem, CatalogError> {
            if self.unloadable.contains(key.as_str()) {
                return Err(CatalogError::Rejected("404 Not Found".into()));
            }
            self.find(key)
                .cloned()
                .ok_or_else(|| CatalogError::Rejected(format!("no item {key}")))
        }

        fn children(&self, key: &ItemKey) -> Result<Vec<CatalogItem>, CatalogError> {
            Ok(self.children.get(key.as_str()).cloned().unwrap_or_default())
        }

        fn alternates(&self, key: &ItemKey) -> Result<Vec<CatalogImage>, CatalogError> {
            Ok(self.alternates.get(key.as_str()).cloned().unwrap_or_default())
        }

        fn fetch_image(&self, location: &Location) -> Result<Vec<u8>, CatalogError> {
            self.fetches.set(self.fetches.get() + 1);
            let Location::Url(url) = location else {
                return Err(CatalogError::Rejected("not a url".into()));
            };
            self.images
                .get(url)
                .cloned()
                .ok_or_else(|| CatalogError::Rejected(format!("no image {url}")))
        }

        fn upload_url(&self, key: &ItemKey, url: &str) -> Result<(), CatalogError> {
            self.uploads
                .borrow_mut()
                .push(Upload::Url(key.to_string(), url.to_string()));
            self.check_upload(url)
        }

        fn upload_file(&self, key: &ItemKey, path: &Path) -> Result<(), CatalogError> {
            self.uploads
                .borrow_mut()
                .push(Upload::File(key.to_string(), path.to_path_buf()));
            self.check_upload(&path.to_string_lossy())
        }

        fn remove_label(&self, item: &CatalogItem, label: &str) -> Result<(), CatalogError> {
            if self.label_removal_fails {
                return Err(CatalogError::Rejected("label edit refused".into()));
            }
            self.removed
                .borrow_mut()
                .push((item.key.to_string(), label.to_string()));
            Ok(())
        }
    }
}

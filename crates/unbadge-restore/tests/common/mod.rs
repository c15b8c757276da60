//! Shared fixtures: synthetic posters and an in-memory catalog.

#![allow(dead_code, clippy::unwrap_used)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use image::{GrayImage, Luma};
use unbadge_detect::{Dimensions, DetectorConfig, OverlayDetector, OverlayTemplate, TemplateStore};
use unbadge_restore::{Catalog, CatalogError, CatalogImage, CatalogItem, ItemKey, Location};

/// Portrait canvas used by the test detector.
pub const PORTRAIT: (u32, u32) = (40, 60);

/// Deterministic grayscale noise (xorshift32).
pub fn noise(width: u32, height: u32, seed: u32) -> GrayImage {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    GrayImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        Luma([state.to_le_bytes()[1]])
    })
}

/// The overlay stamp the test detector knows about.
pub fn stamp() -> GrayImage {
    noise(10, 8, 4321)
}

/// A portrait poster, optionally stamped with the overlay.
pub fn poster(seed: u32, stamped: bool) -> Vec<u8> {
    let mut img = noise(PORTRAIT.0, PORTRAIT.1, seed);
    if stamped {
        image::imageops::replace(&mut img, &stamp(), 24, 46);
    }
    encode_png(&img)
}

pub fn encode_png(img: &GrayImage) -> Vec<u8> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::L8,
    )
    .unwrap();
    buf
}

/// A detector over [`stamp`] with small canvases.
pub fn detector() -> OverlayDetector {
    let config = DetectorConfig {
        portrait: Dimensions::new(PORTRAIT.0, PORTRAIT.1),
        landscape: Dimensions::new(64, 36),
        min_dimension: 16,
        ..DetectorConfig::default()
    };
    OverlayDetector::new(
        TemplateStore::from_templates(vec![OverlayTemplate::new("stamp", stamp())]),
        config,
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch(String),
    UploadUrl(String, String),
    UploadFile(String, String),
    RemoveLabel(String, String),
}

/// In-memory catalog recording every call.
#[derive(Default)]
pub struct MemoryCatalog {
    pub items: Vec<CatalogItem>,
    pub children: HashMap<String, Vec<CatalogItem>>,
    pub alternates: HashMap<String, Vec<CatalogImage>>,
    pub images: HashMap<String, Vec<u8>>,
    pub reject_uploads: bool,
    pub calls: RefCell<Vec<Call>>,
}

impl MemoryCatalog {
    pub fn uploads(&self) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::UploadUrl(..) | Call::UploadFile(..)))
            .cloned()
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::Fetch(_)))
            .count()
    }

    fn upload_result(&self) -> Result<(), CatalogError> {
        if self.reject_uploads {
            Err(CatalogError::Rejected("400 Bad Request".into()))
        } else {
            Ok(())
        }
    }
}

impl Catalog for MemoryCatalog {
    fn library_items(&self) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(self.items.clone())
    }

    fn reload(&self, key: &ItemKey) -> Result<CatalogItem, CatalogError> {
        self.items
            .iter()
            .chain(self.children.values().flatten())
            .find(|item| &item.key == key)
            .cloned()
            .ok_or_else(|| CatalogError::Rejected(format!("404 {key}")))
    }

    fn children(&self, key: &ItemKey) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(self.children.get(key.as_str()).cloned().unwrap_or_default())
    }

    fn alternates(&self, key: &ItemKey) -> Result<Vec<CatalogImage>, CatalogError> {
        Ok(self.alternates.get(key.as_str()).cloned().unwrap_or_default())
    }

    fn fetch_image(&self, location: &Location) -> Result<Vec<u8>, CatalogError> {
        let url = location.to_string();
        self.calls.borrow_mut().push(Call::Fetch(url.clone()));
        self.images
            .get(&url)
            .cloned()
            .ok_or_else(|| CatalogError::Rejected(format!("404 {url}")))
    }

    fn upload_url(&self, key: &ItemKey, url: &str) -> Result<(), CatalogError> {
        self.calls
            .borrow_mut()
            .push(Call::UploadUrl(key.to_string(), url.to_string()));
        self.upload_result()
    }

    fn upload_file(&self, key: &ItemKey, path: &Path) -> Result<(), CatalogError> {
        self.calls
            .borrow_mut()
            .push(Call::UploadFile(key.to_string(), path.display().to_string()));
        self.upload_result()
    }

    fn remove_label(&self, item: &CatalogItem, label: &str) -> Result<(), CatalogError> {
        self.calls
            .borrow_mut()
            .push(Call::RemoveLabel(item.key.to_string(), label.to_string()));
        Ok(())
    }
}

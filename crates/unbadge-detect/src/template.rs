//! Overlay templates: the fixed set of stamps the detector looks for.
//!
//! Templates are loaded once per run from a built-in directory followed
//! by an optional user-override directory, each scanned for `*.png` in
//! file-name order. That load order is also the match order.

use std::path::{Path, PathBuf};

use image::GrayImage;
use tracing::{debug, error};

use crate::probe::decode_grayscale;
use crate::types::Dimensions;

/// Errors that can occur while loading the template set.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// The built-in template directory does not exist.
    #[error("overlays folder not found: {0}")]
    MissingDirectory(PathBuf),

    /// A template directory could not be listed.
    #[error("failed to read overlays folder {path}: {source}")]
    ReadDirectory {
        /// Directory being listed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// No template could be loaded from any directory.
    #[error("no overlay images found in {0}")]
    Empty(PathBuf),
}

/// One overlay stamp, stored grayscale and pre-centred for correlation.
#[derive(Debug, Clone)]
pub struct OverlayTemplate {
    name: String,
    dimensions: Dimensions,
    zero_mean: Vec<f32>,
    norm: f64,
}

impl OverlayTemplate {
    /// Prepare a template from a grayscale bitmap.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn new(name: impl Into<String>, image: GrayImage) -> Self {
        let dimensions = Dimensions::of(&image);
        let pixels = image.as_raw();
        let mean = if pixels.is_empty() {
            0.0
        } else {
            pixels.iter().map(|p| f64::from(*p)).sum::<f64>() / pixels.len() as f64
        };
        let zero_mean: Vec<f32> = pixels
            .iter()
            .map(|p| (f64::from(*p) - mean) as f32)
            .collect();
        let norm = zero_mean
            .iter()
            .map(|v| f64::from(*v) * f64::from(*v))
            .sum::<f64>()
            .sqrt();
        Self {
            name: name.into(),
            dimensions,
            zero_mean,
            norm,
        }
    }

    /// Template name (the source file stem).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template size in pixels.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Row-major mean-subtracted pixel values.
    pub(crate) fn zero_mean(&self) -> &[f32] {
        &self.zero_mean
    }

    /// Euclidean norm of [`zero_mean`](Self::zero_mean).
    pub(crate) const fn norm(&self) -> f64 {
        self.norm
    }
}

/// The read-only set of templates for one run.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: Vec<OverlayTemplate>,
}

impl TemplateStore {
    /// Build a store from already prepared templates, keeping their order.
    #[must_use]
    pub const fn from_templates(templates: Vec<OverlayTemplate>) -> Self {
        Self { templates }
    }

    /// Load `*.png` templates from `builtin`, then from `user_override`.
    ///
    /// Files that fail to decode are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::MissingDirectory`] if `builtin` does not
    /// exist, [`TemplateError::ReadDirectory`] if a directory cannot be
    /// listed, and [`TemplateError::Empty`] if nothing loaded.
    pub fn load(builtin: &Path, user_override: Option<&Path>) -> Result<Self, TemplateError> {
        if !builtin.is_dir() {
            return Err(TemplateError::MissingDirectory(builtin.to_path_buf()));
        }

        let mut files = png_files(builtin)?;
        if let Some(user) = user_override
            && user.is_dir()
        {
            files.extend(png_files(user)?);
        }

        let templates: Vec<OverlayTemplate> = files
            .into_iter()
            .filter_map(|path| load_template(&path))
            .collect();

        if templates.is_empty() {
            return Err(TemplateError::Empty(builtin.join("*.png")));
        }
        debug!(count = templates.len(), "overlay templates loaded");
        Ok(Self { templates })
    }

    /// Templates in match order.
    pub fn iter(&self) -> impl Iterator<Item = &OverlayTemplate> {
        self.templates.iter()
    }

    /// Number of templates.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns `true` if the store holds no templates.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn png_files(dir: &Path) -> Result<Vec<PathBuf>, TemplateError> {
    let read_err = |source| TemplateError::ReadDirectory {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        let is_png = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if is_png && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn load_template(path: &Path) -> Option<OverlayTemplate> {
    let name = path
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Image Load Error: {}: {e}", path.display());
            return None;
        }
    };
    match decode_grayscale(&bytes) {
        Ok(gray) => Some(OverlayTemplate::new(name, gray)),
        Err(e) => {
            error!("Image Load Error: {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{encode_png, noise};

    #[test]
    fn zero_mean_sums_to_zero() {
        let t = OverlayTemplate::new("n", noise(7, 5, 1));
        let total: f64 = t.zero_mean().iter().map(|v| f64::from(*v)).sum();
        assert!(total.abs() < 1e-2, "sum was {total}");
        assert!(t.norm() > 0.0);
        assert_eq!(t.dimensions(), Dimensions::new(7, 5));
    }

    #[test]
    fn flat_template_has_zero_norm() {
        let t = OverlayTemplate::new("flat", GrayImage::from_pixel(4, 4, image::Luma([77])));
        assert!(t.norm() < 1e-9);
    }

    #[test]
    fn missing_builtin_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TemplateStore::load(&dir.path().join("nope"), None);
        assert!(matches!(result, Err(TemplateError::MissingDirectory(_))));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TemplateStore::load(dir.path(), None);
        assert!(matches!(result, Err(TemplateError::Empty(_))));
    }

    #[test]
    fn builtin_loads_before_user_override_in_name_order() {
        let builtin = tempfile::tempdir().unwrap();
        let user = tempfile::tempdir().unwrap();
        std::fs::write(builtin.path().join("b.png"), encode_png(&noise(4, 4, 1))).unwrap();
        std::fs::write(builtin.path().join("a.png"), encode_png(&noise(4, 4, 2))).unwrap();
        std::fs::write(user.path().join("0-user.PNG"), encode_png(&noise(4, 4, 3))).unwrap();
        std::fs::write(builtin.path().join("notes.txt"), b"ignored").unwrap();

        let store = TemplateStore::load(builtin.path(), Some(user.path())).unwrap();
        let names: Vec<&str> = store.iter().map(OverlayTemplate::name).collect();
        assert_eq!(names, ["a", "b", "0-user"]);
    }

    #[test]
    fn undecodable_template_is_skipped() {
        let builtin = tempfile::tempdir().unwrap();
        std::fs::write(builtin.path().join("bad.png"), b"not a png").unwrap();
        std::fs::write(builtin.path().join("good.png"), encode_png(&noise(4, 4, 9))).unwrap();

        let store = TemplateStore::load(builtin.path(), None).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.iter().next().unwrap().name(), "good");
    }

    #[test]
    fn missing_user_override_is_ignored() {
        let builtin = tempfile::tempdir().unwrap();
        std::fs::write(builtin.path().join("a.png"), encode_png(&noise(4, 4, 2))).unwrap();
        let store =
            TemplateStore::load(builtin.path(), Some(&builtin.path().join("missing"))).unwrap();
        assert_eq!(store.len(), 1);
    }
}

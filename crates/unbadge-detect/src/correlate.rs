//! Zero-mean normalized cross-correlation of a template over a probe.
//!
//! For each placement of the template inside the probe the score is
//!
//! ```text
//!            sum (T - mean T) * (P - mean P)
//! r = -----------------------------------------------
//!     sqrt(sum (T - mean T)^2) * sqrt(sum (P - mean P)^2)
//! ```
//!
//! over the covered window, which ranges over `[-1, 1]` and is insensitive
//! to uniform brightness and contrast changes.
//!
//! Window sums for the probe come from integral images. The cross term
//! for every placement at once comes from one circular correlation in the
//! frequency domain: the probe spectrum is computed once per probe and
//! reused for every template. Because the template is stored
//! mean-subtracted, the cross term needs no probe mean, and placements
//! that fit inside the probe never wrap around.

use std::sync::Arc;

use image::{ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::template::OverlayTemplate;
use crate::types::{Dimensions, GrayImage};

/// Denominators below this are treated as flat (zero-variance) regions.
const FLAT_EPSILON: f64 = 1e-9;

type Integral = ImageBuffer<Luma<u64>, Vec<u64>>;

/// Peak correlation of one template against one probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    /// Highest score found (or the first score at or above the stop
    /// threshold).
    pub score: f32,
    /// Top-left corner of the window that produced `score`.
    pub position: (u32, u32),
}

/// A probe prepared for correlation against any number of templates.
pub struct ImageSpectrum {
    dims: Dimensions,
    sums: Integral,
    squares: Integral,
    /// Column-major 2-D spectrum of the probe.
    spectrum: Vec<Complex<f64>>,
    row_forward: Arc<dyn Fft<f64>>,
    column_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    column_inverse: Arc<dyn Fft<f64>>,
}

impl ImageSpectrum {
    /// Transform `probe` once. Returns `None` for an empty image.
    #[must_use]
    pub fn new(probe: &GrayImage) -> Option<Self> {
        let dims = Dimensions::of(probe);
        if dims.width == 0 || dims.height == 0 {
            return None;
        }
        let mut planner = FftPlanner::<f64>::new();
        let width = dims.width as usize;
        let height = dims.height as usize;
        let mut spectrum = Self {
            dims,
            sums: integral_image::<_, u64>(probe),
            squares: integral_squared_image::<_, u64>(probe),
            spectrum: Vec::new(),
            row_forward: planner.plan_fft_forward(width),
            column_forward: planner.plan_fft_forward(height),
            row_inverse: planner.plan_fft_inverse(width),
            column_inverse: planner.plan_fft_inverse(height),
        };
        let pixels: Vec<Complex<f64>> = probe
            .as_raw()
            .iter()
            .map(|p| Complex::new(f64::from(*p), 0.0))
            .collect();
        spectrum.spectrum = spectrum.forward(pixels);
        Some(spectrum)
    }

    /// Row-major pixels in, column-major spectrum out.
    fn forward(&self, mut data: Vec<Complex<f64>>) -> Vec<Complex<f64>> {
        let width = self.dims.width as usize;
        let height = self.dims.height as usize;
        self.row_forward.process(&mut data);
        let mut columns = transpose(&data, width, height);
        self.column_forward.process(&mut columns);
        columns
    }

    /// Column-major spectrum in, row-major real part out (unscaled).
    fn inverse(&self, mut columns: Vec<Complex<f64>>) -> Vec<f64> {
        let width = self.dims.width as usize;
        let height = self.dims.height as usize;
        self.column_inverse.process(&mut columns);
        let mut rows = transpose(&columns, height, width);
        self.row_inverse.process(&mut rows);
        rows.into_iter().map(|c| c.re).collect()
    }

    /// Cross term `sum T'(i, j) * P(x + i, y + j)` for every `(x, y)`,
    /// row-major over the full probe grid.
    #[allow(clippy::cast_precision_loss)]
    fn cross_terms(&self, template: &OverlayTemplate) -> Vec<f64> {
        let width = self.dims.width as usize;
        let t_width = template.dimensions().width as usize;
        let mut padded = vec![Complex::new(0.0, 0.0); self.spectrum.len()];
        for (row, weights) in template.zero_mean().chunks_exact(t_width).enumerate() {
            let start = row * width;
            for (slot, weight) in padded[start..start + t_width].iter_mut().zip(weights) {
                *slot = Complex::new(f64::from(*weight), 0.0);
            }
        }
        let template_spectrum = self.forward(padded);
        let product: Vec<Complex<f64>> = self
            .spectrum
            .iter()
            .zip(&template_spectrum)
            .map(|(p, t)| *p * t.conj())
            .collect();
        let scale = 1.0 / self.spectrum.len() as f64;
        self.inverse(product)
            .into_iter()
            .map(|v| v * scale)
            .collect()
    }

    /// Find the peak correlation of `template` over this probe.
    ///
    /// Returns `None` when the template does not fit inside the probe or
    /// has no variance (a flat template correlates with nothing). When
    /// `stop_at` is given, the row-major scan ends at the first window
    /// scoring at or above it.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn peak(&self, template: &OverlayTemplate, stop_at: Option<f32>) -> Option<Correlation> {
        let t_dims = template.dimensions();
        if !self.dims.contains(t_dims) || template.norm() < FLAT_EPSILON {
            return None;
        }

        let cross = self.cross_terms(template);
        let n = f64::from(t_dims.width) * f64::from(t_dims.height);
        let stride = self.dims.width as usize;

        let mut best = Correlation {
            score: f32::MIN,
            position: (0, 0),
        };
        for y in 0..=(self.dims.height - t_dims.height) {
            for x in 0..=(self.dims.width - t_dims.width) {
                let sum = window_sum(&self.sums, x, y, t_dims) as f64;
                let sum_sq = window_sum(&self.squares, x, y, t_dims) as f64;
                let variance = sum.mul_add(-sum / n, sum_sq);
                let denominator = template.norm() * variance.max(0.0).sqrt();
                if denominator < FLAT_EPSILON {
                    continue;
                }

                let score = (cross[y as usize * stride + x as usize] / denominator) as f32;
                if score > best.score {
                    best = Correlation {
                        score,
                        position: (x, y),
                    };
                    if stop_at.is_some_and(|threshold| score >= threshold) {
                        return Some(best);
                    }
                }
            }
        }

        // Every window was flat.
        if best.score == f32::MIN {
            best.score = 0.0;
        }
        Some(best)
    }
}

fn transpose(data: &[Complex<f64>], width: usize, height: usize) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::new(0.0, 0.0); data.len()];
    for (y, row) in data.chunks_exact(width).enumerate() {
        for (x, value) in row.iter().enumerate() {
            out[x * height + y] = *value;
        }
    }
    out
}

/// Sum of the `dims`-sized window with top-left corner `(x, y)`.
///
/// Integral images carry one extra leading row and column of zeros, so
/// entry `(x, y)` is the sum of all pixels strictly above and left.
fn window_sum(integral: &Integral, x: u32, y: u32, dims: Dimensions) -> u64 {
    let right = x + dims.width;
    let bottom = y + dims.height;
    let a = integral.get_pixel(x, y).0[0];
    let b = integral.get_pixel(right, y).0[0];
    let c = integral.get_pixel(x, bottom).0[0];
    let d = integral.get_pixel(right, bottom).0[0];
    (d + a) - (b + c)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{checkerboard, noise, paste};

    fn template_of(image: GrayImage) -> OverlayTemplate {
        OverlayTemplate::new("t", image)
    }

    fn peak_correlation(
        image: &GrayImage,
        template: &OverlayTemplate,
        stop_at: Option<f32>,
    ) -> Option<Correlation> {
        ImageSpectrum::new(image)?.peak(template, stop_at)
    }

    #[test]
    fn exact_paste_scores_one_at_paste_position() {
        let stamp = noise(12, 9, 7);
        let mut probe = noise(60, 50, 99);
        paste(&mut probe, &stamp, 31, 17);

        let c = peak_correlation(&probe, &template_of(stamp), None).unwrap();
        assert!((c.score - 1.0).abs() < 1e-4, "score was {}", c.score);
        assert_eq!(c.position, (31, 17));
    }

    #[test]
    fn brightness_shift_still_correlates() {
        let stamp = checkerboard(8, 8, 2, 40, 120);
        let brighter = checkerboard(8, 8, 2, 100, 180);
        let mut probe = GrayImage::from_pixel(30, 30, image::Luma([10]));
        paste(&mut probe, &brighter, 5, 5);

        let c = peak_correlation(&probe, &template_of(stamp), None).unwrap();
        assert!(c.score > 0.999, "score was {}", c.score);
    }

    #[test]
    fn unrelated_noise_stays_well_below_threshold() {
        let stamp = noise(16, 16, 3);
        let probe = noise(80, 80, 4);
        let c = peak_correlation(&probe, &template_of(stamp), None).unwrap();
        assert!(c.score < 0.8, "score was {}", c.score);
    }

    #[test]
    fn template_larger_than_probe_is_not_comparable() {
        let probe = noise(10, 10, 1);
        assert!(peak_correlation(&probe, &template_of(noise(11, 4, 2)), None).is_none());
        assert!(peak_correlation(&probe, &template_of(noise(4, 11, 2)), None).is_none());
    }

    #[test]
    fn flat_template_is_not_comparable() {
        let probe = noise(20, 20, 5);
        let flat = GrayImage::from_pixel(5, 5, image::Luma([128]));
        assert!(peak_correlation(&probe, &template_of(flat), None).is_none());
    }

    #[test]
    fn flat_probe_scores_zero() {
        let probe = GrayImage::from_pixel(20, 20, image::Luma([128]));
        let c = peak_correlation(&probe, &template_of(noise(5, 5, 6)), None).unwrap();
        assert!(c.score.abs() < f32::EPSILON);
    }

    #[test]
    fn stop_threshold_returns_first_hit() {
        let stamp = noise(6, 6, 11);
        let mut probe = noise(40, 40, 12);
        paste(&mut probe, &stamp, 2, 1);
        paste(&mut probe, &stamp, 30, 30);

        let c = peak_correlation(&probe, &template_of(stamp), Some(0.95)).unwrap();
        assert_eq!(c.position, (2, 1));
    }

    #[test]
    fn cross_terms_match_direct_sums() {
        let probe = noise(13, 11, 31);
        let template = template_of(noise(4, 3, 32));
        let spectrum = ImageSpectrum::new(&probe).unwrap();
        let cross = spectrum.cross_terms(&template);
        for (x, y) in [(0, 0), (9, 8), (5, 2)] {
            let direct: f64 = (0..3)
                .flat_map(|j| (0..4).map(move |i| (i, j)))
                .map(|(i, j)| {
                    f64::from(template.zero_mean()[j * 4 + i])
                        * f64::from(probe.get_pixel(x + i as u32, y + j as u32).0[0])
                })
                .sum();
            let fast = cross[y as usize * 13 + x as usize];
            assert!((fast - direct).abs() < 1e-6, "({x}, {y}): {fast} vs {direct}");
        }
    }

    #[test]
    fn one_spectrum_serves_several_templates() {
        let first = noise(7, 5, 41);
        let second = noise(5, 7, 42);
        let mut probe = noise(50, 40, 43);
        paste(&mut probe, &first, 3, 30);
        paste(&mut probe, &second, 40, 2);

        let spectrum = ImageSpectrum::new(&probe).unwrap();
        assert_eq!(spectrum.peak(&template_of(first), None).unwrap().position, (3, 30));
        assert_eq!(spectrum.peak(&template_of(second), None).unwrap().position, (40, 2));
    }

    #[test]
    fn empty_image_has_no_spectrum() {
        assert!(ImageSpectrum::new(&GrayImage::new(0, 0)).is_none());
    }

    #[test]
    fn window_sum_matches_direct_sum() {
        let img = noise(9, 7, 21);
        let integral: Integral = integral_image::<_, u64>(&img);
        let dims = Dimensions::new(4, 3);
        let direct: u64 = (2..5)
            .flat_map(|y| (3..7).map(move |x| (x, y)))
            .map(|(x, y)| u64::from(img.get_pixel(x, y).0[0]))
            .sum();
        assert_eq!(window_sum(&integral, 3, 2, dims), direct);
    }
}

/// Exposure analysis
///
/// Brightness, contrast and clipping fractions from a luminance histogram.
use serde::{Deserialize, Serialize};

/// Histogram-derived exposure statistics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExposureStats {
    /// Mean luminance (0-255)
    pub brightness: f32,
    /// Standard deviation of luminance
    pub contrast: f32,
    /// Fraction of pixels at or above the high saturation level
    pub saturated_fraction: f32,
    /// Fraction of pixels at or below the low saturation level
    pub dark_fraction: f32,
}

pub fn histogram(plane: &[u8]) -> [u64; 256] {
    let mut bins = [0u64; 256];
    for &value in plane {
        bins[value as usize] += 1;
    }
    bins
}

impl ExposureStats {
    pub fn from_histogram(bins: &[u64; 256], saturation_high: u8, saturation_low: u8) -> Self {
        let total: u64 = bins.iter().sum();
        if total == 0 {
            return Self::default();
        }

        let mut sum: u64 = 0;
        let mut sum_sq: u64 = 0;
        for (value, &count) in bins.iter().enumerate() {
            sum += value as u64 * count;
            sum_sq += (value * value) as u64 * count;
        }
        let saturated: u64 = bins[saturation_high as usize..].iter().sum();
        let dark: u64 = bins[..=saturation_low as usize].iter().sum();

        let n = total as f64;
        let mean = sum as f64 / n;
        let variance = (sum_sq as f64 / n - mean * mean).max(0.0);

        Self {
            brightness: mean as f32,
            contrast: variance.sqrt() as f32,
            saturated_fraction: (saturated as f64 / n) as f32,
            dark_fraction: (dark as f64 / n) as f32,
        }
    }
}

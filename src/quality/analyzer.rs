use super::blur::{laplacian_variance, BlurLevel};
use super::exposure::{histogram, ExposureStats};
use crate::errors::GuideError;
use crate::governor::FrameBufferPool;
use crate::types::{FrameSize, FrameView};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Quality thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Laplacian variance below which a frame is blurry
    pub blur_threshold: f32,
    /// Mean luminance above which a frame may be overexposed
    pub overexposure_brightness: f32,
    /// Mean luminance below which a frame may be underexposed
    pub underexposure_brightness: f32,
    /// Luminance at or above which a pixel counts as saturated
    pub saturation_high: u8,
    /// Luminance at or below which a pixel counts as crushed
    pub saturation_low: u8,
    /// Fraction of clipped pixels required before an exposure flag is raised
    pub saturated_fraction: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            blur_threshold: 100.0,
            overexposure_brightness: 220.0,
            underexposure_brightness: 40.0,
            saturation_high: 235,
            saturation_low: 20,
            saturated_fraction: 0.8,
        }
    }
}

impl QualityConfig {
    pub fn validate(&self) -> Result<(), GuideError> {
        if !(self.blur_threshold >= 0.0) {
            return Err(GuideError::invalid_config(
                "blur_threshold must be non-negative",
            ));
        }
        if !(0.0..=255.0).contains(&self.underexposure_brightness)
            || !(0.0..=255.0).contains(&self.overexposure_brightness)
        {
            return Err(GuideError::invalid_config(
                "exposure brightness thresholds must be between 0 and 255",
            ));
        }
        if self.underexposure_brightness >= self.overexposure_brightness {
            return Err(GuideError::invalid_config(
                "underexposure_brightness must be below overexposure_brightness",
            ));
        }
        if self.saturation_low >= self.saturation_high {
            return Err(GuideError::invalid_config(
                "saturation_low must be below saturation_high",
            ));
        }
        if !(self.saturated_fraction > 0.0 && self.saturated_fraction <= 1.0) {
            return Err(GuideError::invalid_config(
                "saturated_fraction must be in (0.0, 1.0]",
            ));
        }
        Ok(())
    }
}

/// Per-frame quality measurements
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Laplacian variance (edge energy)
    pub sharpness: f32,
    /// Mean luminance 0-255
    pub brightness: f32,
    /// Luminance standard deviation
    pub contrast: f32,
    pub saturated_fraction: f32,
    pub dark_fraction: f32,
    pub is_blurry: bool,
    pub is_overexposed: bool,
    pub is_underexposed: bool,
    /// Combined score in [0, 1]
    pub overall_score: f32,
}

impl QualityMetrics {
    pub fn has_issue(&self) -> bool {
        self.is_blurry || self.is_overexposed || self.is_underexposed
    }
}

/// Most important quality problem, in reporting priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityIssue {
    Blurry,
    Underexposed,
    Overexposed,
}

impl QualityIssue {
    pub fn message(&self) -> &'static str {
        match self {
            QualityIssue::Blurry => "Image is blurry - hold the camera steady",
            QualityIssue::Underexposed => "Too dark - needs more light",
            QualityIssue::Overexposed => "Too bright - too much light",
        }
    }
}

pub struct QualityAnalyzer {
    config: RwLock<Arc<QualityConfig>>,
    pool: Arc<FrameBufferPool>,
}

impl QualityAnalyzer {
    pub fn new(config: QualityConfig, pool: Arc<FrameBufferPool>) -> Result<Self, GuideError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            pool,
        })
    }

    pub fn config(&self) -> Arc<QualityConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_config(&self, config: QualityConfig) -> Result<(), GuideError> {
        config.validate()?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        Ok(())
    }

    /// Measure a frame window. Empty windows yield all-zero metrics with no
    /// flags set.
    pub fn analyze(&self, view: &FrameView<'_>) -> QualityMetrics {
        if view.is_empty() {
            return QualityMetrics::default();
        }

        let config = self.config();
        let (width, height) = (view.width() as usize, view.height() as usize);
        let mut plane = self
            .pool
            .acquire_plane(FrameSize::new(view.width(), view.height()));
        view.fill_luminance(&mut plane);

        let sharpness = laplacian_variance(&plane, width, height) as f32;
        let exposure = ExposureStats::from_histogram(
            &histogram(&plane),
            config.saturation_high,
            config.saturation_low,
        );

        let metrics = Self::derive(sharpness, exposure, &config);
        log::trace!(
            "Quality: sharpness={:.1} brightness={:.1} contrast={:.1} blurry={} over={} under={}",
            metrics.sharpness,
            metrics.brightness,
            metrics.contrast,
            metrics.is_blurry,
            metrics.is_overexposed,
            metrics.is_underexposed
        );
        metrics
    }

    fn derive(sharpness: f32, exposure: ExposureStats, config: &QualityConfig) -> QualityMetrics {
        let is_blurry = BlurLevel::classify(sharpness, config.blur_threshold) == BlurLevel::Blurry;
        let is_overexposed = exposure.brightness > config.overexposure_brightness
            && exposure.saturated_fraction >= config.saturated_fraction;
        let is_underexposed = exposure.brightness < config.underexposure_brightness
            && exposure.dark_fraction >= config.saturated_fraction;

        let sharp_score = if config.blur_threshold > 0.0 {
            (sharpness / (2.0 * config.blur_threshold)).min(1.0)
        } else {
            1.0
        };
        let exposure_score = 1.0 - ((exposure.brightness - 128.0).abs() / 128.0).min(1.0);
        let contrast_score = (exposure.contrast / 64.0).min(1.0);

        QualityMetrics {
            sharpness,
            brightness: exposure.brightness,
            contrast: exposure.contrast,
            saturated_fraction: exposure.saturated_fraction,
            dark_fraction: exposure.dark_fraction,
            is_blurry,
            is_overexposed,
            is_underexposed,
            overall_score: 0.5 * sharp_score + 0.3 * exposure_score + 0.2 * contrast_score,
        }
    }

    /// Blur first, then underexposure, then overexposure
    pub fn primary_issue(metrics: &QualityMetrics) -> Option<QualityIssue> {
        if metrics.is_blurry {
            Some(QualityIssue::Blurry)
        } else if metrics.is_underexposed {
            Some(QualityIssue::Underexposed)
        } else if metrics.is_overexposed {
            Some(QualityIssue::Overexposed)
        } else {
            None
        }
    }

    pub fn feedback_message(metrics: &QualityMetrics) -> &'static str {
        Self::primary_issue(metrics)
            .map(|issue| issue.message())
            .unwrap_or("Image quality is good")
    }
}

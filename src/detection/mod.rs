/// Lesion region detection module
///
/// Finds the most lesion-like dark region in a frame window. Otsu
/// thresholding with connected-component labelling is the primary method; a
/// marker-controlled watershed runs as a fallback when the primary result is
/// missing or weak.
pub mod components;
pub mod watershed;

use crate::errors::GuideError;
use crate::governor::FrameBufferPool;
use crate::quality::exposure::histogram;
use crate::types::{FrameSize, FrameView, Point, Rect};
use components::{label_regions, otsu_threshold, trace_contour, Region, MASK_REGION};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use watershed::{flood_lesion_basin, gradient_magnitude, LABEL_LESION};

const REGULARITY_WEIGHT: f32 = 0.4;
const SIZE_FIT_WEIGHT: f32 = 0.3;
const COLOR_MATCH_WEIGHT: f32 = 0.3;

/// Detection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Smallest accepted region, in frame pixels
    pub min_region_area: f32,
    /// Largest accepted region, in frame pixels
    pub max_region_area: f32,
    /// Windows narrower or shorter than this (frame pixels) are not searched
    pub min_frame_dimension: u32,
    /// Reject regions that are not darker and warmer than the surrounding skin
    pub color_filter: bool,
    /// Try the watershed fallback when thresholding finds nothing convincing
    pub multi_method: bool,
    /// Minimum relative luminance contrast against the background
    pub color_threshold: f32,
    /// Primary results below this confidence trigger the fallback
    pub fallback_confidence: f32,
    /// Region-to-window area fraction that scores a perfect size fit
    pub target_area_fraction: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_region_area: 400.0,
            max_region_area: 250_000.0,
            min_frame_dimension: 32,
            color_filter: true,
            multi_method: true,
            color_threshold: 0.15,
            fallback_confidence: 0.5,
            target_area_fraction: 0.10,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), GuideError> {
        if !(self.min_region_area > 0.0) {
            return Err(GuideError::invalid_config("min_region_area must be positive"));
        }
        if !(self.max_region_area > self.min_region_area) {
            return Err(GuideError::invalid_config(format!(
                "max_region_area ({}) must exceed min_region_area ({})",
                self.max_region_area, self.min_region_area
            )));
        }
        if self.min_frame_dimension < 3 {
            return Err(GuideError::invalid_config(
                "min_frame_dimension must be at least 3",
            ));
        }
        if !(self.color_threshold > 0.0 && self.color_threshold <= 1.0) {
            return Err(GuideError::invalid_config(
                "color_threshold must be in (0.0, 1.0]",
            ));
        }
        if !(0.0..=1.0).contains(&self.fallback_confidence) {
            return Err(GuideError::invalid_config(
                "fallback_confidence must be in [0.0, 1.0]",
            ));
        }
        if !(self.target_area_fraction > 0.0 && self.target_area_fraction <= 1.0) {
            return Err(GuideError::invalid_config(
                "target_area_fraction must be in (0.0, 1.0]",
            ));
        }
        Ok(())
    }
}

/// Which segmentation produced a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionMethod {
    Threshold,
    Watershed,
}

/// A candidate lesion, in frame coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: Rect,
    pub center: Point,
    /// Weighted score in [0, 1]
    pub confidence: f32,
    /// Area in frame pixels
    pub area: f32,
    /// Outer boundary, clockwise
    pub contour: Vec<Point>,
    pub method: DetectionMethod,
    pub mean_color: [u8; 3],
    pub regularity: f32,
    pub size_fit: f32,
    pub color_match: f32,
}

impl Detection {
    /// A detection described only by its geometry, with a square bounding box
    /// of the given area and no contour.
    pub fn from_geometry(center: Point, area: f32, confidence: f32) -> Self {
        let side = area.max(0.0).sqrt();
        let bounding_box = Rect::new(
            (center.x - side / 2.0).max(0.0) as u32,
            (center.y - side / 2.0).max(0.0) as u32,
            side.round() as u32,
            side.round() as u32,
        );
        Self {
            bounding_box,
            center,
            confidence: confidence.clamp(0.0, 1.0),
            area,
            contour: Vec::new(),
            method: DetectionMethod::Threshold,
            mean_color: [0, 0, 0],
            regularity: 0.0,
            size_fit: 0.0,
            color_match: 0.0,
        }
    }
}

/// Luminance context a region is judged against
struct Background {
    total_luma: u64,
    pixels: u64,
}

impl Background {
    fn from_histogram(bins: &[u64; 256]) -> Self {
        Self {
            total_luma: bins.iter().enumerate().map(|(v, &c)| v as u64 * c).sum(),
            pixels: bins.iter().sum(),
        }
    }

    /// Mean luminance of everything outside `region`
    fn mean_excluding(&self, region: &Region) -> f32 {
        let rest = self.pixels.saturating_sub(region.area as u64);
        if rest == 0 {
            return 0.0;
        }
        self.total_luma.saturating_sub(region.sum_luma) as f32 / rest as f32
    }
}

fn median(bins: &[u64; 256]) -> u8 {
    let total: u64 = bins.iter().sum();
    let mut seen = 0u64;
    for (level, &count) in bins.iter().enumerate() {
        seen += count;
        if seen * 2 >= total {
            return level as u8;
        }
    }
    255
}

/// Length of the closed polyline through `contour`
fn perimeter(contour: &[(u32, u32)]) -> f32 {
    if contour.len() < 2 {
        return 0.0;
    }
    contour
        .iter()
        .zip(contour.iter().cycle().skip(1))
        .map(|(&(ax, ay), &(bx, by))| {
            let dx = ax as f32 - bx as f32;
            let dy = ay as f32 - by as f32;
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

pub struct RegionDetector {
    config: RwLock<Arc<DetectorConfig>>,
    pool: Arc<FrameBufferPool>,
}

impl RegionDetector {
    pub fn new(config: DetectorConfig, pool: Arc<FrameBufferPool>) -> Result<Self, GuideError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            pool,
        })
    }

    pub fn config(&self) -> Arc<DetectorConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_config(&self, config: DetectorConfig) -> Result<(), GuideError> {
        config.validate()?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        Ok(())
    }

    /// Find the most lesion-like region in `view`, or `None` when the window
    /// is too small or no region passes the size and colour filters.
    pub fn detect(&self, view: &FrameView<'_>) -> Option<Detection> {
        let config = self.config();
        let rect = view.rect();
        if rect.width.min(rect.height) < config.min_frame_dimension
            || view.width() < 3
            || view.height() < 3
        {
            log::trace!("Window {:?} too small for detection", rect);
            return None;
        }

        let size = FrameSize::new(view.width(), view.height());
        let mut luma = self.pool.acquire_plane(size);
        view.fill_luminance(&mut luma);
        let bins = histogram(&luma);
        let background = Background::from_histogram(&bins);
        let mut mask = self.pool.acquire_plane(size);

        let primary = otsu_threshold(&bins).and_then(|threshold| {
            label_regions(view, &luma, &mut mask, threshold)
                .iter()
                .filter_map(|region| {
                    self.evaluate(view, &mask, MASK_REGION, region, &background, &config)
                        .map(|d| Detection {
                            method: DetectionMethod::Threshold,
                            ..d
                        })
                })
                .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        });

        let needs_fallback = primary
            .as_ref()
            .map_or(true, |d| d.confidence < config.fallback_confidence);
        if !config.multi_method || !needs_fallback {
            return Self::report(primary);
        }

        mask.fill(0);
        let mut gradient = self.pool.acquire_plane(size);
        gradient_magnitude(&luma, size.width as usize, size.height as usize, &mut gradient);
        let fallback = flood_lesion_basin(view, &luma, &gradient, &mut mask, median(&bins))
            .and_then(|region| {
                self.evaluate(view, &mask, LABEL_LESION, &region, &background, &config)
            })
            .map(|d| Detection {
                method: DetectionMethod::Watershed,
                ..d
            });

        let best = match (primary, fallback) {
            (Some(p), Some(f)) if f.confidence > p.confidence => Some(f),
            (Some(p), _) => Some(p),
            (None, f) => f,
        };
        Self::report(best)
    }

    fn report(detection: Option<Detection>) -> Option<Detection> {
        match &detection {
            Some(d) => log::trace!(
                "Detected region via {:?}: center=({:.1}, {:.1}) area={:.0} confidence={:.3}",
                d.method,
                d.center.x,
                d.center.y,
                d.area,
                d.confidence
            ),
            None => log::trace!("No lesion candidate"),
        }
        detection
    }

    /// Score one labelled region; `None` when a filter rejects it
    fn evaluate(
        &self,
        view: &FrameView<'_>,
        labels: &[u8],
        label: u8,
        region: &Region,
        background: &Background,
        config: &DetectorConfig,
    ) -> Option<Detection> {
        let area = region.area as f32 * view.pixel_area();
        if area < config.min_region_area || area > config.max_region_area {
            return None;
        }
        if region.border_touches(view.width(), view.height()) > 2 {
            return None;
        }

        let mean_color = region.mean_color();
        let surround = background.mean_excluding(region);
        let contrast = if surround > 0.0 {
            (surround - region.mean_luma()) / surround
        } else {
            0.0
        };
        let warm = mean_color[0] >= mean_color[2];
        if config.color_filter && (contrast < config.color_threshold || !warm) {
            return None;
        }

        let contour = trace_contour(labels, view.width(), view.height(), region.seed, label);
        let length = perimeter(&contour);
        let regularity = if length > 0.0 {
            (4.0 * std::f32::consts::PI * region.area as f32 / (length * length)).min(1.0)
        } else {
            0.0
        };
        let fraction = region.area as f32 / view.pixel_count() as f32;
        let size_fit = (fraction / config.target_area_fraction)
            .min(config.target_area_fraction / fraction);
        let color_match = if warm {
            (contrast / (2.0 * config.color_threshold)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let confidence = (REGULARITY_WEIGHT * regularity
            + SIZE_FIT_WEIGHT * size_fit
            + COLOR_MATCH_WEIGHT * color_match)
            .clamp(0.0, 1.0);

        let (cx, cy) = region.centroid();
        let step = view.step();
        let origin = view.to_frame(Point::new(region.min_x as f32, region.min_y as f32));
        Some(Detection {
            bounding_box: Rect::new(
                origin.x as u32,
                origin.y as u32,
                (region.max_x - region.min_x + 1) * step,
                (region.max_y - region.min_y + 1) * step,
            ),
            center: view.to_frame(Point::new(cx, cy)),
            confidence,
            area,
            contour: contour
                .into_iter()
                .map(|(x, y)| view.to_frame(Point::new(x as f32, y as f32)))
                .collect(),
            method: DetectionMethod::Threshold,
            mean_color,
            regularity,
            size_fit,
            color_match,
        })
    }
}

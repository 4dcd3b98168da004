/// Region-of-interest optimisation module
///
/// Picks the sub-window of each frame that the detector and analyzer work
/// on. The window is sized by the performance budget and, in adaptive mode,
/// centred on the recent detection history.
use crate::errors::GuideError;
use crate::types::{Frame, FrameSize, FrameView, Point, Rect};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Largest per-update growth of the ROI scale
const MAX_SCALE_GROWTH: f32 = 1.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiConfig {
    /// Centre on the detection history instead of the frame centre
    pub adaptive: bool,
    /// Detection centres kept for smoothing
    pub history_capacity: usize,
    /// Scale bounds, as a fraction of frame width and height
    pub min_roi_size: f32,
    pub max_roi_size: f32,
    pub default_scale: f32,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            adaptive: true,
            history_capacity: 10,
            min_roi_size: 0.3,
            max_roi_size: 1.0,
            default_scale: 0.7,
        }
    }
}

impl RoiConfig {
    pub fn validate(&self) -> Result<(), GuideError> {
        if self.history_capacity == 0 {
            return Err(GuideError::invalid_config(
                "history_capacity must be at least 1",
            ));
        }
        if !(self.min_roi_size > 0.0 && self.min_roi_size <= self.max_roi_size) {
            return Err(GuideError::invalid_config(
                "min_roi_size must be positive and not above max_roi_size",
            ));
        }
        if self.max_roi_size > 1.0 {
            return Err(GuideError::invalid_config("max_roi_size must not exceed 1.0"));
        }
        if !(self.min_roi_size..=self.max_roi_size).contains(&self.default_scale) {
            return Err(GuideError::invalid_config(
                "default_scale must lie within [min_roi_size, max_roi_size]",
            ));
        }
        Ok(())
    }
}

/// Sampling step that approximates a resolution scale (1.0 -> every pixel)
pub fn sampling_step(resolution_scale: f32) -> u32 {
    if !(resolution_scale > 0.0) {
        return 1;
    }
    (1.0 / resolution_scale).round().max(1.0) as u32
}

/// A processing window and the mapping between its coordinates and the
/// frame's
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiResult {
    pub rect: Rect,
    pub scale_factor: f32,
    /// Frame position of ROI-local (0, 0)
    pub offset: Point,
    /// Frame pixels per ROI pixel along each axis
    pub step: u32,
}

impl RoiResult {
    pub fn new(rect: Rect, scale_factor: f32) -> Self {
        Self {
            rect,
            scale_factor,
            offset: Point::new(rect.x as f32, rect.y as f32),
            step: 1,
        }
    }

    /// Same window, sampled every `step` pixels
    pub fn downsampled(self, step: u32) -> Self {
        Self {
            step: step.max(1),
            ..self
        }
    }

    /// Borrow this window of `frame`
    pub fn view<'a>(&self, frame: &'a Frame) -> Result<FrameView<'a>, GuideError> {
        FrameView::new(frame, self.rect, self.step)
    }

    pub fn map_to_frame(&self, point: Point) -> Point {
        let step = self.step as f32;
        Point::new(self.offset.x + point.x * step, self.offset.y + point.y * step)
    }

    pub fn map_to_roi(&self, point: Point) -> Point {
        let step = self.step as f32;
        Point::new((point.x - self.offset.x) / step, (point.y - self.offset.y) / step)
    }

    /// Whether a frame-space point falls inside the window
    pub fn contains(&self, point: &Point) -> bool {
        self.rect.contains(point)
    }
}

#[derive(Debug)]
pub struct RoiOptimizer {
    config: RoiConfig,
    history: VecDeque<Point>,
    last_detection: Option<Point>,
    current_scale: f32,
}

impl RoiOptimizer {
    pub fn new(config: RoiConfig) -> Result<Self, GuideError> {
        config.validate()?;
        Ok(Self {
            history: VecDeque::with_capacity(config.history_capacity),
            last_detection: None,
            current_scale: config.default_scale,
            config,
        })
    }

    pub fn config(&self) -> &RoiConfig {
        &self.config
    }

    /// Replace the config; history beyond the new capacity is dropped oldest
    /// first and the current scale is pulled back into range.
    pub fn update_config(&mut self, config: RoiConfig) -> Result<(), GuideError> {
        config.validate()?;
        while self.history.len() > config.history_capacity {
            self.history.pop_front();
        }
        self.current_scale = self
            .current_scale
            .clamp(config.min_roi_size, config.max_roi_size);
        self.config = config;
        Ok(())
    }

    pub fn current_scale(&self) -> f32 {
        self.current_scale
    }

    fn history_centroid(&self) -> Option<Point> {
        if self.history.is_empty() {
            return None;
        }
        let n = self.history.len() as f32;
        let (sx, sy) = self
            .history
            .iter()
            .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point::new(sx / n, sy / n))
    }

    /// Window of `scale` times the frame size, centred on the frame or, in
    /// adaptive mode, on the detection history. Always inside the frame.
    pub fn compute_roi(&self, size: FrameSize, scale: f32) -> RoiResult {
        if size.is_empty() {
            return RoiResult::new(Rect::default(), 0.0);
        }
        let scale = scale.clamp(self.config.min_roi_size, self.config.max_roi_size);
        let center = if self.config.adaptive {
            self.history_centroid().unwrap_or_else(|| size.center())
        } else {
            size.center()
        };

        let rect = Rect::centered_within(
            center,
            size.width as f32 * scale,
            size.height as f32 * scale,
            size,
        );
        RoiResult::new(rect, scale)
    }

    /// Window around a detection, `factor` times its box, clamped to the frame
    pub fn expand_roi(&self, size: FrameSize, detection: &Rect, factor: f32) -> RoiResult {
        if size.is_empty() {
            return RoiResult::new(Rect::default(), 0.0);
        }
        let factor = factor.max(1.0);
        let rect = Rect::centered_within(
            detection.center(),
            detection.width as f32 * factor,
            detection.height as f32 * factor,
            size,
        );
        let scale = (rect.width as f32 / size.width as f32).max(rect.height as f32 / size.height as f32);
        RoiResult::new(rect, scale.min(1.0))
    }

    pub fn is_in_roi(&self, point: &Point, roi: &RoiResult) -> bool {
        roi.contains(point)
    }

    /// Fraction of the frame covered by the window
    pub fn area_ratio(&self, size: FrameSize, roi: &RoiResult) -> f32 {
        if size.is_empty() {
            return 0.0;
        }
        (roi.rect.area() as f64 / size.area() as f64) as f32
    }

    /// Scale expected to bring latency to `target_ms`, given the latency
    /// `current_ms` measured at `current_scale`. Cost is taken as
    /// proportional to window area; growth per step is capped.
    pub fn optimal_roi_scale(&self, current_ms: f32, target_ms: f32, current_scale: f32) -> f32 {
        let current_scale = current_scale.clamp(self.config.min_roi_size, self.config.max_roi_size);
        if !(current_ms > 0.0 && target_ms > 0.0) {
            return current_scale;
        }
        let proposed = current_scale * (target_ms / current_ms).sqrt();
        proposed
            .min(current_scale * MAX_SCALE_GROWTH)
            .clamp(self.config.min_roi_size, self.config.max_roi_size)
    }

    /// Feed a latency measurement and adopt the resulting scale
    pub fn update_performance(&mut self, current_ms: f32, target_ms: f32) -> f32 {
        let next = self.optimal_roi_scale(current_ms, target_ms, self.current_scale);
        if (next - self.current_scale).abs() > 0.05 {
            log::debug!("ROI scale {:.2} -> {:.2} ({:.1}ms vs {:.1}ms target)", self.current_scale, next, current_ms, target_ms);
        }
        self.current_scale = next;
        next
    }

    /// Remember a detection centre (frame coordinates)
    pub fn record_detection(&mut self, center: Point) {
        if self.history.len() == self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(center);
        self.last_detection = Some(center);
    }

    pub fn last_detection(&self) -> Option<Point> {
        self.last_detection
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        self.last_detection = None;
    }
}

//! Core frame and geometry types shared by every pipeline stage.

use crate::errors::GuideError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bytes per pixel of the packed RGB24 layout used by [`Frame`].
pub const BYTES_PER_PIXEL: usize = 3;

/// Width and height of a frame in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn center(&self) -> Point {
        Point::new(self.width as f32 / 2.0, self.height as f32 / 2.0)
    }
}

/// A point in pixel space (sub-pixel precision)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Integer axis-aligned rectangle in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole frame
    pub fn full(size: FrameSize) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Saturates at `u32::MAX`
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.x as f32
            && point.y >= self.y as f32
            && point.x < self.right() as f32
            && point.y < self.bottom() as f32
    }

    pub fn fits_within(&self, size: FrameSize) -> bool {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        matches!((right, bottom), (Some(r), Some(b)) if r <= size.width && b <= size.height)
    }

    /// Build a rectangle of the requested size centred on `center`, shifted so
    /// it lies fully inside `bounds`. Oversized requests shrink to the bounds.
    pub fn centered_within(center: Point, width: f32, height: f32, bounds: FrameSize) -> Self {
        let width = width.round().clamp(1.0, bounds.width.max(1) as f32) as u32;
        let height = height.round().clamp(1.0, bounds.height.max(1) as f32) as u32;

        let max_x = bounds.width.saturating_sub(width) as f32;
        let max_y = bounds.height.saturating_sub(height) as f32;
        let x = (center.x - width as f32 / 2.0).round().clamp(0.0, max_x) as u32;
        let y = (center.y - height as f32 / 2.0).round().clamp(0.0, max_y) as u32;

        Self::new(x, y, width, height)
    }
}

/// Target region on screen where the lesion should be placed, in frame
/// coordinates. Supplied by the UI and never modified by the core.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuideArea {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl GuideArea {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Square guide centred in the frame, `fraction` of the shorter side.
    pub fn centered(size: FrameSize, fraction: f32) -> Self {
        let side = size.width.min(size.height) as f32 * fraction;
        let center = size.center();
        Self::new(center.x - side / 2.0, center.y - side / 2.0, side, side)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// A single RGB24 video frame as delivered by the camera layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    /// Non-empty and the buffer length matches the declared dimensions
    pub fn is_valid(&self) -> bool {
        !self.size().is_empty()
            && self.data.len() == self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    #[inline]
    pub fn luminance(&self, x: u32, y: u32) -> u8 {
        luma(self.pixel(x, y))
    }

    pub fn from_rgb_image(image: &image::RgbImage) -> Self {
        Self::new(image.as_raw().clone(), image.width(), image.height())
    }

    pub fn to_rgb_image(&self) -> Result<image::RgbImage, GuideError> {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            GuideError::invalid_frame(format!(
                "buffer of {} bytes does not hold a {}x{} RGB image",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }

    /// Borrow the whole frame as a view
    pub fn view(&self) -> Result<FrameView<'_>, GuideError> {
        FrameView::new(self, Rect::full(self.size()), 1)
    }
}

/// BT.601 luma in integer arithmetic so results are bit-reproducible.
#[inline]
pub fn luma(rgb: [u8; 3]) -> u8 {
    ((77 * rgb[0] as u32 + 150 * rgb[1] as u32 + 29 * rgb[2] as u32) >> 8) as u8
}

/// Borrowed, zero-copy sub-window of a [`Frame`], optionally subsampled.
///
/// View pixel `(x, y)` is frame pixel `(origin.x + x * step, origin.y + y * step)`.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    frame: &'a Frame,
    rect: Rect,
    step: u32,
    width: u32,
    height: u32,
}

impl<'a> FrameView<'a> {
    pub fn new(frame: &'a Frame, rect: Rect, step: u32) -> Result<Self, GuideError> {
        if !frame.is_valid() {
            return Err(GuideError::invalid_frame(format!(
                "{}x{} frame with {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            )));
        }
        if step == 0 {
            return Err(GuideError::invalid_frame("sampling step must be >= 1"));
        }
        if !rect.fits_within(frame.size()) {
            return Err(GuideError::invalid_frame(format!(
                "window {:?} exceeds {}x{} frame",
                rect, frame.width, frame.height
            )));
        }

        Ok(Self {
            frame,
            rect,
            step,
            width: rect.width / step,
            height: rect.height / step,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.frame
            .pixel(self.rect.x + x * self.step, self.rect.y + y * self.step)
    }

    #[inline]
    pub fn luminance(&self, x: u32, y: u32) -> u8 {
        luma(self.pixel(x, y))
    }

    /// Write the view's luminance plane, row-major, into `out`.
    pub fn fill_luminance(&self, out: &mut [u8]) {
        let w = self.width as usize;
        for y in 0..self.height {
            let row = &mut out[y as usize * w..(y as usize + 1) * w];
            for (x, value) in row.iter_mut().enumerate() {
                *value = self.luminance(x as u32, y);
            }
        }
    }

    /// Map a view-local point to frame coordinates
    pub fn to_frame(&self, point: Point) -> Point {
        Point::new(
            self.rect.x as f32 + point.x * self.step as f32,
            self.rect.y as f32 + point.y * self.step as f32,
        )
    }

    /// Frame pixels represented by one view pixel
    pub fn pixel_area(&self) -> f32 {
        (self.step * self.step) as f32
    }
}

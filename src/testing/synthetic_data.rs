//! Synthetic lesion frames
//!
//! Skin is rendered as a flat warm tone with per-pixel hash noise (enough
//! texture for the Laplacian to read as sharp), the lesion as a darker brown
//! disk. Optional box blur and brightness offset reproduce the failure modes
//! the analyzer has to flag.

use crate::types::{Frame, BYTES_PER_PIXEL};

/// Parameters for [`synthetic_lesion_frame`]
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticLesion {
    pub width: u32,
    pub height: u32,
    /// Lesion centre in frame pixels
    pub center: (f32, f32),
    pub radius: f32,
    pub skin_color: [u8; 3],
    pub lesion_color: [u8; 3],
    /// Peak per-pixel noise amplitude, applied equally to all channels
    pub noise: u8,
    /// Box blur radius in pixels (0 disables)
    pub blur_radius: u32,
    /// Added to every channel after noise, saturating
    pub brightness_offset: i16,
    pub seed: u64,
}

impl Default for SyntheticLesion {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            center: (320.0, 240.0),
            radius: 60.0,
            skin_color: [224, 172, 140],
            lesion_color: [90, 55, 40],
            noise: 20,
            blur_radius: 0,
            brightness_offset: 0,
            seed: 0,
        }
    }
}

/// SplitMix64 finaliser over pixel position and seed
fn hash(x: u32, y: u32, seed: u64) -> u64 {
    let mut z = seed
        .wrapping_add(((y as u64) << 32) | x as u64)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn noise_at(x: u32, y: u32, seed: u64, amplitude: u8) -> i16 {
    if amplitude == 0 {
        return 0;
    }
    let span = 2 * amplitude as u64 + 1;
    (hash(x, y, seed) % span) as i16 - amplitude as i16
}

/// Render a skin frame with one lesion disk
pub fn synthetic_lesion_frame(spec: &SyntheticLesion) -> Frame {
    let (width, height) = (spec.width, spec.height);
    let mut data = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
    let r2 = spec.radius * spec.radius;

    for y in 0..height {
        for x in 0..width {
            let dx = x as f32 - spec.center.0;
            let dy = y as f32 - spec.center.1;
            let base = if dx * dx + dy * dy <= r2 {
                spec.lesion_color
            } else {
                spec.skin_color
            };
            let n = noise_at(x, y, spec.seed, spec.noise);
            for channel in base {
                let v = channel as i16 + n + spec.brightness_offset;
                data.push(v.clamp(0, 255) as u8);
            }
        }
    }

    if spec.blur_radius > 0 {
        box_blur(&mut data, width as usize, height as usize, spec.blur_radius as usize);
    }

    Frame::new(data, width, height)
}

/// A frame of one flat colour
pub fn uniform_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
    let data = rgb
        .iter()
        .copied()
        .cycle()
        .take(width as usize * height as usize * BYTES_PER_PIXEL)
        .collect();
    Frame::new(data, width, height)
}

/// Separable box blur with edge clamping, in place
fn box_blur(data: &mut [u8], width: usize, height: usize, radius: usize) {
    let mut scratch = vec![0u8; data.len()];
    let window = (2 * radius + 1) as u32;

    for y in 0..height {
        for x in 0..width {
            for c in 0..BYTES_PER_PIXEL {
                let sum: u32 = (0..window as usize)
                    .map(|k| (x + k).saturating_sub(radius).min(width - 1))
                    .map(|xx| data[(y * width + xx) * BYTES_PER_PIXEL + c] as u32)
                    .sum();
                scratch[(y * width + x) * BYTES_PER_PIXEL + c] = (sum / window) as u8;
            }
        }
    }
    for y in 0..height {
        for x in 0..width {
            for c in 0..BYTES_PER_PIXEL {
                let sum: u32 = (0..window as usize)
                    .map(|k| (y + k).saturating_sub(radius).min(height - 1))
                    .map(|yy| scratch[(yy * width + x) * BYTES_PER_PIXEL + c] as u32)
                    .sum();
                data[(y * width + x) * BYTES_PER_PIXEL + c] = (sum / window) as u8;
            }
        }
    }
}

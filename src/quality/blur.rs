/// Sharpness measurement
///
/// Variance of the 4-neighbour Laplacian over a luminance plane. Integer
/// accumulation keeps the result bit-identical across runs.
use serde::{Deserialize, Serialize};

/// Coarse sharpness band relative to the blur threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlurLevel {
    Sharp,
    Acceptable,
    Blurry,
}

impl BlurLevel {
    pub fn classify(sharpness: f32, threshold: f32) -> Self {
        if sharpness < threshold {
            BlurLevel::Blurry
        } else if sharpness < threshold * 2.0 {
            BlurLevel::Acceptable
        } else {
            BlurLevel::Sharp
        }
    }
}

/// Variance of the Laplacian response over interior pixels.
///
/// Planes narrower or shorter than 3 pixels have no interior and score 0.
pub fn laplacian_variance(plane: &[u8], width: usize, height: usize) -> f64 {
    if width < 3 || height < 3 || plane.len() < width * height {
        return 0.0;
    }

    let mut sum: i64 = 0;
    let mut sum_sq: i64 = 0;
    for y in 1..height - 1 {
        let row = y * width;
        for x in 1..width - 1 {
            let idx = row + x;
            let center = plane[idx] as i64;
            let response = 4 * center
                - plane[idx - 1] as i64
                - plane[idx + 1] as i64
                - plane[idx - width] as i64
                - plane[idx + width] as i64;
            sum += response;
            sum_sq += response * response;
        }
    }

    let n = ((width - 2) * (height - 2)) as f64;
    let mean = sum as f64 / n;
    (sum_sq as f64 / n - mean * mean).max(0.0)
}

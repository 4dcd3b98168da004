//! Progress scores and long-form instructions derived from a verdict.

use super::{FailureReason, GuideState, ValidationConfig, ValidationResult};

/// 100 at distance 0, linear to 0 at the centring tolerance, 0 beyond
pub fn centering_percentage(distance: f32, config: &ValidationConfig) -> f32 {
    if distance >= config.centering_tolerance {
        return 0.0;
    }
    let fraction = 1.0 - distance.max(0.0) / config.centering_tolerance;
    fraction.clamp(0.0, 1.0) * 100.0
}

/// Triangular score over the accepted area-ratio range: 100 at its midpoint,
/// 0 at or beyond either edge.
pub fn size_percentage(ratio: f32, config: &ValidationConfig) -> f32 {
    if ratio <= config.min_mole_area_ratio || ratio >= config.max_mole_area_ratio {
        return 0.0;
    }
    let mid = (config.min_mole_area_ratio + config.max_mole_area_ratio) / 2.0;
    let half = (config.max_mole_area_ratio - config.min_mole_area_ratio) / 2.0;
    let fraction = 1.0 - (ratio - mid).abs() / half;
    fraction.clamp(0.0, 1.0) * 100.0
}

pub fn detailed_message(result: &ValidationResult, config: &ValidationConfig) -> String {
    match result.guide_state {
        GuideState::Searching if result.failure_reason == Some(FailureReason::LowConfidence) => {
            "Something is in view but it does not look clearly like a mole. Tilt the camera \
             slightly or improve the lighting so the edges are visible."
                .to_string()
        }
        GuideState::Searching => "Point the camera at the mole and hold it about a hand's width \
             from the skin until the guide finds it."
            .to_string(),
        GuideState::Blurry => "The image is out of focus. Rest your elbow on something stable, \
             hold still and let the camera refocus."
            .to_string(),
        GuideState::PoorLighting if result.failure_reason == Some(FailureReason::TooDark) => {
            "It is too dark to see the mole clearly. Move to a brighter room or turn on a lamp \
             pointed at the skin."
                .to_string()
        }
        GuideState::PoorLighting => "There is too much light on the skin. Avoid direct sunlight \
             or move the lamp further away to remove glare."
            .to_string(),
        GuideState::Centering if result.distance_from_center > 2.0 * config.centering_tolerance => {
            format!(
                "The mole is far from the centre of the guide ({:.0} px). Move the camera until \
                 the mole sits inside the circle.",
                result.distance_from_center
            )
        }
        GuideState::Centering => format!(
            "Almost there. Shift the camera slightly to centre the mole ({:.0} px off).",
            result.distance_from_center
        ),
        GuideState::TooFar => format!(
            "The mole fills {:.0}% of the guide. Move the camera closer until it fills at least \
             {:.0}%.",
            result.mole_area_ratio * 100.0,
            config.min_mole_area_ratio * 100.0
        ),
        GuideState::TooClose => format!(
            "The mole fills {:.0}% of the guide. Move the camera back until it fills at most \
             {:.0}%.",
            result.mole_area_ratio * 100.0,
            config.max_mole_area_ratio * 100.0
        ),
        GuideState::Ready => "Hold still. The photo will be taken automatically.".to_string(),
    }
}

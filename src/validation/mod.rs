/// Capture validation module
///
/// Fuses a detection, the frame's quality metrics and the guide geometry into
/// a single readiness verdict. Checks run in a fixed order and the first one
/// that fails decides the [`GuideState`].
pub mod guidance;

use crate::detection::Detection;
use crate::errors::GuideError;
use crate::quality::QualityMetrics;
use crate::types::{GuideArea, Point};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Per-frame guidance state shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuideState {
    Searching,
    Blurry,
    PoorLighting,
    Centering,
    TooFar,
    TooClose,
    Ready,
}

impl GuideState {
    /// Short phrase for screen-reader announcements
    pub fn announcement(&self) -> &'static str {
        match self {
            GuideState::Searching => "Searching for mole",
            GuideState::Blurry => "Hold steady",
            GuideState::PoorLighting => "Adjust lighting",
            GuideState::Centering => "Center the mole",
            GuideState::TooFar => "Move closer",
            GuideState::TooClose => "Move back",
            GuideState::Ready => "Ready to capture",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GuideState::Searching => "SEARCHING",
            GuideState::Blurry => "BLURRY",
            GuideState::PoorLighting => "POOR_LIGHTING",
            GuideState::Centering => "CENTERING",
            GuideState::TooFar => "TOO_FAR",
            GuideState::TooClose => "TOO_CLOSE",
            GuideState::Ready => "READY",
        }
    }
}

impl std::fmt::Display for GuideState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a frame is not ready for capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    NoMoleDetected,
    Blurry,
    TooDark,
    TooBright,
    LowConfidence,
    NotCentered,
    TooFar,
    TooClose,
}

impl FailureReason {
    pub fn guide_state(&self) -> GuideState {
        match self {
            FailureReason::NoMoleDetected | FailureReason::LowConfidence => GuideState::Searching,
            FailureReason::Blurry => GuideState::Blurry,
            FailureReason::TooDark | FailureReason::TooBright => GuideState::PoorLighting,
            FailureReason::NotCentered => GuideState::Centering,
            FailureReason::TooFar => GuideState::TooFar,
            FailureReason::TooClose => GuideState::TooClose,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            FailureReason::NoMoleDetected => "No mole detected - point the camera at the mole",
            FailureReason::Blurry => "Image is blurry - hold the camera steady",
            FailureReason::TooDark => "Too dark - needs more light",
            FailureReason::TooBright => "Too bright - too much light",
            FailureReason::LowConfidence => "Mole not clearly visible - adjust angle or lighting",
            FailureReason::NotCentered => "Center the mole in the guide",
            FailureReason::TooFar => "Move closer to the mole",
            FailureReason::TooClose => "Move farther from the mole",
        }
    }
}

pub const READY_MESSAGE: &str = "Ready to capture";

/// Verdict for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub can_capture: bool,
    pub guide_state: GuideState,
    pub message: String,
    /// Detection confidence, 0 when nothing was detected
    pub confidence: f32,
    /// Pixels between the detection centre and the guide centre
    pub distance_from_center: f32,
    /// Detection area over guide area
    pub mole_area_ratio: f32,
    /// `None` exactly when `can_capture` is true
    pub failure_reason: Option<FailureReason>,
}

impl ValidationResult {
    fn failed(reason: FailureReason, confidence: f32, distance: f32, ratio: f32) -> Self {
        Self {
            can_capture: false,
            guide_state: reason.guide_state(),
            message: reason.message().to_string(),
            confidence,
            distance_from_center: distance,
            mole_area_ratio: ratio,
            failure_reason: Some(reason),
        }
    }

    fn ready(confidence: f32, distance: f32, ratio: f32) -> Self {
        Self {
            can_capture: true,
            guide_state: GuideState::Ready,
            message: READY_MESSAGE.to_string(),
            confidence,
            distance_from_center: distance,
            mole_area_ratio: ratio,
            failure_reason: None,
        }
    }

    /// Verdict for a frame that could not be analysed at all
    pub fn searching() -> Self {
        Self::failed(FailureReason::NoMoleDetected, 0.0, 0.0, 0.0)
    }
}

/// Geometry and confidence thresholds. Quality thresholds live in
/// [`crate::quality::QualityConfig`]; the validator only reads the flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Maximum centre offset in pixels that still counts as centred
    pub centering_tolerance: f32,
    pub min_mole_area_ratio: f32,
    pub max_mole_area_ratio: f32,
    pub min_confidence: f32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            centering_tolerance: 50.0,
            min_mole_area_ratio: 0.15,
            max_mole_area_ratio: 0.80,
            min_confidence: 0.6,
        }
    }
}

impl ValidationConfig {
    pub fn validate(&self) -> Result<(), GuideError> {
        if !(self.centering_tolerance > 0.0) {
            return Err(GuideError::invalid_config(
                "centering_tolerance must be positive",
            ));
        }
        if !(self.min_mole_area_ratio >= 0.0) {
            return Err(GuideError::invalid_config(
                "min_mole_area_ratio must be non-negative",
            ));
        }
        if !(self.max_mole_area_ratio > self.min_mole_area_ratio) {
            return Err(GuideError::invalid_config(format!(
                "max_mole_area_ratio ({}) must exceed min_mole_area_ratio ({})",
                self.max_mole_area_ratio, self.min_mole_area_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(GuideError::invalid_config(
                "min_confidence must be in [0.0, 1.0]",
            ));
        }
        Ok(())
    }
}

pub struct CaptureValidator {
    config: RwLock<Arc<ValidationConfig>>,
}

impl CaptureValidator {
    pub fn new(config: ValidationConfig) -> Result<Self, GuideError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(Arc::new(config)),
        })
    }

    pub fn config(&self) -> Arc<ValidationConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the active thresholds. Rejected configs leave the current
    /// snapshot in place.
    pub fn update_config(&self, config: ValidationConfig) -> Result<(), GuideError> {
        if let Err(e) = config.validate() {
            log::warn!("Rejected validation config: {}", e);
            return Err(e);
        }
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        log::info!("Validation config updated");
        Ok(())
    }

    /// Judge one frame. First failing check wins:
    /// detection, blur, exposure (dark before bright), confidence, centring,
    /// size.
    pub fn validate(
        &self,
        detection: Option<&Detection>,
        quality: &QualityMetrics,
        guide: &GuideArea,
    ) -> ValidationResult {
        let config = self.config();

        let Some(detection) = detection else {
            return ValidationResult::searching();
        };

        let confidence = detection.confidence;
        let distance = detection.center.distance_to(&guide.center());
        let guide_area = guide.area();
        let ratio = if guide_area > 0.0 {
            detection.area / guide_area
        } else {
            0.0
        };
        let fail = |reason| ValidationResult::failed(reason, confidence, distance, ratio);

        if quality.is_blurry {
            return fail(FailureReason::Blurry);
        }
        if quality.is_underexposed {
            return fail(FailureReason::TooDark);
        }
        if quality.is_overexposed {
            return fail(FailureReason::TooBright);
        }
        // Negated so NaN fails every check
        if !(confidence >= config.min_confidence) {
            return fail(FailureReason::LowConfidence);
        }
        if !(distance <= config.centering_tolerance) {
            return fail(FailureReason::NotCentered);
        }
        if !(ratio >= config.min_mole_area_ratio) {
            return fail(FailureReason::TooFar);
        }
        if !(ratio <= config.max_mole_area_ratio) {
            return fail(FailureReason::TooClose);
        }

        ValidationResult::ready(confidence, distance, ratio)
    }

    /// 100 at the guide centre, falling linearly to 0 at the tolerance radius
    pub fn centering_percentage(&self, point: &Point, center: &Point) -> f32 {
        guidance::centering_percentage(point.distance_to(center), &self.config())
    }

    /// 100 at the middle of the accepted ratio range, 0 at either edge
    pub fn size_percentage(&self, ratio: f32) -> f32 {
        guidance::size_percentage(ratio, &self.config())
    }

    pub fn detailed_guidance_message(&self, result: &ValidationResult) -> String {
        guidance::detailed_message(result, &self.config())
    }
}

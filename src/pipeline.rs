//! Per-frame guidance loop
//!
//! Throttle, pick a window, detect, score quality, validate, drive the
//! countdown and feed the measured latency back into the governor and the
//! ROI sizing.

use crate::auto_capture::{AutoCaptureController, AutoCaptureListener, AutoCaptureState};
use crate::config::GuideConfig;
use crate::detection::{Detection, RegionDetector};
use crate::errors::GuideError;
use crate::governor::ResourceGovernor;
use crate::quality::{QualityAnalyzer, QualityMetrics};
use crate::roi::{sampling_step, RoiOptimizer, RoiResult};
use crate::timing::FrameClock;
use crate::types::{Frame, GuideArea};
use crate::validation::{CaptureValidator, ValidationResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;

/// Everything computed for one processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Milliseconds from pipeline creation to the start of this frame
    pub session_time_ms: f64,
    pub validation: ValidationResult,
    pub detection: Option<Detection>,
    pub quality: QualityMetrics,
    pub roi: RoiResult,
    pub processing_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameOutcome {
    Processed(FrameReport),
    /// Dropped by the governor's frequency throttle
    Skipped { frame_index: u64 },
}

impl FrameOutcome {
    pub fn validation(&self) -> Option<&ValidationResult> {
        match self {
            FrameOutcome::Processed(report) => Some(&report.validation),
            FrameOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FrameOutcome::Skipped { .. })
    }
}

pub struct GuidancePipeline {
    detector: RegionDetector,
    analyzer: QualityAnalyzer,
    validator: CaptureValidator,
    auto_capture: AutoCaptureController,
    roi: Mutex<RoiOptimizer>,
    governor: Arc<ResourceGovernor>,
    clock: FrameClock,
    frame_index: AtomicU64,
}

impl GuidancePipeline {
    /// Wire every stage. The countdown runs on the current tokio runtime.
    pub fn new(
        config: GuideConfig,
        governor: Arc<ResourceGovernor>,
        listener: Arc<dyn AutoCaptureListener>,
    ) -> Result<Self, GuideError> {
        let handle = Handle::try_current()
            .map_err(|e| GuideError::Runtime(format!("pipeline needs a tokio runtime: {}", e)))?;
        Self::with_handle(config, governor, listener, handle)
    }

    pub fn with_handle(
        config: GuideConfig,
        governor: Arc<ResourceGovernor>,
        listener: Arc<dyn AutoCaptureListener>,
        handle: Handle,
    ) -> Result<Self, GuideError> {
        config.validate()?;
        governor.update_config(config.performance.clone())?;
        let pool = governor.pool();

        Ok(Self {
            detector: RegionDetector::new(config.detector, pool.clone())?,
            analyzer: QualityAnalyzer::new(config.quality, pool)?,
            validator: CaptureValidator::new(config.validation)?,
            auto_capture: AutoCaptureController::with_handle(config.auto_capture, listener, handle)?,
            roi: Mutex::new(RoiOptimizer::new(config.roi)?),
            governor,
            clock: FrameClock::new(),
            frame_index: AtomicU64::new(0),
        })
    }

    fn roi(&self) -> MutexGuard<'_, RoiOptimizer> {
        self.roi.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one frame through the pipeline. Never fails: unusable frames
    /// produce a SEARCHING verdict.
    pub fn on_frame(&self, frame: &Frame, guide: &GuideArea) -> FrameOutcome {
        let frame_index = self.frame_index.fetch_add(1, Ordering::SeqCst);
        if !self.governor.should_process_frame(frame_index) {
            log::trace!("Frame {} skipped by throttle", frame_index);
            return FrameOutcome::Skipped { frame_index };
        }

        let session_time_ms = self.clock.elapsed_ms();
        let stopwatch = self.clock.stopwatch();
        let state = self.governor.state();
        let roi = {
            let optimizer = self.roi();
            optimizer
                .compute_roi(frame.size(), optimizer.current_scale() * state.roi_scale)
                .downsampled(sampling_step(state.resolution_scale))
        };

        let (detection, quality) = match roi.view(frame) {
            Ok(view) => (self.detector.detect(&view), self.analyzer.analyze(&view)),
            Err(e) => {
                log::warn!("Frame {} rejected: {}", frame_index, e);
                (None, QualityMetrics::default())
            }
        };

        let validation = self.validator.validate(detection.as_ref(), &quality, guide);
        self.auto_capture.process_validation_result(&validation);

        let processing_time_ms = stopwatch.elapsed_ms();
        self.governor.record_frame_processing_time(processing_time_ms);
        {
            let mut optimizer = self.roi();
            if let Some(d) = &detection {
                optimizer.record_detection(d.center);
            }
            let target = self.governor.config().target_frame_time_ms;
            optimizer.update_performance(processing_time_ms as f32, target);
        }

        log::debug!(
            "Frame {}: {} ({:.1}ms)",
            frame_index,
            validation.guide_state,
            processing_time_ms
        );

        FrameOutcome::Processed(FrameReport {
            frame_index,
            session_time_ms,
            validation,
            detection,
            quality,
            roi,
            processing_time_ms,
        })
    }

    /// Validate the whole config, then swap every stage's section
    pub fn update_config(&self, config: GuideConfig) -> Result<(), GuideError> {
        config.validate()?;
        self.detector.update_config(config.detector)?;
        self.analyzer.update_config(config.quality)?;
        self.validator.update_config(config.validation)?;
        self.auto_capture.update_config(config.auto_capture)?;
        self.roi().update_config(config.roi)?;
        self.governor.update_config(config.performance)?;
        Ok(())
    }

    pub fn cancel_auto_capture(&self) -> bool {
        self.auto_capture.cancel()
    }

    pub fn force_capture(&self) {
        self.auto_capture.force_capture();
    }

    pub fn set_auto_capture_enabled(&self, enabled: bool) {
        self.auto_capture.set_enabled(enabled);
    }

    pub fn auto_capture_state(&self) -> AutoCaptureState {
        self.auto_capture.state()
    }

    pub fn auto_capture(&self) -> &AutoCaptureController {
        &self.auto_capture
    }

    pub fn validator(&self) -> &CaptureValidator {
        &self.validator
    }

    pub fn governor(&self) -> &Arc<ResourceGovernor> {
        &self.governor
    }

    pub fn frames_seen(&self) -> u64 {
        self.frame_index.load(Ordering::SeqCst)
    }

    /// Cancel the countdown, forget ROI history and release pooled buffers
    pub fn cleanup(&self) {
        self.auto_capture.cancel();
        self.roi().clear_history();
        self.governor.cleanup();
        log::info!("Guidance pipeline cleaned up");
    }
}

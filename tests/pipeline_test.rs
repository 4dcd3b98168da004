//! End-to-end tests for the guidance pipeline on synthetic frames
//!
//! Each test drives `GuidancePipeline::on_frame` the way a camera callback
//! would and checks the verdict, the countdown and the governor feedback.

use dermacapture::auto_capture::{AutoCaptureConfig, AutoCaptureListener, AutoCaptureState, NoopListener};
use dermacapture::governor::{DeviceProfile, PerformanceConfig, ThermalState};
use dermacapture::testing::{synthetic_lesion_frame, uniform_frame, SyntheticLesion};
use dermacapture::{
    DetectionMethod, FailureReason, Frame, FrameOutcome, GuideArea, GuideConfig, GuideState,
    GuidancePipeline, ResourceGovernor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Recorder {
    ticks: AtomicUsize,
    triggers: AtomicUsize,
    cancels: AtomicUsize,
}

impl AutoCaptureListener for Recorder {
    fn on_countdown_tick(&self, _remaining: u32) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    fn on_capture_triggered(&self) {
        self.triggers.fetch_add(1, Ordering::SeqCst);
    }

    fn on_countdown_cancelled(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

fn governor() -> Arc<ResourceGovernor> {
    Arc::new(ResourceGovernor::new(PerformanceConfig::default(), DeviceProfile::default()).unwrap())
}

fn pipeline_with(listener: Arc<dyn AutoCaptureListener>) -> GuidancePipeline {
    GuidancePipeline::new(GuideConfig::default(), governor(), listener).unwrap()
}

/// Lesion sized to fill about a third of a 0.4 guide
fn centred_lesion() -> SyntheticLesion {
    SyntheticLesion {
        radius: 65.0,
        ..Default::default()
    }
}

fn guide_for(frame: &Frame) -> GuideArea {
    GuideArea::centered(frame.size(), 0.4)
}

fn verdict(outcome: &FrameOutcome) -> (GuideState, Option<FailureReason>) {
    let result = outcome.validation().expect("frame should have been processed");
    (result.guide_state, result.failure_reason)
}

#[tokio::test(start_paused = true)]
async fn centred_lesion_is_ready_and_captures() {
    let recorder = Arc::new(Recorder::default());
    let pipeline = pipeline_with(recorder.clone());
    let frame = synthetic_lesion_frame(&centred_lesion());

    let outcome = pipeline.on_frame(&frame, &guide_for(&frame));
    let FrameOutcome::Processed(report) = &outcome else {
        panic!("first frame must be processed");
    };
    assert!(report.validation.can_capture, "{:?}", report.validation);
    assert_eq!(report.validation.guide_state, GuideState::Ready);

    let detection = report.detection.as_ref().unwrap();
    assert_eq!(detection.method, DetectionMethod::Threshold);
    assert!((detection.center.x - 320.0).abs() < 3.0);
    assert!((detection.center.y - 240.0).abs() < 3.0);
    assert!(report.roi.rect.fits_within(frame.size()));
    assert!(!report.quality.has_issue());

    assert_eq!(pipeline.auto_capture_state(), AutoCaptureState::Counting(3));
    assert_eq!(recorder.ticks.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(3100)).await;
    assert_eq!(recorder.triggers.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.ticks.load(Ordering::SeqCst), 3);
    assert_eq!(pipeline.auto_capture_state(), AutoCaptureState::Idle);
}

#[tokio::test(start_paused = true)]
async fn bad_frame_cancels_running_countdown() {
    let recorder = Arc::new(Recorder::default());
    let pipeline = pipeline_with(recorder.clone());
    let good = synthetic_lesion_frame(&centred_lesion());
    let empty = uniform_frame(640, 480, [224, 172, 140]);

    pipeline.on_frame(&good, &guide_for(&good));
    assert!(pipeline.auto_capture().is_counting());

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let outcome = pipeline.on_frame(&empty, &guide_for(&empty));
    assert_eq!(verdict(&outcome).0, GuideState::Searching);
    assert_eq!(pipeline.auto_capture_state(), AutoCaptureState::Idle);
    assert_eq!(recorder.cancels.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(recorder.triggers.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn blurred_lesion_is_blurry() {
    let pipeline = pipeline_with(Arc::new(NoopListener));
    let frame = synthetic_lesion_frame(&SyntheticLesion {
        blur_radius: 3,
        ..centred_lesion()
    });

    let outcome = pipeline.on_frame(&frame, &guide_for(&frame));
    assert_eq!(verdict(&outcome), (GuideState::Blurry, Some(FailureReason::Blurry)));
    assert!(!pipeline.auto_capture().is_counting());
}

#[tokio::test]
async fn washed_out_skin_is_poor_lighting() {
    let pipeline = pipeline_with(Arc::new(NoopListener));
    // Neutral skin at 245 +/- 10: every skin pixel clipped, texture still sharp
    let frame = synthetic_lesion_frame(&SyntheticLesion {
        skin_color: [245, 245, 245],
        noise: 10,
        ..centred_lesion()
    });

    let outcome = pipeline.on_frame(&frame, &guide_for(&frame));
    let result = outcome.validation().unwrap();
    assert_eq!(result.guide_state, GuideState::PoorLighting);
    assert_eq!(result.failure_reason, Some(FailureReason::TooBright));
    assert!(result.message.contains("too much light"));
}

#[tokio::test]
async fn featureless_skin_is_searching() {
    let pipeline = pipeline_with(Arc::new(NoopListener));
    let frame = uniform_frame(640, 480, [224, 172, 140]);

    let outcome = pipeline.on_frame(&frame, &guide_for(&frame));
    let FrameOutcome::Processed(report) = outcome else {
        panic!("expected a processed frame");
    };
    assert!(report.detection.is_none());
    assert_eq!(report.validation.guide_state, GuideState::Searching);
    assert_eq!(report.validation.failure_reason, Some(FailureReason::NoMoleDetected));
}

#[tokio::test]
async fn off_centre_lesion_needs_centering() {
    let pipeline = pipeline_with(Arc::new(NoopListener));
    let frame = synthetic_lesion_frame(&SyntheticLesion {
        center: (400.0, 240.0),
        ..centred_lesion()
    });

    let outcome = pipeline.on_frame(&frame, &guide_for(&frame));
    let result = outcome.validation().unwrap();
    assert_eq!(result.guide_state, GuideState::Centering);
    assert!(result.distance_from_center > 50.0);
    let advice = pipeline.validator().detailed_guidance_message(result);
    assert!(advice.contains("px"));
}

#[tokio::test]
async fn malformed_frame_is_searching_without_panic() {
    let pipeline = pipeline_with(Arc::new(NoopListener));
    let frame = Frame::new(vec![0u8; 100], 640, 480);
    let guide = GuideArea::centered(frame.size(), 0.4);

    let outcome = pipeline.on_frame(&frame, &guide);
    assert_eq!(verdict(&outcome), (GuideState::Searching, Some(FailureReason::NoMoleDetected)));

    let empty = Frame::new(Vec::new(), 0, 0);
    let outcome = pipeline.on_frame(&empty, &GuideArea::new(0.0, 0.0, 0.0, 0.0));
    assert_eq!(verdict(&outcome).0, GuideState::Searching);
}

#[tokio::test]
async fn critical_thermal_state_skips_frames() {
    let pipeline = pipeline_with(Arc::new(NoopListener));
    pipeline.governor().set_thermal_state(ThermalState::Critical);
    let frame = uniform_frame(64, 64, [200, 150, 120]);
    let guide = guide_for(&frame);

    let skipped: Vec<bool> = (0..6)
        .map(|_| pipeline.on_frame(&frame, &guide).is_skipped())
        .collect();
    assert_eq!(skipped, vec![false, true, true, false, true, true]);
    assert_eq!(pipeline.frames_seen(), 6);
}

#[tokio::test]
async fn severe_thermal_state_shrinks_and_subsamples_window() {
    let pipeline = pipeline_with(Arc::new(NoopListener));
    let frame = synthetic_lesion_frame(&centred_lesion());
    let guide = guide_for(&frame);

    let FrameOutcome::Processed(cool) = pipeline.on_frame(&frame, &guide) else {
        panic!("frame 0 is always processed");
    };
    pipeline.governor().set_thermal_state(ThermalState::Severe);
    // Severe halves the frame rate; index 2 is the next processed frame
    assert!(pipeline.on_frame(&frame, &guide).is_skipped());
    let FrameOutcome::Processed(hot) = pipeline.on_frame(&frame, &guide) else {
        panic!("frame 2 should be processed");
    };

    assert_eq!(cool.roi.step, 1);
    assert_eq!(hot.roi.step, 2);
    assert!(hot.roi.rect.area() < cool.roi.rect.area());
}

#[tokio::test]
async fn invalid_config_update_is_rejected_whole() {
    let pipeline = pipeline_with(Arc::new(NoopListener));
    let mut config = GuideConfig::default();
    config.detector.min_region_area = 10.0;
    config.validation.min_confidence = 2.0;

    assert!(pipeline.update_config(config).is_err());
    assert_eq!(pipeline.validator().config().min_confidence, 0.6);
}

#[tokio::test]
async fn disabling_auto_capture_through_config_cancels() {
    let recorder = Arc::new(Recorder::default());
    let pipeline = pipeline_with(recorder.clone());
    let frame = synthetic_lesion_frame(&centred_lesion());
    pipeline.on_frame(&frame, &guide_for(&frame));
    assert!(pipeline.auto_capture().is_counting());

    let config = GuideConfig {
        auto_capture: AutoCaptureConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };
    pipeline.update_config(config).unwrap();
    assert!(!pipeline.auto_capture().is_enabled());
    assert_eq!(pipeline.auto_capture_state(), AutoCaptureState::Idle);
    assert_eq!(recorder.cancels.load(Ordering::SeqCst), 1);

    // Ready frames no longer start a countdown
    pipeline.on_frame(&frame, &guide_for(&frame));
    assert!(!pipeline.auto_capture().is_counting());

    // A manual shutter still works
    pipeline.force_capture();
    assert_eq!(recorder.triggers.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cleanup_releases_resources() {
    let pipeline = pipeline_with(Arc::new(NoopListener));
    let frame = synthetic_lesion_frame(&centred_lesion());
    pipeline.on_frame(&frame, &guide_for(&frame));
    assert!(pipeline.governor().pool().pool_size() > 0);

    pipeline.cleanup();
    assert_eq!(pipeline.governor().pool().pool_size(), 0);
    assert_eq!(pipeline.auto_capture_state(), AutoCaptureState::Idle);
    pipeline.cleanup();
}

#[test]
fn pipeline_requires_a_runtime() {
    let result = GuidancePipeline::new(GuideConfig::default(), governor(), Arc::new(NoopListener));
    assert!(result.is_err());
}

#[tokio::test]
async fn pipeline_config_sets_pool_capacity() {
    let mut config = GuideConfig::default();
    config.performance.max_pool_size = 2;
    let pipeline = GuidancePipeline::new(config, governor(), Arc::new(NoopListener)).unwrap();

    let governor = pipeline.governor();
    assert_eq!(governor.config().max_pool_size, 2);
    assert_eq!(governor.pool().max_pool_size(), 2);

    let frame = synthetic_lesion_frame(&centred_lesion());
    for _ in 0..3 {
        pipeline.on_frame(&frame, &guide_for(&frame));
    }
    assert!(governor.pool().pool_size() <= 2);
}

#[tokio::test]
async fn reports_are_stamped_on_the_session_clock() {
    let pipeline = pipeline_with(Arc::new(NoopListener));
    let frame = synthetic_lesion_frame(&centred_lesion());

    let stamps: Vec<f64> = (0..3)
        .map(|_| match pipeline.on_frame(&frame, &guide_for(&frame)) {
            FrameOutcome::Processed(report) => report.session_time_ms,
            FrameOutcome::Skipped { .. } => panic!("no throttle expected"),
        })
        .collect();
    assert!(stamps[0] >= 0.0);
    assert!(stamps.windows(2).all(|w| w[1] >= w[0]), "{:?}", stamps);
}

#[tokio::test(start_paused = true)]
async fn disabled_controller_never_fires_pending_countdown() {
    let recorder = Arc::new(Recorder::default());
    let pipeline = pipeline_with(recorder.clone());
    let frame = synthetic_lesion_frame(&centred_lesion());

    pipeline.on_frame(&frame, &guide_for(&frame));
    assert_eq!(pipeline.auto_capture_state(), AutoCaptureState::Counting(3));

    pipeline.set_auto_capture_enabled(false);
    pipeline.on_frame(&frame, &guide_for(&frame));
    assert_eq!(pipeline.auto_capture_state(), AutoCaptureState::Idle);

    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert_eq!(recorder.triggers.load(Ordering::SeqCst), 0);
    assert_eq!(recorder.cancels.load(Ordering::SeqCst), 1);
}

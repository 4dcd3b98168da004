//! Property-Based Tests for the capture validator
//!
//! Priority ordering, threshold boundaries and the progress percentages,
//! checked over generated detections and quality readings.
//!
//! Run with: cargo test --test validator_props

use dermacapture::quality::QualityMetrics;
use dermacapture::validation::{CaptureValidator, FailureReason, GuideState, ValidationConfig};
use dermacapture::{Detection, GuideArea, Point};
use proptest::prelude::*;

fn validator() -> CaptureValidator {
    CaptureValidator::new(ValidationConfig::default()).unwrap()
}

/// Centre (200, 200), area 40 000
fn guide() -> GuideArea {
    GuideArea::new(100.0, 100.0, 200.0, 200.0)
}

fn quality(blurry: bool, under: bool, over: bool) -> QualityMetrics {
    QualityMetrics {
        sharpness: if blurry { 10.0 } else { 500.0 },
        brightness: 128.0,
        contrast: 40.0,
        is_blurry: blurry,
        is_underexposed: under,
        is_overexposed: over,
        ..Default::default()
    }
}

fn arb_detection() -> impl Strategy<Value = Detection> {
    (0.0f32..400.0, 0.0f32..400.0, 0.0f32..60_000.0, 0.0f32..=1.0)
        .prop_map(|(x, y, area, conf)| Detection::from_geometry(Point::new(x, y), area, conf))
}

// ═══════════════════════════════════════════════════════════════════════════
// PRIORITY ORDERING
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: blur wins over every other problem
    #[test]
    fn blur_outranks_geometry_and_exposure(
        detection in arb_detection(),
        under in any::<bool>(),
        over in any::<bool>(),
    ) {
        let result = validator().validate(Some(&detection), &quality(true, under, over), &guide());
        prop_assert_eq!(result.guide_state, GuideState::Blurry);
        prop_assert_eq!(result.failure_reason, Some(FailureReason::Blurry));
        prop_assert!(!result.can_capture);
    }

    /// INVARIANT: low confidence reads as SEARCHING whatever the geometry
    #[test]
    fn low_confidence_is_searching(
        x in 0.0f32..400.0,
        y in 0.0f32..400.0,
        area in 0.0f32..60_000.0,
        confidence in 0.0f32..0.6,
    ) {
        let detection = Detection::from_geometry(Point::new(x, y), area, confidence);
        let result = validator().validate(Some(&detection), &quality(false, false, false), &guide());
        prop_assert!(!result.can_capture);
        prop_assert_eq!(result.guide_state, GuideState::Searching);
        prop_assert_eq!(result.failure_reason, Some(FailureReason::LowConfidence));
    }

    /// INVARIANT: underexposure is reported before overexposure
    #[test]
    fn dark_before_bright(detection in arb_detection()) {
        let result = validator().validate(Some(&detection), &quality(false, true, true), &guide());
        prop_assert_eq!(result.failure_reason, Some(FailureReason::TooDark));
        prop_assert_eq!(result.guide_state, GuideState::PoorLighting);
    }

    /// INVARIANT: a failure reason is present exactly when capture is refused
    #[test]
    fn failure_reason_iff_not_ready(
        detection in proptest::option::of(arb_detection()),
        blurry in any::<bool>(),
        under in any::<bool>(),
        over in any::<bool>(),
    ) {
        let result = validator().validate(detection.as_ref(), &quality(blurry, under, over), &guide());
        prop_assert_eq!(result.can_capture, result.failure_reason.is_none());
        prop_assert_eq!(result.can_capture, result.guide_state == GuideState::Ready);
        if let Some(reason) = result.failure_reason {
            prop_assert_eq!(reason.guide_state(), result.guide_state);
        }
    }

    /// INVARIANT: centred, well-sized, confident detections on a good frame
    /// are always ready
    #[test]
    fn good_geometry_is_ready(
        dx in -35.0f32..35.0,
        dy in -35.0f32..35.0,
        ratio in 0.16f32..0.79,
        confidence in 0.6f32..=1.0,
    ) {
        let detection = Detection::from_geometry(
            Point::new(200.0 + dx, 200.0 + dy),
            ratio * 40_000.0,
            confidence,
        );
        let result = validator().validate(Some(&detection), &quality(false, false, false), &guide());
        prop_assert!(result.can_capture, "{:?}", result);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROGRESS PERCENTAGES
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: centring score is non-increasing in distance and bounded
    #[test]
    fn centering_percentage_is_monotonic(a in 0.0f32..200.0, b in 0.0f32..200.0) {
        let v = validator();
        let center = Point::new(0.0, 0.0);
        let (near, far) = if a <= b { (a, b) } else { (b, a) };
        let p_near = v.centering_percentage(&Point::new(near, 0.0), &center);
        let p_far = v.centering_percentage(&Point::new(far, 0.0), &center);
        prop_assert!(p_near >= p_far);
        prop_assert!((0.0..=100.0).contains(&p_near));
        if far >= 50.0 {
            prop_assert_eq!(p_far, 0.0);
        }
    }

    /// INVARIANT: size score peaks at the range midpoint and is zero outside
    #[test]
    fn size_percentage_peaks_at_midpoint(ratio in 0.0f32..2.0) {
        let v = validator();
        let score = v.size_percentage(ratio);
        prop_assert!(score <= v.size_percentage(0.475) + 1e-3);
        prop_assert!((0.0..=100.0).contains(&score));
        if ratio <= 0.15 || ratio >= 0.80 {
            prop_assert_eq!(score, 0.0);
        }
    }
}

#[test]
fn centering_percentage_at_zero_distance() {
    let v = validator();
    let p = Point::new(200.0, 200.0);
    assert_eq!(v.centering_percentage(&p, &p), 100.0);
}

#[test]
fn detailed_message_for_every_state() {
    let v = validator();
    let g = guide();
    let cases = [
        (None, quality(false, false, false)),
        (Some(Detection::from_geometry(Point::new(200.0, 200.0), 19_000.0, 0.9)), quality(true, false, false)),
        (Some(Detection::from_geometry(Point::new(200.0, 200.0), 19_000.0, 0.9)), quality(false, true, false)),
        (Some(Detection::from_geometry(Point::new(320.0, 200.0), 19_000.0, 0.9)), quality(false, false, false)),
        (Some(Detection::from_geometry(Point::new(200.0, 200.0), 1_000.0, 0.9)), quality(false, false, false)),
        (Some(Detection::from_geometry(Point::new(200.0, 200.0), 39_000.0, 0.9)), quality(false, false, false)),
        (Some(Detection::from_geometry(Point::new(200.0, 200.0), 19_000.0, 0.9)), quality(false, false, false)),
    ];
    let mut messages = Vec::new();
    for (detection, q) in &cases {
        let result = v.validate(detection.as_ref(), q, &g);
        let message = v.detailed_guidance_message(&result);
        assert!(!message.is_empty());
        messages.push(message);
    }
    messages.sort();
    messages.dedup();
    assert_eq!(messages.len(), cases.len());
}

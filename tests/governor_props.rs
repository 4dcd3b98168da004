//! Property-Based Tests for the resource governor and buffer pool
//!
//! Run with: cargo test --test governor_props

use dermacapture::governor::{
    battery_adjustment, DeviceProfile, FrameBufferPool, PerformanceConfig, ResourceGovernor,
    ThermalState,
};
use dermacapture::FrameSize;
use proptest::prelude::*;

fn governor() -> ResourceGovernor {
    ResourceGovernor::new(PerformanceConfig::default(), DeviceProfile::default()).unwrap()
}

#[derive(Debug, Clone)]
enum PoolOp {
    Acquire(usize),
    Release(usize),
    Cleanup,
}

fn arb_pool_op() -> impl Strategy<Value = PoolOp> {
    prop_oneof![
        4 => (1usize..4096).prop_map(PoolOp::Acquire),
        4 => (1usize..4096).prop_map(PoolOp::Release),
        1 => Just(PoolOp::Cleanup),
    ]
}

fn arb_thermal() -> impl Strategy<Value = ThermalState> {
    prop::sample::select(ThermalState::ALL.to_vec())
}

// ═══════════════════════════════════════════════════════════════════════════
// BUFFER POOL
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: the pool never parks more than its capacity
    #[test]
    fn pool_size_bounded(
        max in 1usize..8,
        ops in prop::collection::vec(arb_pool_op(), 0..64),
    ) {
        let pool = FrameBufferPool::new(max);
        let mut held = Vec::new();
        for op in ops {
            match op {
                PoolOp::Acquire(len) => {
                    let buf = pool.acquire(len);
                    prop_assert_eq!(buf.len(), len);
                    prop_assert!(buf.iter().all(|&b| b == 0));
                    held.push(buf.detach());
                }
                PoolOp::Release(len) => {
                    let buf = held.pop().unwrap_or_else(|| vec![0xAA; len]);
                    pool.release(buf);
                }
                PoolOp::Cleanup => {
                    pool.cleanup();
                    prop_assert_eq!(pool.pool_size(), 0);
                }
            }
            prop_assert!(pool.pool_size() <= max);
        }
        pool.cleanup();
        prop_assert_eq!(pool.pool_size(), 0);
    }

    /// INVARIANT: scoped borrows return on drop and recycled buffers are zeroed
    #[test]
    fn scoped_borrows_return_zeroed(w in 1u32..64, h in 1u32..64, rounds in 1usize..10) {
        let pool = FrameBufferPool::new(2);
        for _ in 0..rounds {
            let mut plane = pool.acquire_plane(FrameSize::new(w, h));
            prop_assert_eq!(plane.len(), (w * h) as usize);
            prop_assert!(plane.iter().all(|&b| b == 0));
            plane.fill(0xFF);
        }
        prop_assert_eq!(pool.pool_size(), 1);
        prop_assert_eq!(pool.allocations(), 1);
        prop_assert_eq!(pool.reuses(), rounds as u64 - 1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// GOVERNOR
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: adjusted frequency stays in (0, base]
    #[test]
    fn adjusted_frequency_in_range(
        base in 1u32..240,
        thermal in arb_thermal(),
        battery in 0.0f32..=1.0,
        charging in any::<bool>(),
    ) {
        let g = governor();
        g.set_thermal_state(thermal);
        g.set_battery_level(battery, charging);
        let adjusted = g.calculate_adjusted_frequency(base);
        prop_assert!(adjusted >= 1 && adjusted <= base);
    }

    /// INVARIANT: the snapshot is the minimum over all signals
    #[test]
    fn snapshot_never_exceeds_any_signal(
        thermal in arb_thermal(),
        battery in 0.0f32..=1.0,
        charging in any::<bool>(),
        cores in 1u32..16,
        memory in 512u32..16384,
    ) {
        let g = governor();
        g.set_thermal_state(thermal);
        g.set_battery_level(battery, charging);
        g.set_device_profile(DeviceProfile { cpu_cores: cores, total_memory_mb: memory });
        let state = g.state();
        let t = thermal.adjustment();
        let b = battery_adjustment(battery, charging);
        prop_assert!(state.frequency_multiplier <= t.frequency_multiplier.min(b.frequency_multiplier));
        prop_assert!(state.resolution_scale <= t.resolution_scale.min(b.resolution_scale));
        prop_assert!(state.roi_scale <= t.roi_scale.min(b.roi_scale));
        prop_assert!(state.max_concurrent_ops >= 1);
        prop_assert!(state.max_concurrent_ops <= t.max_concurrent_ops.min(b.max_concurrent_ops));
        prop_assert!(state.frequency_multiplier > 0.0);
    }

    /// INVARIANT: a lower battery never loosens the budget
    #[test]
    fn battery_monotonic(a in 0.0f32..=1.0, b in 0.0f32..=1.0) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let at_low = battery_adjustment(low, false);
        let at_high = battery_adjustment(high, false);
        prop_assert!(at_low.frequency_multiplier <= at_high.frequency_multiplier);
        prop_assert!(at_low.resolution_scale <= at_high.resolution_scale);
        prop_assert!(at_low.roi_scale <= at_high.roi_scale);
        prop_assert!(at_low.max_concurrent_ops <= at_high.max_concurrent_ops);
        prop_assert_eq!(battery_adjustment(low, true), battery_adjustment(1.0, false));
    }

    /// INVARIANT: out-of-range battery readings are clamped
    #[test]
    fn battery_level_clamped(level in -10.0f32..10.0) {
        let g = governor();
        g.set_battery_level(level, false);
        let stored = g.state().battery_level;
        prop_assert!((0.0..=1.0).contains(&stored));
    }

    /// INVARIANT: the frame throttle processes exactly one frame per interval
    #[test]
    fn throttle_matches_interval(thermal in arb_thermal(), frames in 1u64..200) {
        let g = governor();
        g.set_thermal_state(thermal);
        let interval = g.state().frame_interval();
        let processed = (0..frames).filter(|&i| g.should_process_frame(i)).count() as u64;
        prop_assert_eq!(processed, (frames + interval - 1) / interval);
    }
}

#[test]
fn thermal_states_are_monotonic_through_governor() {
    let g = governor();
    let mut previous = g.state();
    for state in ThermalState::ALL {
        g.set_thermal_state(state);
        let current = g.state();
        assert!(current.frequency_multiplier <= previous.frequency_multiplier);
        assert!(current.resolution_scale <= previous.resolution_scale);
        assert!(current.roi_scale <= previous.roi_scale);
        assert!(current.max_concurrent_ops <= previous.max_concurrent_ops);
        previous = current;
    }
    assert_eq!(previous.thermal_state, ThermalState::Emergency);
}

#[test]
fn sustained_slow_frames_degrade_then_recover() {
    let config = PerformanceConfig {
        target_frame_time_ms: 10.0,
        latency_window: 5,
        ..Default::default()
    };
    let g = ResourceGovernor::new(config, DeviceProfile::default()).unwrap();

    for _ in 0..5 {
        g.record_frame_processing_time(40.0);
    }
    let degraded = g.state();
    assert_eq!(degraded.degradation_level, 1);
    assert!(degraded.resolution_scale < 1.0);

    // A single fast frame after the restart is not sustained evidence
    g.record_frame_processing_time(1.0);
    assert_eq!(g.state().degradation_level, 1);

    for _ in 0..4 {
        g.record_frame_processing_time(1.0);
    }
    assert_eq!(g.state().degradation_level, 0);
}

#[test]
fn cleanup_empties_pool_and_is_idempotent() {
    let g = governor();
    let pool = g.pool();
    drop(pool.acquire(128));
    drop(pool.acquire(64));
    assert_eq!(pool.pool_size(), 1);

    g.cleanup();
    assert_eq!(pool.pool_size(), 0);
    g.cleanup();
    assert_eq!(pool.pool_size(), 0);
    assert_eq!(g.average_frame_time_ms(), 0.0);
}

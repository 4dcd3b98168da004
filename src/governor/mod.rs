/// Resource governor
///
/// Keeps the per-frame cost bounded on constrained hardware by combining
/// thermal state, battery level, device tier and measured latency into one
/// [`ResourceState`] snapshot. Owns the shared [`FrameBufferPool`].
pub mod pool;
pub mod thermal;

pub use pool::{FrameBufferPool, PooledBuffer};
pub use thermal::{
    battery_adjustment, Adjustment, DevicePerformanceTier, DeviceProfile, ThermalState,
};

use crate::errors::GuideError;
use crate::timing::RollingAverage;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::watch;

/// Deepest sustained-latency degradation level
pub const MAX_DEGRADATION_LEVEL: u32 = 3;

/// Performance budget configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Per-frame processing budget in milliseconds
    pub target_frame_time_ms: f32,
    /// Number of frames in the rolling latency window
    pub latency_window: usize,
    /// Buffers retained by the frame buffer pool
    pub max_pool_size: usize,
    /// Degrade when the full-window average exceeds target * this
    pub degrade_factor: f32,
    /// Recover when the full-window average drops below target * this
    pub recover_factor: f32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            target_frame_time_ms: 50.0,
            latency_window: 30,
            max_pool_size: 8,
            degrade_factor: 1.5,
            recover_factor: 0.7,
        }
    }
}

impl PerformanceConfig {
    pub fn validate(&self) -> Result<(), GuideError> {
        if !(self.target_frame_time_ms > 0.0) {
            return Err(GuideError::invalid_config(
                "target_frame_time_ms must be positive",
            ));
        }
        if self.latency_window == 0 {
            return Err(GuideError::invalid_config("latency_window must be at least 1"));
        }
        if self.max_pool_size == 0 {
            return Err(GuideError::invalid_config("max_pool_size must be at least 1"));
        }
        if !(self.recover_factor > 0.0 && self.recover_factor < 1.0) {
            return Err(GuideError::invalid_config(
                "recover_factor must be between 0.0 and 1.0 (exclusive)",
            ));
        }
        if !(self.degrade_factor > 1.0) {
            return Err(GuideError::invalid_config("degrade_factor must exceed 1.0"));
        }
        Ok(())
    }
}

/// Snapshot of the current processing budget. Replaced as a whole, never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub frequency_multiplier: f32,
    pub resolution_scale: f32,
    pub roi_scale: f32,
    pub max_concurrent_ops: u32,
    pub caching_enabled: bool,
    pub thermal_state: ThermalState,
    pub battery_level: f32,
    pub charging: bool,
    pub performance_tier: DevicePerformanceTier,
    pub degradation_level: u32,
    pub average_frame_time_ms: f64,
}

impl ResourceState {
    /// True when the budget fields (not the latency reading) match
    fn same_budget(&self, other: &ResourceState) -> bool {
        self.frequency_multiplier == other.frequency_multiplier
            && self.resolution_scale == other.resolution_scale
            && self.roi_scale == other.roi_scale
            && self.max_concurrent_ops == other.max_concurrent_ops
            && self.caching_enabled == other.caching_enabled
            && self.thermal_state == other.thermal_state
            && self.degradation_level == other.degradation_level
    }

    /// Process one frame out of every `frame_interval()`
    pub fn frame_interval(&self) -> u64 {
        (1.0 / self.frequency_multiplier).round().max(1.0) as u64
    }
}

/// Observer of governor changes. Callbacks run on the thread that reported
/// the signal and must not block.
pub trait GovernorListener: Send + Sync {
    fn on_thermal_state_changed(&self, _state: ThermalState) {}
    fn on_resource_state_changed(&self, _state: &ResourceState) {}
}

#[derive(Debug)]
struct Signals {
    thermal_state: ThermalState,
    battery_level: f32,
    charging: bool,
    tier: DevicePerformanceTier,
    degradation_level: u32,
    latency: RollingAverage,
}

impl Signals {
    fn resolve(&self) -> ResourceState {
        let combined = self
            .thermal_state
            .adjustment()
            .most_conservative(battery_adjustment(self.battery_level, self.charging))
            .most_conservative(self.tier.adjustment())
            .most_conservative(Adjustment::degraded(self.degradation_level));

        ResourceState {
            frequency_multiplier: combined.frequency_multiplier,
            resolution_scale: combined.resolution_scale,
            roi_scale: combined.roi_scale,
            max_concurrent_ops: combined.max_concurrent_ops,
            caching_enabled: combined.caching_enabled,
            thermal_state: self.thermal_state,
            battery_level: self.battery_level,
            charging: self.charging,
            performance_tier: self.tier,
            degradation_level: self.degradation_level,
            average_frame_time_ms: self.latency.average(),
        }
    }
}

pub struct ResourceGovernor {
    config: RwLock<Arc<PerformanceConfig>>,
    signals: Mutex<Signals>,
    state: RwLock<Arc<ResourceState>>,
    state_tx: watch::Sender<ResourceState>,
    listeners: Mutex<Vec<Arc<dyn GovernorListener>>>,
    pool: Arc<FrameBufferPool>,
}

impl ResourceGovernor {
    pub fn new(config: PerformanceConfig, profile: DeviceProfile) -> Result<Self, GuideError> {
        config.validate()?;

        let signals = Signals {
            thermal_state: ThermalState::None,
            battery_level: 1.0,
            charging: false,
            tier: DevicePerformanceTier::classify(&profile),
            degradation_level: 0,
            latency: RollingAverage::new(config.latency_window),
        };
        let initial = signals.resolve();
        let (state_tx, _) = watch::channel(initial.clone());

        log::info!(
            "Resource governor ready: tier={:?}, target={}ms, pool={}",
            signals.tier,
            config.target_frame_time_ms,
            config.max_pool_size
        );

        Ok(Self {
            pool: Arc::new(FrameBufferPool::new(config.max_pool_size)),
            config: RwLock::new(Arc::new(config)),
            signals: Mutex::new(signals),
            state: RwLock::new(Arc::new(initial)),
            state_tx,
            listeners: Mutex::new(Vec::new()),
        })
    }

    fn signals(&self) -> MutexGuard<'_, Signals> {
        self.signals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<Arc<dyn GovernorListener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consistent snapshot of the current budget
    pub fn state(&self) -> Arc<ResourceState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn config(&self) -> Arc<PerformanceConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap the performance config. The pool takes the new capacity and the
    /// latency window restarts at the new length.
    pub fn update_config(&self, config: PerformanceConfig) -> Result<(), GuideError> {
        config.validate()?;
        {
            let mut signals = self.signals();
            signals.latency = RollingAverage::new(config.latency_window);
        }
        self.pool.set_max_pool_size(config.max_pool_size);
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        log::info!("Performance config updated");
        self.publish(false);
        Ok(())
    }

    pub fn pool(&self) -> Arc<FrameBufferPool> {
        self.pool.clone()
    }

    /// Receive every budget change as a value
    pub fn subscribe(&self) -> watch::Receiver<ResourceState> {
        self.state_tx.subscribe()
    }

    pub fn set_thermal_state(&self, thermal_state: ThermalState) {
        let changed = {
            let mut signals = self.signals();
            let changed = signals.thermal_state != thermal_state;
            signals.thermal_state = thermal_state;
            changed
        };
        if changed {
            log::info!("Thermal state changed to {}", thermal_state);
            let listeners = self.listeners().clone();
            for listener in listeners {
                listener.on_thermal_state_changed(thermal_state);
            }
            self.publish(false);
        }
    }

    /// `level` is a fraction in [0, 1]; values outside are clamped.
    pub fn set_battery_level(&self, level: f32, charging: bool) {
        {
            let mut signals = self.signals();
            signals.battery_level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
            signals.charging = charging;
        }
        log::debug!("Battery level {:.2} (charging: {})", level, charging);
        self.publish(false);
    }

    pub fn set_device_profile(&self, profile: DeviceProfile) {
        self.signals().tier = DevicePerformanceTier::classify(&profile);
        self.publish(false);
    }

    /// Feed one frame's processing latency into the rolling window.
    ///
    /// A full window averaging above `target * degrade_factor` raises the
    /// degradation level; one below `target * recover_factor` lowers it.
    /// The window restarts after each step so every step needs fresh,
    /// sustained evidence.
    pub fn record_frame_processing_time(&self, ms: f64) {
        let config = self.config();
        let target = config.target_frame_time_ms as f64;
        let level_changed = {
            let mut signals = self.signals();
            signals.latency.push(ms.max(0.0));

            if !signals.latency.is_full() {
                false
            } else {
                let average = signals.latency.average();
                let before = signals.degradation_level;
                if average > target * config.degrade_factor as f64
                    && before < MAX_DEGRADATION_LEVEL
                {
                    signals.degradation_level += 1;
                } else if average < target * config.recover_factor as f64 && before > 0 {
                    signals.degradation_level -= 1;
                }

                if signals.degradation_level != before {
                    log::info!(
                        "Sustained frame time {:.1}ms vs target {:.1}ms: degradation level {} -> {}",
                        average,
                        target,
                        before,
                        signals.degradation_level
                    );
                    signals.latency.clear();
                    true
                } else {
                    false
                }
            }
        };
        self.publish(!level_changed);
    }

    pub fn average_frame_time_ms(&self) -> f64 {
        self.signals().latency.average()
    }

    /// `base` scaled by the current frequency multiplier, kept in (0, base]
    pub fn calculate_adjusted_frequency(&self, base: u32) -> u32 {
        if base == 0 {
            return 0;
        }
        let multiplier = self.state().frequency_multiplier;
        ((base as f32 * multiplier).round() as u32).clamp(1, base)
    }

    /// Frame-skipping throttle driven by the frequency multiplier
    pub fn should_process_frame(&self, frame_index: u64) -> bool {
        frame_index % self.state().frame_interval() == 0
    }

    pub fn add_listener(&self, listener: Arc<dyn GovernorListener>) {
        self.listeners().push(listener);
    }

    /// Remove a listener previously added, matched by identity
    pub fn remove_listener(&self, listener: &Arc<dyn GovernorListener>) {
        let target = Arc::as_ptr(listener) as *const ();
        self.listeners()
            .retain(|existing| Arc::as_ptr(existing) as *const () != target);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    /// Release pooled buffers, drop listeners, forget latency history.
    /// Idempotent.
    pub fn cleanup(&self) {
        self.pool.cleanup();
        self.listeners().clear();
        self.signals().latency.clear();
        log::debug!("Resource governor cleaned up");
    }

    /// Recompute and swap the snapshot. `quiet` suppresses listener
    /// callbacks when only the latency reading moved.
    fn publish(&self, quiet: bool) {
        // Resolve and swap under the signals lock so snapshots land in order
        let (next, budget_changed) = {
            let signals = self.signals();
            let next = signals.resolve();
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let changed = !state.same_budget(&next);
            *state = Arc::new(next.clone());
            (next, changed)
        };

        if budget_changed {
            log::debug!(
                "Resource state: freq={:.2} res={:.2} roi={:.2} ops={} caching={}",
                next.frequency_multiplier,
                next.resolution_scale,
                next.roi_scale,
                next.max_concurrent_ops,
                next.caching_enabled
            );
        }
        if budget_changed || !quiet {
            self.state_tx.send_replace(next.clone());
        }
        if budget_changed {
            let listeners = self.listeners().clone();
            for listener in listeners {
                listener.on_resource_state_changed(&next);
            }
        }
    }
}

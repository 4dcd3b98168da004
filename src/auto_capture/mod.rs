/// Auto-capture countdown module
///
/// Watches the stream of validation verdicts and, once the frame is ready,
/// counts down on a tokio timer to an automatic capture. Any not-ready
/// verdict during the countdown cancels it.
use crate::errors::GuideError;
use crate::validation::ValidationResult;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoCaptureConfig {
    pub enabled: bool,
    /// First value announced when the countdown starts
    pub countdown_start: u32,
    /// Time from the first tick to the capture trigger
    pub countdown_duration_ms: u64,
}

impl Default for AutoCaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            countdown_start: 3,
            countdown_duration_ms: 3000,
        }
    }
}

impl AutoCaptureConfig {
    pub fn validate(&self) -> Result<(), GuideError> {
        if self.countdown_start == 0 {
            return Err(GuideError::invalid_config(
                "countdown_start must be at least 1",
            ));
        }
        if self.countdown_duration_ms < self.countdown_start as u64 {
            return Err(GuideError::invalid_config(format!(
                "countdown_duration_ms ({}) must allow at least 1 ms per tick",
                self.countdown_duration_ms
            )));
        }
        Ok(())
    }

    /// Interval between successive ticks
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.countdown_duration_ms / self.countdown_start.max(1) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoCaptureState {
    Idle,
    /// Ticks left before the trigger
    Counting(u32),
}

/// How the most recent countdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountdownOutcome {
    Triggered,
    Cancelled,
}

/// Receives countdown events. Called from the runtime's worker tasks or
/// from the thread that submitted the verdict; must not block.
pub trait AutoCaptureListener: Send + Sync {
    fn on_countdown_tick(&self, _remaining: u32) {}
    fn on_capture_triggered(&self) {}
    fn on_countdown_cancelled(&self) {}
}

/// Listener that ignores every event
pub struct NoopListener;

impl AutoCaptureListener for NoopListener {}

struct Countdown {
    state: AutoCaptureState,
    /// Bumped whenever a countdown starts or stops; tick tasks from an older
    /// generation exit without side effects.
    generation: u64,
    task: Option<JoinHandle<()>>,
    last_outcome: Option<CountdownOutcome>,
}

struct Shared {
    countdown: Mutex<Countdown>,
    enabled: AtomicBool,
    config: RwLock<Arc<AutoCaptureConfig>>,
    listener: Arc<dyn AutoCaptureListener>,
    triggers: AtomicU64,
}

enum Step {
    Tick(u32),
    Trigger,
}

impl Shared {
    fn countdown(&self) -> MutexGuard<'_, Countdown> {
        self.countdown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn notify_cancelled(&self) {
        log::info!("Auto-capture countdown cancelled");
        self.listener.on_countdown_cancelled();
    }

    /// Notify a trigger already counted under the countdown lock
    fn fire_trigger(&self) {
        log::info!("Auto-capture triggered");
        self.listener.on_capture_triggered();
    }
}

/// Stop the active countdown, if any. Returns whether one was running.
fn stop_locked(countdown: &mut Countdown, outcome: CountdownOutcome) -> bool {
    let was_counting = matches!(countdown.state, AutoCaptureState::Counting(_));
    countdown.generation += 1;
    if let Some(task) = countdown.task.take() {
        task.abort();
    }
    countdown.state = AutoCaptureState::Idle;
    if was_counting || outcome == CountdownOutcome::Triggered {
        countdown.last_outcome = Some(outcome);
    }
    was_counting
}

async fn run_countdown(shared: Arc<Shared>, generation: u64, period: Duration) {
    loop {
        tokio::time::sleep(period).await;

        // Decide under the lock so a cancel that lands first always wins
        let step = {
            let mut countdown = shared.countdown();
            // Disabling stops the countdown under this lock, so a disabled
            // controller never reaches the trigger
            if countdown.generation != generation || !shared.is_enabled() {
                return;
            }
            match countdown.state {
                AutoCaptureState::Counting(n) if n > 1 => {
                    countdown.state = AutoCaptureState::Counting(n - 1);
                    Step::Tick(n - 1)
                }
                AutoCaptureState::Counting(_) => {
                    countdown.state = AutoCaptureState::Idle;
                    countdown.task = None;
                    countdown.last_outcome = Some(CountdownOutcome::Triggered);
                    shared.triggers.fetch_add(1, Ordering::SeqCst);
                    Step::Trigger
                }
                AutoCaptureState::Idle => return,
            }
        };

        match step {
            Step::Tick(n) => {
                log::debug!("Auto-capture countdown: {}", n);
                shared.listener.on_countdown_tick(n);
            }
            Step::Trigger => {
                shared.fire_trigger();
                return;
            }
        }
    }
}

pub struct AutoCaptureController {
    shared: Arc<Shared>,
    handle: Handle,
}

impl AutoCaptureController {
    /// Build a controller on the current tokio runtime
    pub fn new(
        config: AutoCaptureConfig,
        listener: Arc<dyn AutoCaptureListener>,
    ) -> Result<Self, GuideError> {
        let handle = Handle::try_current()
            .map_err(|e| GuideError::Runtime(format!("auto-capture needs a tokio runtime: {}", e)))?;
        Self::with_handle(config, listener, handle)
    }

    pub fn with_handle(
        config: AutoCaptureConfig,
        listener: Arc<dyn AutoCaptureListener>,
        handle: Handle,
    ) -> Result<Self, GuideError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                countdown: Mutex::new(Countdown {
                    state: AutoCaptureState::Idle,
                    generation: 0,
                    task: None,
                    last_outcome: None,
                }),
                enabled: AtomicBool::new(config.enabled),
                config: RwLock::new(Arc::new(config)),
                listener,
                triggers: AtomicU64::new(0),
            }),
            handle,
        })
    }

    pub fn config(&self) -> Arc<AutoCaptureConfig> {
        self.shared
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap the config. A countdown already running keeps its tick period.
    pub fn update_config(&self, config: AutoCaptureConfig) -> Result<(), GuideError> {
        config.validate()?;
        let enabled = config.enabled;
        *self
            .shared
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        self.set_enabled(enabled);
        Ok(())
    }

    pub fn state(&self) -> AutoCaptureState {
        self.shared.countdown().state
    }

    pub fn is_counting(&self) -> bool {
        matches!(self.state(), AutoCaptureState::Counting(_))
    }

    pub fn last_outcome(&self) -> Option<CountdownOutcome> {
        self.shared.countdown().last_outcome
    }

    /// Triggers fired since construction
    pub fn trigger_count(&self) -> u64 {
        self.shared.triggers.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.is_enabled()
    }

    /// Disabling cancels a running countdown. The flag flips under the
    /// countdown lock so no countdown can start after a disable returns.
    pub fn set_enabled(&self, enabled: bool) {
        let (was, cancelled) = {
            let mut countdown = self.shared.countdown();
            let was = self.shared.enabled.swap(enabled, Ordering::SeqCst);
            let cancelled = !enabled && stop_locked(&mut countdown, CountdownOutcome::Cancelled);
            (was, cancelled)
        };
        if was != enabled {
            log::info!("Auto-capture {}", if enabled { "enabled" } else { "disabled" });
        }
        if cancelled {
            self.shared.notify_cancelled();
        }
    }

    /// Feed one verdict. Ready verdicts start a countdown unless one is
    /// already running; any other verdict cancels it.
    pub fn process_validation_result(&self, result: &ValidationResult) {
        if !self.is_enabled() {
            return;
        }

        if result.can_capture {
            let start = {
                let mut countdown = self.shared.countdown();
                if !self.shared.is_enabled()
                    || matches!(countdown.state, AutoCaptureState::Counting(_))
                {
                    return;
                }
                let config = self.config();
                countdown.generation += 1;
                countdown.state = AutoCaptureState::Counting(config.countdown_start);
                countdown.task = Some(self.handle.spawn(run_countdown(
                    self.shared.clone(),
                    countdown.generation,
                    config.tick_period(),
                )));
                config.countdown_start
            };
            log::info!("Auto-capture countdown started at {}", start);
            self.shared.listener.on_countdown_tick(start);
        } else if self.is_counting() {
            log::debug!(
                "Countdown interrupted: {}",
                result.guide_state.as_str()
            );
            self.cancel();
        }
    }

    /// Stop a running countdown without capturing. Returns whether one was
    /// running.
    pub fn cancel(&self) -> bool {
        let cancelled = stop_locked(&mut self.shared.countdown(), CountdownOutcome::Cancelled);
        if cancelled {
            self.shared.notify_cancelled();
        }
        cancelled
    }

    /// Capture now, whatever the current state
    pub fn force_capture(&self) {
        {
            let mut countdown = self.shared.countdown();
            stop_locked(&mut countdown, CountdownOutcome::Triggered);
            self.shared.triggers.fetch_add(1, Ordering::SeqCst);
        }
        self.shared.fire_trigger();
    }
}

impl Drop for AutoCaptureController {
    fn drop(&mut self) {
        let mut countdown = self.shared.countdown();
        countdown.generation += 1;
        if let Some(task) = countdown.task.take() {
            task.abort();
        }
    }
}

//! dermacapture: real-time capture guidance for skin-lesion photography
//!
//! This crate runs the per-frame control loop that tells a user when a
//! close-up photo of a mole is ready to take, and takes it automatically.
//!
//! # Features
//! - Lesion region detection (Otsu threshold with a watershed fallback)
//! - Sharpness and exposure scoring with specular-highlight tolerance
//! - Prioritised readiness verdicts for overlay and accessibility layers
//! - Cancellable auto-capture countdown on tokio timers
//! - Adaptive region of interest driven by latency and detection history
//! - Thermal, battery and latency aware resource governor with a buffer pool
//!
//! # Usage
//! ```rust,ignore
//! use dermacapture::{GuideArea, GuideConfig, GuidancePipeline, ResourceGovernor};
//! use dermacapture::auto_capture::NoopListener;
//! use dermacapture::governor::{DeviceProfile, PerformanceConfig};
//! use std::sync::Arc;
//!
//! let governor = Arc::new(ResourceGovernor::new(PerformanceConfig::default(), DeviceProfile::default())?);
//! let pipeline = GuidancePipeline::new(GuideConfig::default(), governor, Arc::new(NoopListener))?;
//! let guide = GuideArea::centered(frame.size(), 0.4);
//! if let Some(verdict) = pipeline.on_frame(&frame, &guide).validation() {
//!     println!("{}", verdict.message);
//! }
//! ```
pub mod auto_capture;
pub mod config;
pub mod detection;
pub mod errors;
pub mod governor;
pub mod pipeline;
pub mod quality;
pub mod roi;
pub mod timing;
pub mod types;
pub mod validation;

// Testing utilities - synthetic frames for offline testing
pub mod testing;

// Re-exports for convenience
pub use auto_capture::{AutoCaptureController, AutoCaptureListener, AutoCaptureState};
pub use config::GuideConfig;
pub use detection::{Detection, DetectionMethod, RegionDetector};
pub use errors::GuideError;
pub use governor::{FrameBufferPool, ResourceGovernor, ResourceState, ThermalState};
pub use pipeline::{FrameOutcome, FrameReport, GuidancePipeline};
pub use quality::{QualityAnalyzer, QualityMetrics};
pub use roi::{RoiOptimizer, RoiResult};
pub use types::{Frame, FrameSize, FrameView, GuideArea, Point, Rect};
pub use validation::{CaptureValidator, FailureReason, GuideState, ValidationResult};

/// Initialize logging for the guidance pipeline
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "dermacapture=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

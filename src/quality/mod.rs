/// Frame quality analysis module
///
/// Scores sharpness, brightness and contrast for a frame or ROI window and
/// derives the blur / exposure flags the capture validator acts on.
pub mod analyzer;
pub mod blur;
pub mod exposure;

pub use analyzer::{QualityAnalyzer, QualityConfig, QualityIssue, QualityMetrics};
pub use blur::{laplacian_variance, BlurLevel};
pub use exposure::ExposureStats;

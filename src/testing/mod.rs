//! Testing utilities for the guidance pipeline
//!
//! Deterministic synthetic skin frames with a single dark lesion, so the
//! detector, analyzer and pipeline can be exercised without a camera.

pub mod synthetic_data;

pub use synthetic_data::{synthetic_lesion_frame, uniform_frame, SyntheticLesion};

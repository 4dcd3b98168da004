//! Thermal, battery and device-tier adjustment tables
//!
//! Each signal maps to an [`Adjustment`]. Every table is non-increasing as
//! the signal worsens, and [`Adjustment::most_conservative`] combines them
//! field by field with `min`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform-reported heat stress, ordered from calm to emergency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThermalState {
    None,
    Light,
    Moderate,
    Severe,
    Critical,
    Emergency,
}

impl ThermalState {
    pub const ALL: [ThermalState; 6] = [
        ThermalState::None,
        ThermalState::Light,
        ThermalState::Moderate,
        ThermalState::Severe,
        ThermalState::Critical,
        ThermalState::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThermalState::None => "none",
            ThermalState::Light => "light",
            ThermalState::Moderate => "moderate",
            ThermalState::Severe => "severe",
            ThermalState::Critical => "critical",
            ThermalState::Emergency => "emergency",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(value))
    }

    pub fn adjustment(&self) -> Adjustment {
        match self {
            ThermalState::None => Adjustment::UNRESTRICTED,
            ThermalState::Light => Adjustment::new(0.9, 1.0, 0.9, 3, true),
            ThermalState::Moderate => Adjustment::new(0.75, 0.75, 0.8, 2, true),
            ThermalState::Severe => Adjustment::new(0.5, 0.5, 0.6, 1, false),
            ThermalState::Critical => Adjustment::new(0.33, 0.5, 0.5, 1, false),
            ThermalState::Emergency => Adjustment::new(0.2, 0.25, 0.4, 1, false),
        }
    }
}

impl fmt::Display for ThermalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse device capability class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DevicePerformanceTier {
    Low,
    Medium,
    High,
}

impl DevicePerformanceTier {
    pub fn classify(profile: &DeviceProfile) -> Self {
        if profile.cpu_cores >= 8 && profile.total_memory_mb >= 6144 {
            DevicePerformanceTier::High
        } else if profile.cpu_cores >= 4 && profile.total_memory_mb >= 3072 {
            DevicePerformanceTier::Medium
        } else {
            DevicePerformanceTier::Low
        }
    }

    pub fn adjustment(&self) -> Adjustment {
        match self {
            DevicePerformanceTier::High => Adjustment::UNRESTRICTED,
            DevicePerformanceTier::Medium => Adjustment::new(1.0, 1.0, 1.0, 2, true),
            DevicePerformanceTier::Low => Adjustment::new(0.75, 0.75, 0.8, 1, false),
        }
    }
}

/// Hardware facts supplied by the platform layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub cpu_cores: u32,
    pub total_memory_mb: u32,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            cpu_cores: 8,
            total_memory_mb: 8192,
        }
    }
}

/// Battery adjustment. Charging lifts the battery penalty entirely.
pub fn battery_adjustment(level: f32, charging: bool) -> Adjustment {
    if charging || level > 0.5 {
        Adjustment::UNRESTRICTED
    } else if level > 0.2 {
        Adjustment::new(0.8, 1.0, 0.9, 3, true)
    } else if level > 0.1 {
        Adjustment::new(0.6, 0.75, 0.7, 2, true)
    } else {
        Adjustment::new(0.4, 0.5, 0.5, 1, false)
    }
}

/// Multipliers and caps recommended by one signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    pub frequency_multiplier: f32,
    pub resolution_scale: f32,
    pub roi_scale: f32,
    pub max_concurrent_ops: u32,
    pub caching_enabled: bool,
}

impl Adjustment {
    pub const UNRESTRICTED: Adjustment = Adjustment {
        frequency_multiplier: 1.0,
        resolution_scale: 1.0,
        roi_scale: 1.0,
        max_concurrent_ops: 4,
        caching_enabled: true,
    };

    pub const fn new(
        frequency_multiplier: f32,
        resolution_scale: f32,
        roi_scale: f32,
        max_concurrent_ops: u32,
        caching_enabled: bool,
    ) -> Self {
        Self {
            frequency_multiplier,
            resolution_scale,
            roi_scale,
            max_concurrent_ops,
            caching_enabled,
        }
    }

    pub fn most_conservative(self, other: Adjustment) -> Adjustment {
        Adjustment {
            frequency_multiplier: self.frequency_multiplier.min(other.frequency_multiplier),
            resolution_scale: self.resolution_scale.min(other.resolution_scale),
            roi_scale: self.roi_scale.min(other.roi_scale),
            max_concurrent_ops: self.max_concurrent_ops.min(other.max_concurrent_ops).max(1),
            caching_enabled: self.caching_enabled && other.caching_enabled,
        }
    }

    /// Sustained-latency degradation; each level tightens further.
    pub fn degraded(level: u32) -> Adjustment {
        let level = level.min(3) as i32;
        Adjustment {
            frequency_multiplier: 1.0,
            resolution_scale: 0.85f32.powi(level),
            roi_scale: 0.8f32.powi(level),
            max_concurrent_ops: (4u32 >> level).max(1),
            caching_enabled: true,
        }
    }
}

//! Tolerances and policies of the verification engine.
//!
//! All structures deserialize with `#[serde(default)]`, so a JSON file only
//! needs to name the values it overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Numeric tolerances used by the feasibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Slack allowed when comparing a depot load to the vehicle capacity.
    pub capacity: f64,
    /// Slack between the quantity loaded for a segment and the quantity delivered in it.
    pub mass: f64,
    /// Slack between a station demand and the total delivered to it.
    pub demand: f64,
    /// Slack above a depot stock before over-withdrawal is reported.
    pub stock: f64,
    /// Slack between declared and recomputed real-valued metrics.
    pub metric: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Tolerances {
            capacity: 1e-6,
            mass: 1e-2,
            demand: 1e-2,
            stock: 1e-2,
            metric: 0.2,
        }
    }
}

/// How a validator finding is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// Policy knobs of the instance validator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Require ids of every entity type to be exactly `1..=n`.
    pub contiguous_ids: bool,
    /// Severity of changeover-cost triangle inequality violations.
    pub triangle_inequality: Severity,
    /// Severity of negative coordinates.
    pub negative_coordinates: Severity,
    /// Two nodes closer than this are reported as overlapping.
    pub overlap_distance: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        ValidationPolicy {
            contiguous_ids: false,
            triangle_inequality: Severity::Warning,
            negative_coordinates: Severity::Warning,
            overlap_distance: 0.1,
        }
    }
}

impl ValidationPolicy {
    /// The strict variant used to accept generated contest instances.
    pub fn strict() -> Self {
        ValidationPolicy {
            contiguous_ids: true,
            ..Default::default()
        }
    }
}

/// Configuration of a solution verification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub tolerances: Tolerances,
    /// Starting policy of instance validation (`check --config`).
    pub validation: ValidationPolicy,
    /// Walk vehicle routes on the rayon thread pool.
    pub parallel: bool,
}

impl VerifierConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Cannot open config {}: {}", path.as_ref().display(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("Invalid config {}: {}", path.as_ref().display(), e))
    }
}

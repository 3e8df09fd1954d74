//! Cross-validation of the metrics a solution declares about itself.

use crate::config::Tolerances;
use crate::error::{MetricName, Violation};
use crate::solution::SolutionMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metrics recomputed by the verifier from the routes themselves
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComputedMetrics {
    /// Number of routes in the solution
    pub used_vehicles: usize,
    pub total_changes: usize,
    pub total_switch_cost: f64,
    pub total_distance: f64,
}

impl ComputedMetrics {
    /// Objective minimised by the contest: distance plus changeover cost.
    pub fn objective(&self) -> f64 {
        self.total_distance + self.total_switch_cost
    }
}

impl fmt::Display for ComputedMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Used vehicles: {}", self.used_vehicles)?;
        writeln!(f, "  Product changes: {}", self.total_changes)?;
        writeln!(f, "  Switch cost: {:.2}", self.total_switch_cost)?;
        write!(f, "  Distance: {:.2}", self.total_distance)
    }
}

/// Compare declared metrics with recomputed ones.
///
/// Counts must match exactly, real values within `tolerances.metric`.
pub fn cross_validate(
    declared: &SolutionMetrics,
    computed: &ComputedMetrics,
    tolerances: &Tolerances,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    let counts = [
        (MetricName::UsedVehicles, declared.used_vehicles, computed.used_vehicles),
        (MetricName::TotalChanges, declared.total_changes, computed.total_changes),
    ];
    for (metric, declared, computed) in counts {
        if declared != computed {
            violations.push(Violation::CountMismatch {
                metric,
                declared,
                computed,
            });
        }
    }

    let values = [
        (
            MetricName::TotalSwitchCost,
            declared.total_switch_cost,
            computed.total_switch_cost,
        ),
        (
            MetricName::TotalDistance,
            declared.total_distance,
            computed.total_distance,
        ),
    ];
    for (metric, declared, computed) in values {
        // NaN never compares within tolerance
        if !((declared - computed).abs() <= tolerances.metric) {
            violations.push(Violation::ValueMismatch {
                metric,
                declared,
                computed,
            });
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(used: usize, changes: usize, cost: f64, distance: f64) -> SolutionMetrics {
        SolutionMetrics {
            used_vehicles: used,
            total_changes: changes,
            total_switch_cost: cost,
            total_distance: distance,
            engine: "test".to_string(),
            elapsed: 0.0,
        }
    }

    fn computed() -> ComputedMetrics {
        ComputedMetrics {
            used_vehicles: 2,
            total_changes: 3,
            total_switch_cost: 42.0,
            total_distance: 100.0,
        }
    }

    #[test]
    fn test_matching_metrics() {
        let violations = cross_validate(&declared(2, 3, 42.1, 99.85), &computed(), &Tolerances::default());
        assert!(violations.is_empty());
    }

    #[test]
    fn test_count_mismatch() {
        let violations = cross_validate(&declared(5, 3, 42.0, 100.0), &computed(), &Tolerances::default());
        assert_eq!(
            violations,
            vec![Violation::CountMismatch {
                metric: MetricName::UsedVehicles,
                declared: 5,
                computed: 2,
            }]
        );
        assert_eq!(
            violations[0].to_string(),
            "Metric used_vehicles mismatch: declared=5 computed=2"
        );
    }

    #[test]
    fn test_value_tolerance() {
        let tol = Tolerances::default();

        let violations = cross_validate(&declared(2, 3, 42.0, 100.25), &computed(), &tol);
        assert_eq!(violations.len(), 1);
        assert!(matches!(
            violations[0],
            Violation::ValueMismatch {
                metric: MetricName::TotalDistance,
                ..
            }
        ));

        let violations = cross_validate(&declared(2, 3, f64::NAN, 100.0), &computed(), &tol);
        assert_eq!(violations.len(), 1);

        let loose = Tolerances { metric: 1.0, ..tol };
        assert!(cross_validate(&declared(2, 3, 42.0, 100.25), &computed(), &loose).is_empty());
    }

    #[test]
    fn test_objective() {
        assert_eq!(computed().objective(), 142.0);
    }
}

//! 100-point quality score of a feasible solution.
//!
//! The score has three parts:
//! - resources (40): fleet size against a target and fill rate of the used trucks,
//! - routing (40): total cost against a round-trip baseline from the depot centroid,
//! - products (20): how much each truck sticks to a single product.

use crate::instance::{Instance, NodeKey};
use crate::solution::{ParsedSolution, RouteNode};
use crate::verifier::VerificationReport;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Fixed cost charged per used truck in the routing baseline
const BASELINE_VEHICLE_COST: f64 = 20.0;

/// Quality score and the figures it was derived from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub resources: f64,
    pub routing: f64,
    pub products: f64,
    pub total: f64,
    /// Vehicles whose route serves at least one station
    pub used_vehicles: usize,
    pub target_vehicles: usize,
    pub fill_rate: f64,
    pub baseline_cost: f64,
    pub actual_cost: f64,
    pub average_purity: f64,
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Score: {:.2}/100", self.total)?;
        writeln!(f, "  Resources: {:.2}/40", self.resources)?;
        writeln!(
            f,
            "    Trucks used: {} (target {}), fill rate {:.1}%",
            self.used_vehicles,
            self.target_vehicles,
            self.fill_rate * 100.0
        )?;
        writeln!(f, "  Routing: {:.2}/40", self.routing)?;
        writeln!(
            f,
            "    Cost {:.2} vs baseline {:.2}",
            self.actual_cost, self.baseline_cost
        )?;
        writeln!(f, "  Products: {:.2}/20", self.products)?;
        write!(f, "    Average purity: {:.1}%", self.average_purity * 100.0)
    }
}

/// Score a verified solution. Infeasible solutions and solutions that serve
/// no station score zero.
pub fn score(instance: &Instance, solution: &ParsedSolution, report: &VerificationReport) -> QualityScore {
    if !report.is_feasible() {
        return QualityScore::default();
    }

    // Delivered quantity per product, per used vehicle
    let mut deliveries: BTreeMap<usize, BTreeMap<usize, f64>> = BTreeMap::new();
    for route in solution.routes.iter().filter(|r| r.visits_station()) {
        let per_product = deliveries.entry(route.vehicle).or_default();
        for (node, step) in route.nodes.iter().zip(&route.products) {
            if let RouteNode::Station { quantity, .. } = *node {
                *per_product.entry(step.product).or_insert(0.0) += quantity;
            }
        }
    }
    let used: BTreeSet<usize> = deliveries.keys().copied().collect();
    if used.is_empty() {
        return QualityScore::default();
    }
    let num_used = used.len();

    let mut result = QualityScore {
        used_vehicles: num_used,
        actual_cost: report.computed.objective(),
        ..Default::default()
    };

    result.resources = resource_score(instance, &used, &mut result);
    result.routing = routing_score(instance, num_used, &mut result);

    let purities: Vec<f64> = deliveries
        .values()
        .map(|per_product| {
            let total: f64 = per_product.values().sum();
            let largest = per_product.values().copied().fold(0.0, f64::max);
            if total > 0.0 {
                largest / total
            } else {
                0.0
            }
        })
        .collect();
    result.average_purity = purities.iter().sum::<f64>() / purities.len() as f64;
    result.products = 20.0 * result.average_purity;

    result.total = result.resources + result.routing + result.products;
    log::debug!("Quality score {:.2} ({} used vehicle(s))", result.total, num_used);
    result
}

fn resource_score(instance: &Instance, used: &BTreeSet<usize>, result: &mut QualityScore) -> f64 {
    let num_used = used.len();
    let products = instance.num_products();

    let total_demand: f64 = (0..products).map(|p| instance.total_demand(p)).sum();
    let demanded_products = (0..products)
        .filter(|&p| instance.stations.iter().any(|s| s.demand(p) > 0.0))
        .count();
    let max_capacity = instance.vehicles.iter().map(|v| v.capacity).fold(0.0, f64::max);
    let deployed: f64 = instance
        .vehicles
        .iter()
        .filter(|v| used.contains(&v.id))
        .map(|v| v.capacity)
        .sum();

    let by_volume = if max_capacity > 0.0 {
        (total_demand / max_capacity).ceil() as usize
    } else {
        num_used
    };
    let has_changeover_costs = instance.costs.iter().flatten().any(|&c| c > 0.0);
    let target = if has_changeover_costs {
        by_volume.max(demanded_products.min(instance.vehicles.len()))
    } else {
        by_volume
    };

    let fill_rate = if deployed > 0.0 { total_demand / deployed } else { 0.0 };
    result.target_vehicles = target;
    result.fill_rate = fill_rate;

    if num_used <= target {
        20.0 + 10.0 + 10.0 * fill_rate
    } else {
        20.0 * target as f64 / num_used as f64 + 20.0 * fill_rate
    }
}

fn routing_score(instance: &Instance, num_used: usize, result: &mut QualityScore) -> f64 {
    let mut baseline = 0.0;
    if !instance.depots.is_empty() {
        let n = instance.depots.len() as f64;
        let cx = instance.depots.iter().map(|d| d.x).sum::<f64>() / n;
        let cy = instance.depots.iter().map(|d| d.y).sum::<f64>() / n;
        baseline = instance
            .stations
            .iter()
            .filter_map(|s| instance.coordinates(NodeKey::Station(s.id)))
            .map(|(x, y)| 2.0 * ((x - cx).powi(2) + (y - cy).powi(2)).sqrt())
            .sum();
    }
    baseline += BASELINE_VEHICLE_COST * num_used as f64;
    result.baseline_cost = baseline;

    if baseline > 0.0 && result.actual_cost > 0.0 {
        40.0 * (baseline / result.actual_cost).min(1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifierConfig;
    use crate::fixtures::{valid_solution_distance, SAMPLE_INSTANCE, VALID_SOLUTION};
    use crate::verifier::verify;

    /// Verify after copying the recomputed metrics into the solution.
    fn verified(instance: &Instance, text: &str) -> (ParsedSolution, VerificationReport) {
        let config = VerifierConfig::default();
        let mut solution = ParsedSolution::parse(text, &instance.dims).unwrap();
        let first = verify(instance, &solution, &config);
        solution.metrics.used_vehicles = first.computed.used_vehicles;
        solution.metrics.total_changes = first.computed.total_changes;
        solution.metrics.total_switch_cost = first.computed.total_switch_cost;
        solution.metrics.total_distance = first.computed.total_distance;
        let report = verify(instance, &solution, &config);
        (solution, report)
    }

    #[test]
    fn test_score_valid_solution() {
        let instance: Instance = SAMPLE_INSTANCE.parse().unwrap();
        let (solution, report) = verified(&instance, VALID_SOLUTION);
        assert!(report.is_feasible(), "{}", report);

        let s = score(&instance, &solution, &report);
        assert_eq!(s.used_vehicles, 1);
        assert_eq!(s.target_vehicles, 2);
        assert!((s.fill_rate - 2300.0 / 5000.0).abs() < 1e-9);
        assert!((s.resources - 34.6).abs() < 1e-9);

        let baseline = 100.0 * 2f64.sqrt() + 20.0;
        let actual = valid_solution_distance() + 10.0;
        assert!((s.baseline_cost - baseline).abs() < 1e-9);
        assert!((s.routing - 40.0 * baseline / actual).abs() < 1e-9);

        assert!((s.products - 20.0 * 1300.0 / 2300.0).abs() < 1e-9);
        assert!((s.total - (s.resources + s.routing + s.products)).abs() < 1e-12);
        assert!(s.to_string().starts_with("Score: "));
    }

    #[test]
    fn test_more_trucks_than_target() {
        let instance: Instance = SAMPLE_INSTANCE
            .replace("0.0 10.0", "0.0 0.0")
            .replace("12.0 0.0", "0.0 0.0")
            .parse()
            .unwrap();
        let text = "\
1: 1 - 1 [1000] - 1 (1000) - 1 [500] - 1 (500) - 1
1: 0(0) - 0(0) - 0(0) - 1(0) - 1(0) - 1(0)
2: 2 - 1 [800] - 2 (800) - 2
2: 1(0) - 1(0) - 1(0) - 1(0)

0
0
0
0
engine
0
";
        let (solution, report) = verified(&instance, text);
        assert!(report.is_feasible(), "{}", report);

        let s = score(&instance, &solution, &report);
        assert_eq!(s.used_vehicles, 2);
        assert_eq!(s.target_vehicles, 1);
        assert!((s.resources - (10.0 + 20.0 * 2300.0 / 6000.0)).abs() < 1e-9);
        assert!((s.average_purity - (1000.0 / 1500.0 + 1.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_infeasible_scores_zero() {
        let instance: Instance = SAMPLE_INSTANCE.parse().unwrap();
        let solution = ParsedSolution::parse(VALID_SOLUTION, &instance.dims).unwrap();
        let mut report = verify(&instance, &solution, &VerifierConfig::default());
        report.errors.push(crate::error::Violation::EmptyRoute { vehicle: 2 });

        assert_eq!(score(&instance, &solution, &report), QualityScore::default());
    }
}

//! Structural and feasibility checks on a loaded instance.
//!
//! Every check runs independently and records its findings; nothing
//! short-circuits. An instance is accepted iff the report holds no error.
//! Product numbers in these findings are 1-based, as in the instance file.

use crate::config::{Severity, ValidationPolicy};
use crate::instance::{Instance, NodeKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Entity families of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entity {
    Product,
    Depot,
    Garage,
    Station,
    Vehicle,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Product => "products",
            Entity::Depot => "depots",
            Entity::Garage => "garages",
            Entity::Station => "stations",
            Entity::Vehicle => "vehicles",
        };
        f.write_str(name)
    }
}

/// A finding of the instance validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralIssue {
    NoEntities { entity: Entity },
    CountMismatch { entity: Entity, declared: usize, found: usize },
    DuplicateIds { entity: Entity, ids: Vec<usize> },
    MissingIds { entity: Entity, ids: Vec<usize> },
    OutOfRangeIds { entity: Entity, ids: Vec<usize>, max: usize },
    UnknownGarage { vehicle: usize, garage: usize },
    InvalidInitialProduct { vehicle: usize, product: usize, products: usize },
    ProductValueCount { node: NodeKey, expected: usize, found: usize },
    CostMatrixShape { rows: usize, columns: Vec<usize>, expected: usize },
    NonZeroDiagonal { product: usize, cost: f64 },
    NegativeStock { depot: usize, product: usize, stock: f64 },
    NegativeDemand { station: usize, product: usize, demand: f64 },
    NonPositiveCapacity { vehicle: usize, capacity: f64 },
    NonFiniteQuantity { node: NodeKey, product: usize, value: f64 },
    NonFiniteCoordinates { node: NodeKey },
    DemandExceedsFleet { station: usize, product: usize, demand: f64, fleet_capacity: f64 },
    InsufficientStock { product: usize, stock: f64, demand: f64 },
    Overlap { first: NodeKey, second: NodeKey, distance: f64 },
    TriangleInequality { from: usize, to: usize, via: usize, direct: f64, indirect: f64 },
    NegativeCoordinates { node: NodeKey },
    NoDemand,
}

impl fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralIssue::NoEntities { entity } => write!(f, "At least one of {} required", entity),
            StructuralIssue::CountMismatch { entity, declared, found } => {
                write!(f, "Header declares {} {}, found {}", declared, entity, found)
            }
            StructuralIssue::DuplicateIds { entity, ids } => write!(f, "Duplicate ids for {}: {:?}", entity, ids),
            StructuralIssue::MissingIds { entity, ids } => write!(f, "Missing ids for {}: {:?}", entity, ids),
            StructuralIssue::OutOfRangeIds { entity, ids, max } => {
                write!(f, "Out-of-range ids for {}: {:?} (expected 1-{})", entity, ids, max)
            }
            StructuralIssue::UnknownGarage { vehicle, garage } => {
                write!(f, "Garage {} used by vehicle {} does not exist", garage, vehicle)
            }
            StructuralIssue::InvalidInitialProduct { vehicle, product, products } => write!(
                f,
                "Initial product {} of vehicle {} is outside 1-{}",
                product, vehicle, products
            ),
            StructuralIssue::ProductValueCount { node, expected, found } => {
                write!(f, "{} carries {} product values, expected {}", node, found, expected)
            }
            StructuralIssue::CostMatrixShape { rows, columns, expected } => write!(
                f,
                "Changeover matrix has {} rows with lengths {:?}, expected {}x{}",
                rows, columns, expected, expected
            ),
            StructuralIssue::NonZeroDiagonal { product, cost } => {
                write!(f, "Changeover matrix diagonal is not zero for product {} ({})", product, cost)
            }
            StructuralIssue::NegativeStock { depot, product, stock } => {
                write!(f, "Negative stock at D{} for product {} ({})", depot, product, stock)
            }
            StructuralIssue::NegativeDemand { station, product, demand } => {
                write!(f, "Negative demand at S{} for product {} ({})", station, product, demand)
            }
            StructuralIssue::NonPositiveCapacity { vehicle, capacity } => {
                write!(f, "Vehicle {} has non-positive or infinite capacity ({})", vehicle, capacity)
            }
            StructuralIssue::NonFiniteQuantity { node, product, value } => {
                write!(f, "{} carries a non-finite quantity for product {} ({})", node, product, value)
            }
            StructuralIssue::NonFiniteCoordinates { node } => write!(f, "{} has NaN or infinite coordinates", node),
            StructuralIssue::DemandExceedsFleet { station, product, demand, fleet_capacity } => write!(
                f,
                "Station {}, product {}: demand {:.0} > fleet capacity {:.0}",
                station, product, demand, fleet_capacity
            ),
            StructuralIssue::InsufficientStock { product, stock, demand } => {
                write!(f, "Product {}: stock {:.0} < demand {:.0}", product, stock, demand)
            }
            StructuralIssue::Overlap { first, second, distance } => {
                write!(f, "{} and {} overlap (dist={:.3})", first, second, distance)
            }
            StructuralIssue::TriangleInequality { from, to, via, direct, indirect } => write!(
                f,
                "Triangle inequality violated: P{}->P{} direct={:.1} > via P{} ({:.1})",
                from, to, direct, via, indirect
            ),
            StructuralIssue::NegativeCoordinates { node } => write!(f, "{} has negative coordinates", node),
            StructuralIssue::NoDemand => write!(f, "No station has a positive demand"),
        }
    }
}

/// Outcome of validating an instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<StructuralIssue>,
    pub warnings: Vec<StructuralIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, severity: Severity, issue: StructuralIssue) {
        match severity {
            Severity::Error => self.errors.push(issue),
            Severity::Warning => self.warnings.push(issue),
        }
    }

    fn error(&mut self, issue: StructuralIssue) {
        self.errors.push(issue);
    }

    fn warning(&mut self, issue: StructuralIssue) {
        self.warnings.push(issue);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            writeln!(f, "No blocking error")?;
        } else {
            writeln!(f, "{} error(s):", self.errors.len())?;
            for e in &self.errors {
                writeln!(f, "  - {}", e)?;
            }
        }
        if !self.warnings.is_empty() {
            writeln!(f, "{} warning(s):", self.warnings.len())?;
            for w in &self.warnings {
                writeln!(f, "  - {}", w)?;
            }
        }
        write!(f, "Status: {}", if self.is_valid() { "VALID" } else { "INVALID" })
    }
}

/// Run every instance check under the given policy.
pub fn validate(instance: &Instance, policy: &ValidationPolicy) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_cardinality(instance, &mut report);
    check_ids(instance, policy, &mut report);
    check_references(instance, &mut report);
    check_cost_matrix(instance, &mut report);
    check_quantities(instance, &mut report);
    check_fleet_capacity(instance, &mut report);
    check_aggregate_feasibility(instance, &mut report);
    check_geometry(instance, policy, &mut report);
    check_triangle_inequality(instance, policy, &mut report);

    log::info!(
        "Instance validation: {} error(s), {} warning(s)",
        report.errors.len(),
        report.warnings.len()
    );
    report
}

fn check_cardinality(instance: &Instance, report: &mut ValidationReport) {
    let dims = &instance.dims;
    let families = [
        (Entity::Product, dims.products, instance.costs.len()),
        (Entity::Depot, dims.depots, instance.depots.len()),
        (Entity::Garage, dims.garages, instance.garages.len()),
        (Entity::Station, dims.stations, instance.stations.len()),
        (Entity::Vehicle, dims.vehicles, instance.vehicles.len()),
    ];

    for (entity, declared, found) in families {
        if declared < 1 {
            report.error(StructuralIssue::NoEntities { entity });
        }
        // The product count is checked against the matrix shape instead
        if entity != Entity::Product && declared != found {
            report.error(StructuralIssue::CountMismatch { entity, declared, found });
        }
    }
}

fn check_ids(instance: &Instance, policy: &ValidationPolicy, report: &mut ValidationReport) {
    let families: [(Entity, Vec<usize>); 4] = [
        (Entity::Vehicle, instance.vehicles.iter().map(|v| v.id).collect()),
        (Entity::Depot, instance.depots.iter().map(|d| d.id).collect()),
        (Entity::Garage, instance.garages.iter().map(|g| g.id).collect()),
        (Entity::Station, instance.stations.iter().map(|s| s.id).collect()),
    ];

    for (entity, ids) in families {
        let mut seen = BTreeSet::new();
        let duplicates: BTreeSet<usize> = ids.iter().copied().filter(|id| !seen.insert(*id)).collect();
        if !duplicates.is_empty() {
            report.error(StructuralIssue::DuplicateIds {
                entity,
                ids: duplicates.into_iter().collect(),
            });
            continue;
        }

        if policy.contiguous_ids {
            let n = ids.len();
            let missing: Vec<usize> = (1..=n).filter(|id| !seen.contains(id)).collect();
            let extra: Vec<usize> = seen.iter().copied().filter(|&id| id < 1 || id > n).collect();
            if !missing.is_empty() {
                report.error(StructuralIssue::MissingIds { entity, ids: missing });
            }
            if !extra.is_empty() {
                report.error(StructuralIssue::OutOfRangeIds { entity, ids: extra, max: n });
            }
        }
    }
}

fn check_references(instance: &Instance, report: &mut ValidationReport) {
    let p = instance.num_products();

    for v in &instance.vehicles {
        if instance.garage(v.garage).is_none() {
            report.error(StructuralIssue::UnknownGarage {
                vehicle: v.id,
                garage: v.garage,
            });
        }
        if v.initial_product < 1 || v.initial_product > p {
            report.error(StructuralIssue::InvalidInitialProduct {
                vehicle: v.id,
                product: v.initial_product,
                products: p,
            });
        }
    }

    for d in &instance.depots {
        if d.stocks.len() != p {
            report.error(StructuralIssue::ProductValueCount {
                node: NodeKey::Depot(d.id),
                expected: p,
                found: d.stocks.len(),
            });
        }
    }
    for s in &instance.stations {
        if s.demand.len() != p {
            report.error(StructuralIssue::ProductValueCount {
                node: NodeKey::Station(s.id),
                expected: p,
                found: s.demand.len(),
            });
        }
    }
}

fn check_cost_matrix(instance: &Instance, report: &mut ValidationReport) {
    let p = instance.num_products();
    let costs = &instance.costs;

    if costs.len() != p || costs.iter().any(|row| row.len() != p) {
        report.error(StructuralIssue::CostMatrixShape {
            rows: costs.len(),
            columns: costs.iter().map(|row| row.len()).collect(),
            expected: p,
        });
    }

    for (i, row) in costs.iter().enumerate() {
        if let Some(&cost) = row.get(i) {
            if cost != 0.0 {
                report.error(StructuralIssue::NonZeroDiagonal { product: i + 1, cost });
            }
        }
    }
}

fn check_quantities(instance: &Instance, report: &mut ValidationReport) {
    for d in &instance.depots {
        for (p, &stock) in d.stocks.iter().enumerate() {
            if !stock.is_finite() {
                report.error(StructuralIssue::NonFiniteQuantity {
                    node: NodeKey::Depot(d.id),
                    product: p + 1,
                    value: stock,
                });
            } else if stock < 0.0 {
                report.error(StructuralIssue::NegativeStock {
                    depot: d.id,
                    product: p + 1,
                    stock,
                });
            }
        }
    }

    for s in &instance.stations {
        for (p, &demand) in s.demand.iter().enumerate() {
            if !demand.is_finite() {
                report.error(StructuralIssue::NonFiniteQuantity {
                    node: NodeKey::Station(s.id),
                    product: p + 1,
                    value: demand,
                });
            } else if demand < 0.0 {
                report.error(StructuralIssue::NegativeDemand {
                    station: s.id,
                    product: p + 1,
                    demand,
                });
            }
        }
    }

    for v in &instance.vehicles {
        if !(v.capacity > 0.0 && v.capacity.is_finite()) {
            report.error(StructuralIssue::NonPositiveCapacity {
                vehicle: v.id,
                capacity: v.capacity,
            });
        }
    }

    if !instance.stations.iter().any(|s| s.demand.iter().any(|&q| q > 0.0)) {
        report.warning(StructuralIssue::NoDemand);
    }
}

/// Split delivery lets several trucks serve one station, so a single demand
/// only has to fit into the whole fleet.
fn check_fleet_capacity(instance: &Instance, report: &mut ValidationReport) {
    let fleet_capacity = instance.fleet_capacity();

    for s in &instance.stations {
        for (p, &demand) in s.demand.iter().enumerate() {
            if demand > fleet_capacity {
                report.error(StructuralIssue::DemandExceedsFleet {
                    station: s.id,
                    product: p + 1,
                    demand,
                    fleet_capacity,
                });
            }
        }
    }
}

fn check_aggregate_feasibility(instance: &Instance, report: &mut ValidationReport) {
    for p in 0..instance.num_products() {
        let stock = instance.total_stock(p);
        let demand = instance.total_demand(p);
        if !(stock >= demand) {
            report.error(StructuralIssue::InsufficientStock {
                product: p + 1,
                stock,
                demand,
            });
        }
    }
}

fn check_geometry(instance: &Instance, policy: &ValidationPolicy, report: &mut ValidationReport) {
    let points: Vec<(NodeKey, f64, f64)> = instance
        .depots
        .iter()
        .map(|d| (NodeKey::Depot(d.id), d.x, d.y))
        .chain(instance.garages.iter().map(|g| (NodeKey::Garage(g.id), g.x, g.y)))
        .chain(instance.stations.iter().map(|s| (NodeKey::Station(s.id), s.x, s.y)))
        .collect();

    for &(node, x, y) in &points {
        if !x.is_finite() || !y.is_finite() {
            report.error(StructuralIssue::NonFiniteCoordinates { node });
        } else if x < 0.0 || y < 0.0 {
            report.push(policy.negative_coordinates, StructuralIssue::NegativeCoordinates { node });
        }
    }

    for i in 0..points.len() {
        for j in i + 1..points.len() {
            let (a, ax, ay) = points[i];
            let (b, bx, by) = points[j];
            let distance = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
            if distance < policy.overlap_distance {
                report.warning(StructuralIssue::Overlap {
                    first: a,
                    second: b,
                    distance,
                });
            }
        }
    }
}

/// A solver may exploit intermediate changeovers when the matrix is not
/// metric; that is reported but does not make the instance invalid by default.
fn check_triangle_inequality(instance: &Instance, policy: &ValidationPolicy, report: &mut ValidationReport) {
    let p = instance.num_products();
    if p < 3 {
        return;
    }

    let mut violations = Vec::new();
    for i in 0..p {
        for k in 0..p {
            if i == k {
                continue;
            }
            let Some(direct) = instance.changeover_cost(i, k) else {
                continue;
            };
            for j in 0..p {
                if j == i || j == k {
                    continue;
                }
                let (Some(ij), Some(jk)) = (instance.changeover_cost(i, j), instance.changeover_cost(j, k)) else {
                    continue;
                };
                let indirect = ij + jk;
                if direct > indirect {
                    violations.push(StructuralIssue::TriangleInequality {
                        from: i + 1,
                        to: k + 1,
                        via: j + 1,
                        direct,
                        indirect,
                    });
                }
            }
        }
    }

    // Largest savings first
    violations.sort_by(|a, b| savings(b).total_cmp(&savings(a)));
    for issue in violations {
        report.push(policy.triangle_inequality, issue);
    }
}

fn savings(issue: &StructuralIssue) -> f64 {
    match issue {
        StructuralIssue::TriangleInequality { direct, indirect, .. } => direct - indirect,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::SAMPLE_INSTANCE;
    use crate::instance::Dimensions;

    fn sample() -> Instance {
        SAMPLE_INSTANCE.parse().unwrap()
    }

    #[test]
    fn test_sample_is_valid() {
        let report = validate(&sample(), &ValidationPolicy::strict());
        assert!(report.is_valid(), "{}", report);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_insufficient_stock() {
        let text = SAMPLE_INSTANCE.replace("1 50 50 3000 2000", "1 50 50 3000 1000");
        let instance: Instance = text.parse().unwrap();
        let report = validate(&instance, &ValidationPolicy::default());

        assert!(!report.is_valid());
        assert!(report.errors.contains(&StructuralIssue::InsufficientStock {
            product: 2,
            stock: 1000.0,
            demand: 1300.0,
        }));
    }

    #[test]
    fn test_demand_exceeds_fleet() {
        let text = SAMPLE_INSTANCE
            .replace("1 25 25 1000 500", "1 25 25 7000 500")
            .replace("1 50 50 3000 2000", "1 50 50 9000 2000");
        let instance: Instance = text.parse().unwrap();
        let report = validate(&instance, &ValidationPolicy::default());

        assert_eq!(
            report.errors,
            vec![StructuralIssue::DemandExceedsFleet {
                station: 1,
                product: 1,
                demand: 7000.0,
                fleet_capacity: 6000.0,
            }]
        );
    }

    #[test]
    fn test_diagonal_and_references() {
        let text = SAMPLE_INSTANCE
            .replace("0.0 10.0", "5.0 10.0")
            .replace("2 1000 2 2", "2 1000 7 3");
        let instance: Instance = text.parse().unwrap();
        let report = validate(&instance, &ValidationPolicy::default());

        assert!(report.errors.contains(&StructuralIssue::NonZeroDiagonal { product: 1, cost: 5.0 }));
        assert!(report.errors.contains(&StructuralIssue::UnknownGarage { vehicle: 2, garage: 7 }));
        assert!(report.errors.contains(&StructuralIssue::InvalidInitialProduct {
            vehicle: 2,
            product: 3,
            products: 2,
        }));
    }

    #[test]
    fn test_duplicate_and_contiguous_ids() {
        let dup = SAMPLE_INSTANCE.replace("2 75 25 0 800", "1 75 25 0 800");
        let report = validate(&dup.parse().unwrap(), &ValidationPolicy::default());
        assert!(report.errors.contains(&StructuralIssue::DuplicateIds {
            entity: Entity::Station,
            ids: vec![1],
        }));

        let gap = SAMPLE_INSTANCE.replace("2 75 25 0 800", "5 75 25 0 800");
        let instance: Instance = gap.parse().unwrap();
        assert!(validate(&instance, &ValidationPolicy::default()).is_valid());

        let strict = validate(&instance, &ValidationPolicy::strict());
        assert!(strict.errors.contains(&StructuralIssue::MissingIds {
            entity: Entity::Station,
            ids: vec![2],
        }));
        assert!(strict.errors.contains(&StructuralIssue::OutOfRangeIds {
            entity: Entity::Station,
            ids: vec![5],
            max: 2,
        }));
    }

    #[test]
    fn test_non_positive_capacity_and_negative_stock() {
        let text = SAMPLE_INSTANCE
            .replace("2 1000 2 2", "2 0 2 2")
            .replace("1 50 50 3000 2000", "1 50 50 3000 -1");
        let report = validate(&text.parse().unwrap(), &ValidationPolicy::default());

        assert!(report.errors.contains(&StructuralIssue::NonPositiveCapacity { vehicle: 2, capacity: 0.0 }));
        assert!(report.errors.contains(&StructuralIssue::NegativeStock {
            depot: 1,
            product: 2,
            stock: -1.0,
        }));
    }

    #[test]
    fn test_non_finite_quantities() {
        let mut instance = sample();
        instance.vehicles[0].capacity = f64::INFINITY;
        instance.stations[1].demand[1] = f64::NAN;
        let report = validate(&instance, &ValidationPolicy::default());

        assert!(!report.is_valid());
        assert!(report.errors.contains(&StructuralIssue::NonPositiveCapacity {
            vehicle: 1,
            capacity: f64::INFINITY,
        }));
        assert!(report.errors.iter().any(|e| matches!(
            e,
            StructuralIssue::NonFiniteQuantity { node: NodeKey::Station(2), product: 2, value } if value.is_nan()
        )));
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, StructuralIssue::InsufficientStock { product: 2, .. })));
    }

    #[test]
    fn test_hand_built_shape_errors() {
        let base = sample();
        let mut costs = base.costs.clone();
        costs[1].pop();
        let mut stations = base.stations.clone();
        stations[1].demand.push(5.0);
        let dims = Dimensions { garages: 3, ..base.dims };
        let instance = Instance::new(
            None,
            dims,
            costs,
            base.vehicles.clone(),
            base.depots.clone(),
            base.garages.clone(),
            stations,
        );

        let report = validate(&instance, &ValidationPolicy::default());
        assert_eq!(
            report.errors,
            vec![
                StructuralIssue::CountMismatch {
                    entity: Entity::Garage,
                    declared: 3,
                    found: 2,
                },
                StructuralIssue::ProductValueCount {
                    node: NodeKey::Station(2),
                    expected: 2,
                    found: 3,
                },
                StructuralIssue::CostMatrixShape {
                    rows: 2,
                    columns: vec![2, 1],
                    expected: 2,
                },
            ]
        );
    }

    #[test]
    fn test_negative_coordinates_policy() {
        let text = SAMPLE_INSTANCE.replace("2 100 100", "2 -100 100");
        let instance: Instance = text.parse().unwrap();

        let lenient = validate(&instance, &ValidationPolicy::default());
        assert!(lenient.is_valid());
        assert_eq!(
            lenient.warnings,
            vec![StructuralIssue::NegativeCoordinates { node: NodeKey::Garage(2) }]
        );

        let policy = ValidationPolicy {
            negative_coordinates: Severity::Error,
            ..Default::default()
        };
        assert!(!validate(&instance, &policy).is_valid());
    }

    #[test]
    fn test_overlap_warning() {
        let text = SAMPLE_INSTANCE.replace("2 75 25 0 800", "2 25.05 25 0 800");
        let report = validate(&text.parse().unwrap(), &ValidationPolicy::default());

        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        match &report.warnings[0] {
            StructuralIssue::Overlap { first, second, .. } => {
                assert_eq!(*first, NodeKey::Station(1));
                assert_eq!(*second, NodeKey::Station(2));
            }
            other => panic!("unexpected warning: {}", other),
        }
    }

    #[test]
    fn test_triangle_inequality() {
        let text = "\
3 1 1 1 1
0 100 10
10 0 10
10 10 0
1 1000 1 1
1 0 0 500 500 500
1 1 1
1 5 5 100 100 100
";
        let instance: Instance = text.parse().unwrap();

        let report = validate(&instance, &ValidationPolicy::default());
        assert!(report.is_valid());
        assert_eq!(
            report.warnings,
            vec![StructuralIssue::TriangleInequality {
                from: 1,
                to: 2,
                via: 3,
                direct: 100.0,
                indirect: 20.0,
            }]
        );

        let policy = ValidationPolicy {
            triangle_inequality: Severity::Error,
            ..Default::default()
        };
        assert_eq!(validate(&instance, &policy).errors.len(), 1);
    }
}

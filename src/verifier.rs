//! Feasibility verification of a parsed solution against an instance.
//!
//! Each route is walked on its own and yields a [`RouteOutcome`]: the
//! violations found on that route, its distance and changeover figures, and a
//! partial [`Ledger`] of quantities loaded per (depot, product) and delivered
//! per (station, product). Outcomes are reduced in route order before the
//! global demand and stock checks, so walking routes in parallel gives the
//! same report as walking them one after another.

use crate::config::{Tolerances, VerifierConfig};
use crate::error::{Error, Violation, ViolationKind};
use crate::instance::{Instance, NodeKey};
use crate::metrics::{cross_validate, ComputedMetrics};
use crate::solution::{ParsedSolution, RouteNode, SolutionMetrics, VehicleRoute};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Quantities moved by one or more routes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    /// Loaded per (depot id, product)
    pub loads: BTreeMap<(usize, usize), f64>,
    /// Delivered per (station id, product)
    pub deliveries: BTreeMap<(usize, usize), f64>,
}

impl Ledger {
    fn load(&mut self, depot: usize, product: usize, quantity: f64) {
        *self.loads.entry((depot, product)).or_insert(0.0) += quantity;
    }

    fn deliver(&mut self, station: usize, product: usize, quantity: f64) {
        *self.deliveries.entry((station, product)).or_insert(0.0) += quantity;
    }

    /// Fold another ledger into this one.
    pub fn merge(&mut self, other: Ledger) {
        for ((depot, product), quantity) in other.loads {
            self.load(depot, product, quantity);
        }
        for ((station, product), quantity) in other.deliveries {
            self.deliver(station, product, quantity);
        }
    }

    pub fn loaded(&self, depot: usize, product: usize) -> f64 {
        self.loads.get(&(depot, product)).copied().unwrap_or(0.0)
    }

    pub fn delivered(&self, station: usize, product: usize) -> f64 {
        self.deliveries.get(&(station, product)).copied().unwrap_or(0.0)
    }
}

/// Result of walking a single route
#[derive(Debug, Clone, Default)]
pub struct RouteOutcome {
    pub errors: Vec<Violation>,
    pub ledger: Ledger,
    pub distance: f64,
    pub changes: usize,
    pub switch_cost: f64,
}

/// Load carried between a depot visit and the next depot or garage
struct Segment {
    depot: usize,
    product: usize,
    loaded: f64,
    delivered: f64,
}

impl Segment {
    fn close(self, vehicle: usize, tolerances: &Tolerances, errors: &mut Vec<Violation>) {
        if !((self.delivered - self.loaded).abs() <= tolerances.mass) {
            errors.push(Violation::MassConservation {
                vehicle,
                depot: self.depot,
                product: self.product,
                loaded: self.loaded,
                delivered: self.delivered,
            });
        }
    }
}

/// Walk one route, checking its invariants and tallying its quantities.
pub fn walk_route(instance: &Instance, route: &VehicleRoute, tolerances: &Tolerances) -> RouteOutcome {
    let mut outcome = RouteOutcome::default();
    let vehicle_id = route.vehicle;

    let Some(vehicle) = instance.vehicle(vehicle_id) else {
        outcome.errors.push(Violation::UnknownVehicle { vehicle: vehicle_id });
        return outcome;
    };
    if route.is_empty() {
        outcome.errors.push(Violation::EmptyRoute { vehicle: vehicle_id });
        return outcome;
    }
    if route.nodes.len() != route.products.len() {
        outcome.errors.push(Violation::LengthMismatch {
            vehicle: vehicle_id,
            nodes: route.nodes.len(),
            products: route.products.len(),
        });
        return outcome;
    }

    let home = NodeKey::Garage(vehicle.garage);
    let last = route.nodes.len() - 1;
    let first_key = route.nodes[0].key();
    let last_key = route.nodes[last].key();
    if first_key != home || last_key != home {
        outcome.errors.push(Violation::GarageMismatch {
            vehicle: vehicle_id,
            expected: home,
            first: first_key,
            last: last_key,
        });
    }

    let products = instance.num_products();
    let mut segment: Option<Segment> = None;

    for (position, (node, step)) in route.nodes.iter().zip(&route.products).enumerate() {
        let product = step.product;
        if product >= products {
            outcome.errors.push(Violation::UnknownProduct {
                vehicle: vehicle_id,
                position,
                product,
            });
        }

        match *node {
            RouteNode::Garage(_) => {
                if position != 0 && position != last {
                    outcome.errors.push(Violation::GarageMidRoute {
                        vehicle: vehicle_id,
                        position,
                    });
                }
            }
            RouteNode::Depot { id, quantity } => {
                if instance.depot(id).is_none() {
                    outcome.errors.push(Violation::UnknownDepot { vehicle: vehicle_id, depot: id });
                }
                if !(quantity <= vehicle.capacity + tolerances.capacity) {
                    outcome.errors.push(Violation::CapacityExceeded {
                        vehicle: vehicle_id,
                        depot: id,
                        loaded: quantity,
                        capacity: vehicle.capacity,
                    });
                }
                if let Some(open) = segment.take() {
                    open.close(vehicle_id, tolerances, &mut outcome.errors);
                }
                segment = Some(Segment {
                    depot: id,
                    product,
                    loaded: quantity,
                    delivered: 0.0,
                });
                outcome.ledger.load(id, product, quantity);
            }
            RouteNode::Station { id, quantity } => {
                if instance.station(id).is_none() {
                    outcome.errors.push(Violation::UnknownStation {
                        vehicle: vehicle_id,
                        station: id,
                    });
                }
                match segment.as_mut() {
                    Some(open) => {
                        if open.product != product {
                            outcome.errors.push(Violation::ProductMidSegment {
                                vehicle: vehicle_id,
                                position,
                                expected: open.product,
                                found: product,
                            });
                        }
                        open.delivered += quantity;
                    }
                    None => outcome.errors.push(Violation::DeliveryWithoutLoad {
                        vehicle: vehicle_id,
                        station: id,
                        position,
                    }),
                }
                outcome.ledger.deliver(id, product, quantity);
            }
        }
    }
    if let Some(open) = segment.take() {
        open.close(vehicle_id, tolerances, &mut outcome.errors);
    }

    outcome.distance = route
        .nodes
        .windows(2)
        .map(|pair| instance.distance(pair[0].key(), pair[1].key()).unwrap_or(0.0))
        .sum();

    for pair in route.products.windows(2) {
        let (prev, cur) = (pair[0].product, pair[1].product);
        if prev != cur {
            outcome.changes += 1;
            outcome.switch_cost += instance.changeover_cost(prev, cur).unwrap_or(0.0);
        }
    }

    log::debug!(
        "Vehicle {}: {} node(s), distance {:.2}, {} change(s), {} error(s)",
        vehicle_id,
        route.len(),
        outcome.distance,
        outcome.changes,
        outcome.errors.len()
    );
    outcome
}

/// Verdict of a verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Every violation, route errors first in route order, then global ones
    pub errors: Vec<Violation>,
    /// Recomputed metrics, the source of truth
    pub computed: ComputedMetrics,
    /// Metrics as declared by the solution
    pub declared: SolutionMetrics,
}

impl VerificationReport {
    pub fn is_feasible(&self) -> bool {
        self.errors.is_empty()
    }

    /// Violations rendered as text
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }

    pub fn count(&self, kind: ViolationKind) -> usize {
        self.errors.iter().filter(|e| e.kind() == kind).count()
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Status: {}",
            if self.is_feasible() { "FEASIBLE" } else { "INFEASIBLE" }
        )?;
        if !self.errors.is_empty() {
            writeln!(
                f,
                "{} error(s) ({} feasibility, {} metric):",
                self.errors.len(),
                self.count(ViolationKind::Feasibility),
                self.count(ViolationKind::MetricMismatch)
            )?;
            for e in &self.errors {
                writeln!(f, "  - {}", e)?;
            }
        }
        writeln!(f, "Computed metrics:")?;
        write!(f, "{}", self.computed)
    }
}

fn check_demands(instance: &Instance, ledger: &Ledger, tolerances: &Tolerances, errors: &mut Vec<Violation>) {
    for station in &instance.stations {
        for (product, &demand) in station.demand.iter().enumerate() {
            if demand <= 0.0 {
                continue;
            }
            let delivered = ledger.delivered(station.id, product);
            if !((delivered - demand).abs() <= tolerances.demand) {
                errors.push(Violation::DemandNotSatisfied {
                    station: station.id,
                    product,
                    demand,
                    delivered,
                });
            }
        }
    }
}

fn check_stocks(instance: &Instance, ledger: &Ledger, tolerances: &Tolerances, errors: &mut Vec<Violation>) {
    for depot in &instance.depots {
        for (product, &stock) in depot.stocks.iter().enumerate() {
            let loaded = ledger.loaded(depot.id, product);
            if !(loaded - stock <= tolerances.stock) {
                errors.push(Violation::StockExceeded {
                    depot: depot.id,
                    product,
                    stock,
                    loaded,
                });
            }
        }
    }
}

/// Verify a parsed solution against an instance.
pub fn verify(instance: &Instance, solution: &ParsedSolution, config: &VerifierConfig) -> VerificationReport {
    let tolerances = &config.tolerances;
    let outcomes: Vec<RouteOutcome> = if config.parallel {
        solution
            .routes
            .par_iter()
            .map(|route| walk_route(instance, route, tolerances))
            .collect()
    } else {
        solution
            .routes
            .iter()
            .map(|route| walk_route(instance, route, tolerances))
            .collect()
    };

    let mut errors = Vec::new();
    let mut ledger = Ledger::default();
    let mut computed = ComputedMetrics {
        used_vehicles: solution.routes.len(),
        ..Default::default()
    };
    for outcome in outcomes {
        errors.extend(outcome.errors);
        ledger.merge(outcome.ledger);
        computed.total_distance += outcome.distance;
        computed.total_changes += outcome.changes;
        computed.total_switch_cost += outcome.switch_cost;
    }

    check_demands(instance, &ledger, tolerances, &mut errors);
    check_stocks(instance, &ledger, tolerances, &mut errors);
    errors.extend(cross_validate(&solution.metrics, &computed, tolerances));

    log::info!(
        "Verified {} route(s): {} error(s), distance {:.2}, switch cost {:.2}",
        solution.routes.len(),
        errors.len(),
        computed.total_distance,
        computed.total_switch_cost
    );

    VerificationReport {
        errors,
        computed,
        declared: solution.metrics.clone(),
    }
}

/// Parse an instance and a solution from text and verify them.
pub fn verify_text(
    instance_text: &str,
    solution_text: &str,
    config: &VerifierConfig,
) -> Result<VerificationReport, Error> {
    let instance: Instance = instance_text.parse()?;
    let solution = ParsedSolution::parse(solution_text, &instance.dims)?;
    Ok(verify(&instance, &solution, config))
}

//! Error taxonomy for the verification engine.
//!
//! Raw-text failures (`ParseError` for instances, `FormatError` for solutions)
//! reject the whole input. Feasibility and metric problems are not failures:
//! they are collected as [`Violation`] values so that a single verification
//! reports every defect of a solution.

use crate::instance::NodeKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Malformed instance text or unreadable instance file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read instance: {0}")]
    Io(#[from] std::io::Error),

    #[error("instance is empty: missing header line")]
    MissingHeader,

    #[error("line {line}: header must hold 5 integers (P D G S V), found {found} field(s)")]
    HeaderFieldCount { line: usize, found: usize },

    /// `line` is the first surplus line, or the last line present when lines are missing.
    #[error("line {line}: wrong number of data lines: expected {expected} (1 header + {products} cost rows + {vehicles} vehicles + {depots} depots + {garages} garages + {stations} stations), found {found}")]
    LineCount {
        line: usize,
        expected: usize,
        found: usize,
        products: usize,
        vehicles: usize,
        depots: usize,
        garages: usize,
        stations: usize,
    },

    #[error("line {line}: {section} record expects {expected} field(s), found {found}")]
    FieldCount {
        line: usize,
        section: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: {section} field '{value}' is not a valid {expected}")]
    InvalidField {
        line: usize,
        section: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Malformed solution text.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatError {
    #[error("line {line}: expected a '<vehicle>: ...' route line, found '{content}'")]
    MissingPrefix { line: usize, content: String },

    #[error("vehicle {vehicle}: route line has no matching product line")]
    MissingProductLine { vehicle: usize },

    #[error("vehicle {vehicle}: product line is prefixed with vehicle {found}")]
    IdMismatch { vehicle: usize, found: usize },

    #[error("vehicle {vehicle}: route has {nodes} node(s) but product line has {products} token(s)")]
    TokenCount {
        vehicle: usize,
        nodes: usize,
        products: usize,
    },

    #[error("vehicle {vehicle}: malformed token '{token}'")]
    MalformedToken { vehicle: usize, token: String },

    #[error("vehicle {vehicle}: token '{token}' resolves to {resolved}, which contradicts its syntax")]
    KindMismatch {
        vehicle: usize,
        token: String,
        resolved: NodeKey,
    },

    #[error("metrics block must hold exactly 6 non-blank lines, found {found}")]
    MetricsLineCount { found: usize },

    #[error("metric {name} has invalid value '{value}'")]
    InvalidMetric { name: &'static str, value: String },
}

/// Any failure that prevents a verification from running at all.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Category of a [`Violation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Per-route or global invariant broken.
    Feasibility,
    /// Declared metric disagrees with the recomputed one.
    MetricMismatch,
}

/// Metrics that appear in the trailing block of a solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricName {
    UsedVehicles,
    TotalChanges,
    TotalSwitchCost,
    TotalDistance,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricName::UsedVehicles => "used_vehicles",
            MetricName::TotalChanges => "total_changes",
            MetricName::TotalSwitchCost => "total_switch_cost",
            MetricName::TotalDistance => "total_distance",
        };
        f.write_str(name)
    }
}

/// A defect found while verifying a solution.
///
/// Every variant carries the vehicle or entity it concerns together with the
/// expected and actual values; the text form is produced by `Display`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    UnknownVehicle {
        vehicle: usize,
    },
    EmptyRoute {
        vehicle: usize,
    },
    LengthMismatch {
        vehicle: usize,
        nodes: usize,
        products: usize,
    },
    GarageMismatch {
        vehicle: usize,
        expected: NodeKey,
        first: NodeKey,
        last: NodeKey,
    },
    GarageMidRoute {
        vehicle: usize,
        position: usize,
    },
    UnknownDepot {
        vehicle: usize,
        depot: usize,
    },
    UnknownStation {
        vehicle: usize,
        station: usize,
    },
    UnknownProduct {
        vehicle: usize,
        position: usize,
        product: usize,
    },
    CapacityExceeded {
        vehicle: usize,
        depot: usize,
        loaded: f64,
        capacity: f64,
    },
    MassConservation {
        vehicle: usize,
        depot: usize,
        product: usize,
        loaded: f64,
        delivered: f64,
    },
    DeliveryWithoutLoad {
        vehicle: usize,
        station: usize,
        position: usize,
    },
    ProductMidSegment {
        vehicle: usize,
        position: usize,
        expected: usize,
        found: usize,
    },
    DemandNotSatisfied {
        station: usize,
        product: usize,
        demand: f64,
        delivered: f64,
    },
    StockExceeded {
        depot: usize,
        product: usize,
        stock: f64,
        loaded: f64,
    },
    CountMismatch {
        metric: MetricName,
        declared: usize,
        computed: usize,
    },
    ValueMismatch {
        metric: MetricName,
        declared: f64,
        computed: f64,
    },
}

impl Violation {
    pub fn kind(&self) -> ViolationKind {
        match self {
            Violation::CountMismatch { .. } | Violation::ValueMismatch { .. } => {
                ViolationKind::MetricMismatch
            }
            _ => ViolationKind::Feasibility,
        }
    }

    /// Vehicle concerned by the violation, if it is tied to a single route.
    pub fn vehicle(&self) -> Option<usize> {
        match *self {
            Violation::UnknownVehicle { vehicle }
            | Violation::EmptyRoute { vehicle }
            | Violation::LengthMismatch { vehicle, .. }
            | Violation::GarageMismatch { vehicle, .. }
            | Violation::GarageMidRoute { vehicle, .. }
            | Violation::UnknownDepot { vehicle, .. }
            | Violation::UnknownStation { vehicle, .. }
            | Violation::UnknownProduct { vehicle, .. }
            | Violation::CapacityExceeded { vehicle, .. }
            | Violation::MassConservation { vehicle, .. }
            | Violation::DeliveryWithoutLoad { vehicle, .. }
            | Violation::ProductMidSegment { vehicle, .. } => Some(vehicle),
            _ => None,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::UnknownVehicle { vehicle } => {
                write!(f, "Vehicle {}: not present in the instance", vehicle)
            }
            Violation::EmptyRoute { vehicle } => write!(f, "Vehicle {}: empty route", vehicle),
            Violation::LengthMismatch { vehicle, nodes, products } => write!(
                f,
                "Vehicle {}: route/product length mismatch ({} vs {})",
                vehicle, nodes, products
            ),
            Violation::GarageMismatch { vehicle, expected, first, last } => write!(
                f,
                "Vehicle {}: inconsistent garage (expected {}, got {}..{})",
                vehicle, expected, first, last
            ),
            Violation::GarageMidRoute { vehicle, position } => write!(
                f,
                "Vehicle {}: garage used mid-route (position {})",
                vehicle, position
            ),
            Violation::UnknownDepot { vehicle, depot } => {
                write!(f, "Vehicle {}: unknown depot D{}", vehicle, depot)
            }
            Violation::UnknownStation { vehicle, station } => {
                write!(f, "Vehicle {}: unknown station S{}", vehicle, station)
            }
            Violation::UnknownProduct { vehicle, position, product } => write!(
                f,
                "Vehicle {}: unknown product {} at position {}",
                vehicle, product, position
            ),
            Violation::CapacityExceeded { vehicle, depot, loaded, capacity } => write!(
                f,
                "Vehicle {}: capacity exceeded at depot D{} (loaded={}, capacity={})",
                vehicle, depot, loaded, capacity
            ),
            Violation::MassConservation { vehicle, depot, product, loaded, delivered } => write!(
                f,
                "Vehicle {}: mass conservation broken for segment D{} product {} (loaded={}, delivered={})",
                vehicle, depot, product, loaded, delivered
            ),
            Violation::DeliveryWithoutLoad { vehicle, station, position } => write!(
                f,
                "Vehicle {}: delivery to S{} at position {} before any depot load",
                vehicle, station, position
            ),
            Violation::ProductMidSegment { vehicle, position, expected, found } => write!(
                f,
                "Vehicle {}: product changed inside a segment at position {} (loaded product {}, found {})",
                vehicle, position, expected, found
            ),
            Violation::DemandNotSatisfied { station, product, demand, delivered } => write!(
                f,
                "Demand not satisfied: S{} product {} (demand={}, delivered={})",
                station, product, demand, delivered
            ),
            Violation::StockExceeded { depot, product, stock, loaded } => write!(
                f,
                "Stock exceeded: D{} product {} (stock={}, loaded={})",
                depot, product, stock, loaded
            ),
            Violation::CountMismatch { metric, declared, computed } => write!(
                f,
                "Metric {} mismatch: declared={} computed={}",
                metric, declared, computed
            ),
            Violation::ValueMismatch { metric, declared, computed } => write!(
                f,
                "Metric {} mismatch: declared={} computed={:.2}",
                metric, declared, computed
            ),
        }
    }
}

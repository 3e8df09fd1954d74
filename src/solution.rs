//! Candidate solutions and their text format.
//!
//! A solution is a list of vehicle blocks (a route line and a product line
//! sharing the same `<vehicle>:` prefix) followed by six metric lines. Node
//! tokens are `3` for a garage, `1 [500]` for a depot load and `7 (120.5)` for
//! a station delivery; product tokens are `<product>(<cumulative cost>)`.

use crate::error::FormatError;
use crate::instance::{Dimensions, NodeKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stop of a vehicle route
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RouteNode {
    Garage(usize),
    /// Depot visit with the quantity loaded there
    Depot { id: usize, quantity: f64 },
    /// Station visit with the quantity delivered there
    Station { id: usize, quantity: f64 },
}

impl RouteNode {
    pub fn key(&self) -> NodeKey {
        match *self {
            RouteNode::Garage(id) => NodeKey::Garage(id),
            RouteNode::Depot { id, .. } => NodeKey::Depot(id),
            RouteNode::Station { id, .. } => NodeKey::Station(id),
        }
    }

    fn with_key(key: NodeKey, quantity: Option<f64>) -> Self {
        match key {
            NodeKey::Garage(id) => RouteNode::Garage(id),
            NodeKey::Depot(id) => RouteNode::Depot {
                id,
                quantity: quantity.unwrap_or(0.0),
            },
            NodeKey::Station(id) => RouteNode::Station {
                id,
                quantity: quantity.unwrap_or(0.0),
            },
        }
    }
}

impl fmt::Display for RouteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteNode::Garage(id) => write!(f, "{}", id),
            RouteNode::Depot { id, quantity } => write!(f, "{} [{}]", id, quantity),
            RouteNode::Station { id, quantity } => write!(f, "{} ({})", id, quantity),
        }
    }
}

/// Active product at a route position and the changeover cost accumulated so far
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProductStep {
    /// 0-based product index
    pub product: usize,
    pub cumulative_cost: f64,
}

impl fmt::Display for ProductStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.product, self.cumulative_cost)
    }
}

/// How the id of a route token was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdScheme {
    /// Id counted within its own node type
    TypeRelative,
    /// Id carried a `G`, `D` or `S` letter
    Explicit,
    /// Id from one running counter over garages, then depots, then stations
    LegacyOffset,
}

/// Route of one vehicle with its product line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRoute {
    pub vehicle: usize,
    pub nodes: Vec<RouteNode>,
    /// Aligned 1:1 with `nodes`
    pub products: Vec<ProductStep>,
    /// Aligned 1:1 with `nodes`
    pub id_schemes: Vec<IdScheme>,
}

impl VehicleRoute {
    /// Build a route whose ids are all type-relative.
    pub fn new(vehicle: usize, nodes: Vec<RouteNode>, products: Vec<ProductStep>) -> Self {
        let id_schemes = vec![IdScheme::TypeRelative; nodes.len()];
        VehicleRoute {
            vehicle,
            nodes,
            products,
            id_schemes,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the route delivers to at least one station
    pub fn visits_station(&self) -> bool {
        self.nodes.iter().any(|n| matches!(n, RouteNode::Station { .. }))
    }

    pub fn uses_legacy_ids(&self) -> bool {
        self.id_schemes.contains(&IdScheme::LegacyOffset)
    }
}

/// Metrics reported at the end of a solution file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SolutionMetrics {
    pub used_vehicles: usize,
    pub total_changes: usize,
    pub total_switch_cost: f64,
    pub total_distance: f64,
    /// Identifier of the solver that produced the solution
    pub engine: String,
    /// Solve time in seconds
    pub elapsed: f64,
}

/// A solution read from text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSolution {
    pub routes: Vec<VehicleRoute>,
    pub metrics: SolutionMetrics,
}

const METRIC_LINES: usize = 6;

/// Splits `"<vehicle>: rest"` into the vehicle id and the rest.
fn vehicle_prefix(line: &str) -> Option<(usize, &str)> {
    let (head, rest) = line.split_once(':')?;
    let vehicle = head.trim().parse().ok()?;
    Some((vehicle, rest.trim()))
}

fn tokens(rest: &str) -> Vec<&str> {
    if rest.is_empty() {
        Vec::new()
    } else {
        rest.split('-').map(str::trim).collect()
    }
}

/// Splits `"<head><open><inner><close>"`, e.g. `"1 [500]"` into `("1", "500")`.
fn bracketed(token: &str, open: char, close: char) -> Option<(&str, &str)> {
    let (head, tail) = token.split_once(open)?;
    let inner = tail.strip_suffix(close)?;
    Some((head.trim(), inner.trim()))
}

/// Resolve a legacy running-counter id against the declared counts.
fn legacy_node(id: usize, dims: &Dimensions) -> Option<NodeKey> {
    let garages = dims.garages;
    let depots = garages + dims.depots;
    let stations = depots + dims.stations;
    match id {
        0 => None,
        n if n <= garages => Some(NodeKey::Garage(n)),
        n if n <= depots => Some(NodeKey::Depot(n - garages)),
        n if n <= stations => Some(NodeKey::Station(n - depots)),
        _ => None,
    }
}

type KeyConstructor = fn(usize) -> NodeKey;

fn finite(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_node(
    vehicle: usize,
    token: &str,
    dims: &Dimensions,
) -> Result<(RouteNode, IdScheme), FormatError> {
    let malformed = || FormatError::MalformedToken {
        vehicle,
        token: token.to_string(),
    };

    let (head, quantity, syntax) = if let Some((head, qty)) = bracketed(token, '[', ']') {
        (head, Some(qty), NodeKey::Depot as KeyConstructor)
    } else if let Some((head, qty)) = bracketed(token, '(', ')') {
        (head, Some(qty), NodeKey::Station as KeyConstructor)
    } else {
        (token, None, NodeKey::Garage as KeyConstructor)
    };

    let quantity = match quantity {
        Some(q) => Some(finite(q).ok_or_else(malformed)?),
        None => None,
    };

    let mut chars = head.chars();
    let letter = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => Some(c.to_ascii_uppercase()),
        Some(_) => None,
        None => return Err(malformed()),
    };
    let digits = if letter.is_some() { chars.as_str().trim() } else { head };
    let id: usize = digits.parse().map_err(|_| malformed())?;
    let assumed = syntax(id);

    if let Some(letter) = letter {
        let explicit = match letter {
            'G' => NodeKey::Garage(id),
            'D' => NodeKey::Depot(id),
            'S' => NodeKey::Station(id),
            _ => return Err(malformed()),
        };
        if explicit != assumed {
            return Err(FormatError::KindMismatch {
                vehicle,
                token: token.to_string(),
                resolved: explicit,
            });
        }
        return Ok((RouteNode::with_key(explicit, quantity), IdScheme::Explicit));
    }

    let declared = match assumed {
        NodeKey::Garage(_) => dims.garages,
        NodeKey::Depot(_) => dims.depots,
        NodeKey::Station(_) => dims.stations,
    };
    if id <= declared {
        return Ok((RouteNode::with_key(assumed, quantity), IdScheme::TypeRelative));
    }

    match legacy_node(id, dims) {
        // Out of every range: left for the verifier to report as unknown
        None => Ok((RouteNode::with_key(assumed, quantity), IdScheme::TypeRelative)),
        Some(resolved) if std::mem::discriminant(&resolved) != std::mem::discriminant(&assumed) => {
            Err(FormatError::KindMismatch {
                vehicle,
                token: token.to_string(),
                resolved,
            })
        }
        Some(resolved) => {
            log::warn!(
                "Vehicle {}: token '{}' reinterpreted with legacy numbering as {}",
                vehicle,
                token,
                resolved
            );
            Ok((RouteNode::with_key(resolved, quantity), IdScheme::LegacyOffset))
        }
    }
}

fn parse_product(vehicle: usize, token: &str) -> Result<ProductStep, FormatError> {
    let malformed = || FormatError::MalformedToken {
        vehicle,
        token: token.to_string(),
    };
    let (product, cost) = bracketed(token, '(', ')').ok_or_else(malformed)?;
    Ok(ProductStep {
        product: product.parse().map_err(|_| malformed())?,
        cumulative_cost: finite(cost).ok_or_else(malformed)?,
    })
}

fn metric<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, FormatError> {
    value.parse().map_err(|_| FormatError::InvalidMetric {
        name,
        value: value.to_string(),
    })
}

impl ParsedSolution {
    /// Parse a solution text; the declared counts drive the legacy id shim.
    pub fn parse(text: &str, dims: &Dimensions) -> Result<Self, FormatError> {
        let lines: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty())
            .collect();

        // Metrics are the trailing run of lines without a vehicle prefix
        let body_len = lines
            .iter()
            .rposition(|(_, l)| vehicle_prefix(l).is_some())
            .map_or(0, |i| i + 1);
        let (body, trailer) = lines.split_at(body_len);
        if trailer.len() != METRIC_LINES {
            return Err(FormatError::MetricsLineCount {
                found: trailer.len(),
            });
        }

        let mut routes = Vec::new();
        let mut rows = body.iter();
        while let Some(&(line, content)) = rows.next() {
            let (vehicle, route_part) = vehicle_prefix(content).ok_or_else(|| FormatError::MissingPrefix {
                line,
                content: content.to_string(),
            })?;
            let &(product_line, product_content) = rows.next().ok_or(FormatError::MissingProductLine { vehicle })?;
            let (found, product_part) =
                vehicle_prefix(product_content).ok_or_else(|| FormatError::MissingPrefix {
                    line: product_line,
                    content: product_content.to_string(),
                })?;
            if found != vehicle {
                return Err(FormatError::IdMismatch { vehicle, found });
            }

            let node_tokens = tokens(route_part);
            let product_tokens = tokens(product_part);
            if node_tokens.len() != product_tokens.len() {
                return Err(FormatError::TokenCount {
                    vehicle,
                    nodes: node_tokens.len(),
                    products: product_tokens.len(),
                });
            }

            let mut nodes = Vec::with_capacity(node_tokens.len());
            let mut id_schemes = Vec::with_capacity(node_tokens.len());
            for token in node_tokens {
                let (node, scheme) = parse_node(vehicle, token, dims)?;
                nodes.push(node);
                id_schemes.push(scheme);
            }
            let products = product_tokens
                .into_iter()
                .map(|t| parse_product(vehicle, t))
                .collect::<Result<Vec<_>, _>>()?;

            routes.push(VehicleRoute {
                vehicle,
                nodes,
                products,
                id_schemes,
            });
        }

        let values: Vec<&str> = trailer.iter().map(|&(_, l)| l).collect();
        let metrics = SolutionMetrics {
            used_vehicles: metric("used_vehicles", values[0])?,
            total_changes: metric("total_changes", values[1])?,
            total_switch_cost: metric("total_switch_cost", values[2])?,
            total_distance: metric("total_distance", values[3])?,
            engine: values[4].to_string(),
            elapsed: metric("elapsed", values[5])?,
        };

        log::debug!("Parsed solution with {} route(s)", routes.len());
        Ok(ParsedSolution { routes, metrics })
    }

    pub fn route(&self, vehicle: usize) -> Option<&VehicleRoute> {
        self.routes.iter().find(|r| r.vehicle == vehicle)
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(" - ")
}

/// Node token as written back: explicit ids keep their letter.
fn render_node(node: &RouteNode, scheme: IdScheme) -> String {
    match scheme {
        IdScheme::TypeRelative => node.to_string(),
        IdScheme::Explicit | IdScheme::LegacyOffset => {
            let letter = match node {
                RouteNode::Garage(_) => 'G',
                RouteNode::Depot { .. } => 'D',
                RouteNode::Station { .. } => 'S',
            };
            format!("{}{}", letter, node)
        }
    }
}

/// Writes the solution back in its text format. Numbers use the shortest
/// representation that parses to the same value, so parsing the output gives
/// back an equal solution, except that legacy-numbered tokens are written
/// with an explicit letter and read back as [`IdScheme::Explicit`].
impl fmt::Display for ParsedSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for route in &self.routes {
            let nodes: Vec<String> = route
                .nodes
                .iter()
                .enumerate()
                .map(|(i, node)| {
                    let scheme = route.id_schemes.get(i).copied().unwrap_or(IdScheme::TypeRelative);
                    render_node(node, scheme)
                })
                .collect();
            writeln!(f, "{}: {}", route.vehicle, nodes.join(" - "))?;
            writeln!(f, "{}: {}", route.vehicle, join(&route.products))?;
            writeln!(f)?;
        }
        let m = &self.metrics;
        writeln!(f, "{}", m.used_vehicles)?;
        writeln!(f, "{}", m.total_changes)?;
        writeln!(f, "{}", m.total_switch_cost)?;
        writeln!(f, "{}", m.total_distance)?;
        writeln!(f, "{}", m.engine)?;
        writeln!(f, "{}", m.elapsed)
    }
}

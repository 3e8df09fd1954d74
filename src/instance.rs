//! Module for parsing and representing MPVRP-CC instances.
//!
//! This module handles the line-oriented `.dat` format used by the contest:
//! a header of counts, the product changeover-cost matrix, then vehicle,
//! depot, garage and station records. Euclidean distances between every pair
//! of physical nodes are computed once at load time.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Typed reference to a physical node of the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKey {
    Garage(usize),
    Depot(usize),
    Station(usize),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Garage(id) => write!(f, "G{}", id),
            NodeKey::Depot(id) => write!(f, "D{}", id),
            NodeKey::Station(id) => write!(f, "S{}", id),
        }
    }
}

/// A truck of the fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: usize,
    pub capacity: f64,
    /// Home garage: routes must start and end there
    pub garage: usize,
    /// Product loaded at departure, 1-based as written in the instance file
    pub initial_product: usize,
}

/// A depot holding a stock of every product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Depot {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    /// Stock per product index
    pub stocks: Vec<f64>,
}

impl Depot {
    pub fn stock(&self, product: usize) -> f64 {
        self.stocks.get(product).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Garage {
    pub id: usize,
    pub x: f64,
    pub y: f64,
}

/// A station with a demand for every product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    /// Demand per product index
    pub demand: Vec<f64>,
}

impl Station {
    pub fn demand(&self, product: usize) -> f64 {
        self.demand.get(product).copied().unwrap_or(0.0)
    }
}

/// Counts declared in the header line of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub products: usize,
    pub depots: usize,
    pub garages: usize,
    pub stations: usize,
    pub vehicles: usize,
}

impl Dimensions {
    /// Number of data lines an instance with these counts must contain.
    pub fn expected_lines(&self) -> usize {
        1 + self.products + self.vehicles + self.depots + self.garages + self.stations
    }
}

/// Represents a complete MPVRP-CC instance
#[derive(Debug, Clone)]
pub struct Instance {
    /// Identifier from the optional `# <uuid>` comment line
    pub uuid: Option<String>,
    pub dims: Dimensions,
    /// Changeover cost matrix indexed by product index
    pub costs: Vec<Vec<f64>>,
    pub vehicles: Vec<Vehicle>,
    pub depots: Vec<Depot>,
    pub garages: Vec<Garage>,
    pub stations: Vec<Station>,
    /// Position of every node inside its own collection (first occurrence wins)
    lookup: HashMap<NodeKey, usize>,
    vehicle_lookup: HashMap<usize, usize>,
    /// Dense distance matrix over depots, then garages, then stations
    distance_matrix: Vec<Vec<f64>>,
}

impl Instance {
    /// Build an instance and precompute its lookups and distance matrix.
    pub fn new(
        uuid: Option<String>,
        dims: Dimensions,
        costs: Vec<Vec<f64>>,
        vehicles: Vec<Vehicle>,
        depots: Vec<Depot>,
        garages: Vec<Garage>,
        stations: Vec<Station>,
    ) -> Self {
        let mut lookup = HashMap::new();
        for (i, d) in depots.iter().enumerate() {
            lookup.entry(NodeKey::Depot(d.id)).or_insert(i);
        }
        for (i, g) in garages.iter().enumerate() {
            lookup.entry(NodeKey::Garage(g.id)).or_insert(i);
        }
        for (i, s) in stations.iter().enumerate() {
            lookup.entry(NodeKey::Station(s.id)).or_insert(i);
        }

        let mut vehicle_lookup = HashMap::new();
        for (i, v) in vehicles.iter().enumerate() {
            vehicle_lookup.entry(v.id).or_insert(i);
        }

        let coords: Vec<(f64, f64)> = depots
            .iter()
            .map(|d| (d.x, d.y))
            .chain(garages.iter().map(|g| (g.x, g.y)))
            .chain(stations.iter().map(|s| (s.x, s.y)))
            .collect();
        let distance_matrix = Self::compute_distance_matrix(&coords);

        Instance {
            uuid,
            dims,
            costs,
            vehicles,
            depots,
            garages,
            stations,
            lookup,
            vehicle_lookup,
            distance_matrix,
        }
    }

    /// Parse an instance from a `.dat` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        let content = fs::read_to_string(path)?;
        content.parse()
    }

    /// Compute Euclidean distance matrix
    fn compute_distance_matrix(coords: &[(f64, f64)]) -> Vec<Vec<f64>> {
        let n = coords.len();
        let mut matrix = vec![vec![0.0; n]; n];

        for i in 0..n {
            for j in 0..n {
                if i != j {
                    let dx = coords[i].0 - coords[j].0;
                    let dy = coords[i].1 - coords[j].1;
                    matrix[i][j] = (dx * dx + dy * dy).sqrt();
                }
            }
        }

        matrix
    }

    /// Row of a node in the dense distance matrix
    fn dense_index(&self, key: NodeKey) -> Option<usize> {
        let pos = *self.lookup.get(&key)?;
        Some(match key {
            NodeKey::Depot(_) => pos,
            NodeKey::Garage(_) => self.depots.len() + pos,
            NodeKey::Station(_) => self.depots.len() + self.garages.len() + pos,
        })
    }

    /// Distance between two nodes, `None` when either is unknown
    pub fn distance(&self, from: NodeKey, to: NodeKey) -> Option<f64> {
        let i = self.dense_index(from)?;
        let j = self.dense_index(to)?;
        Some(self.distance_matrix[i][j])
    }

    /// Changeover cost between two product indices, `None` when out of range
    pub fn changeover_cost(&self, from: usize, to: usize) -> Option<f64> {
        self.costs.get(from)?.get(to).copied()
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.lookup.contains_key(&key)
    }

    pub fn vehicle(&self, id: usize) -> Option<&Vehicle> {
        self.vehicle_lookup.get(&id).map(|&i| &self.vehicles[i])
    }

    pub fn depot(&self, id: usize) -> Option<&Depot> {
        self.lookup.get(&NodeKey::Depot(id)).map(|&i| &self.depots[i])
    }

    pub fn garage(&self, id: usize) -> Option<&Garage> {
        self.lookup.get(&NodeKey::Garage(id)).map(|&i| &self.garages[i])
    }

    pub fn station(&self, id: usize) -> Option<&Station> {
        self.lookup.get(&NodeKey::Station(id)).map(|&i| &self.stations[i])
    }

    /// Coordinates of a node
    pub fn coordinates(&self, key: NodeKey) -> Option<(f64, f64)> {
        match key {
            NodeKey::Depot(id) => self.depot(id).map(|d| (d.x, d.y)),
            NodeKey::Garage(id) => self.garage(id).map(|g| (g.x, g.y)),
            NodeKey::Station(id) => self.station(id).map(|s| (s.x, s.y)),
        }
    }

    pub fn num_products(&self) -> usize {
        self.dims.products
    }

    /// Sum of the capacities of the whole fleet
    pub fn fleet_capacity(&self) -> f64 {
        self.vehicles.iter().map(|v| v.capacity).sum()
    }

    pub fn total_stock(&self, product: usize) -> f64 {
        self.depots.iter().map(|d| d.stock(product)).sum()
    }

    pub fn total_demand(&self, product: usize) -> f64 {
        self.stations.iter().map(|s| s.demand(product)).sum()
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let n = self.distance_matrix.len();
        let mut distances: Vec<f64> = Vec::new();
        for i in 0..n {
            for j in i + 1..n {
                distances.push(self.distance_matrix[i][j]);
            }
        }
        let avg_distance = if distances.is_empty() {
            0.0
        } else {
            distances.iter().sum::<f64>() / distances.len() as f64
        };
        let max_distance = distances.iter().cloned().fold(0.0, f64::max);

        let products = self.num_products();
        InstanceStatistics {
            uuid: self.uuid.clone(),
            dims: self.dims,
            fleet_capacity: self.fleet_capacity(),
            total_stock: (0..products).map(|p| self.total_stock(p)).collect(),
            total_demand: (0..products).map(|p| self.total_demand(p)).collect(),
            avg_distance,
            max_distance,
        }
    }
}

/// Returns the UUID carried by a comment line such as `# 1f0e...`, if any.
fn comment_uuid(line: &str) -> Option<String> {
    let candidate = line.trim_start_matches('#').trim();
    let groups: Vec<&str> = candidate.split('-').collect();
    let shape = [8, 4, 4, 4, 12];
    let well_formed = groups.len() == shape.len()
        && groups
            .iter()
            .zip(shape.iter())
            .all(|(g, &len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()));
    if well_formed {
        Some(candidate.to_lowercase())
    } else {
        None
    }
}

/// Split a record into exactly `expected` whitespace-separated fields.
fn record<'a>(
    line: usize,
    text: &'a str,
    section: &'static str,
    expected: usize,
) -> Result<Vec<&'a str>, ParseError> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() != expected {
        return Err(ParseError::FieldCount {
            line,
            section,
            expected,
            found: fields.len(),
        });
    }
    Ok(fields)
}

fn field<T: FromStr>(
    line: usize,
    section: &'static str,
    value: &str,
    expected: &'static str,
) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidField {
        line,
        section,
        value: value.to_string(),
        expected,
    })
}

/// Parse a quantity or coordinate; `NaN` and infinities are rejected.
fn number(line: usize, section: &'static str, value: &str) -> Result<f64, ParseError> {
    let parsed: f64 = field(line, section, value, NUMBER)?;
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(ParseError::InvalidField {
            line,
            section,
            value: value.to_string(),
            expected: NUMBER,
        })
    }
}

const INTEGER: &str = "non-negative integer";
const NUMBER: &str = "finite number";

impl FromStr for Instance {
    type Err = ParseError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let mut uuid = None;
        // (1-based physical line number, trimmed content)
        let mut lines: Vec<(usize, &str)> = Vec::new();

        for (i, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('#') {
                if uuid.is_none() {
                    uuid = comment_uuid(line);
                }
                continue;
            }
            lines.push((i + 1, line));
        }

        let &(header_line, header) = lines.first().ok_or(ParseError::MissingHeader)?;
        let header_fields: Vec<&str> = header.split_whitespace().collect();
        if header_fields.len() != 5 {
            return Err(ParseError::HeaderFieldCount {
                line: header_line,
                found: header_fields.len(),
            });
        }
        let counts: Vec<usize> = header_fields
            .iter()
            .map(|v| field(header_line, "header", v, INTEGER))
            .collect::<Result<_, _>>()?;
        let dims = Dimensions {
            products: counts[0],
            depots: counts[1],
            garages: counts[2],
            stations: counts[3],
            vehicles: counts[4],
        };

        let expected = dims.expected_lines();
        if lines.len() != expected {
            let (line, _) = lines
                .get(expected)
                .or_else(|| lines.last())
                .copied()
                .unwrap_or((header_line, header));
            return Err(ParseError::LineCount {
                line,
                expected,
                found: lines.len(),
                products: dims.products,
                vehicles: dims.vehicles,
                depots: dims.depots,
                garages: dims.garages,
                stations: dims.stations,
            });
        }

        let mut rows = lines.iter().skip(1);
        let p = dims.products;

        let mut costs = Vec::with_capacity(p);
        for &(line, text) in rows.by_ref().take(p) {
            let row = record(line, text, "cost matrix", p)?
                .into_iter()
                .map(|v| number(line, "cost matrix", v))
                .collect::<Result<Vec<f64>, _>>()?;
            costs.push(row);
        }

        let mut vehicles = Vec::with_capacity(dims.vehicles);
        for &(line, text) in rows.by_ref().take(dims.vehicles) {
            let f = record(line, text, "vehicle", 4)?;
            vehicles.push(Vehicle {
                id: field(line, "vehicle", f[0], INTEGER)?,
                capacity: number(line, "vehicle", f[1])?,
                garage: field(line, "vehicle", f[2], INTEGER)?,
                initial_product: field(line, "vehicle", f[3], INTEGER)?,
            });
        }

        let mut depots = Vec::with_capacity(dims.depots);
        for &(line, text) in rows.by_ref().take(dims.depots) {
            let f = record(line, text, "depot", 3 + p)?;
            depots.push(Depot {
                id: field(line, "depot", f[0], INTEGER)?,
                x: number(line, "depot", f[1])?,
                y: number(line, "depot", f[2])?,
                stocks: f[3..]
                    .iter()
                    .map(|v| number(line, "depot", v))
                    .collect::<Result<_, _>>()?,
            });
        }

        let mut garages = Vec::with_capacity(dims.garages);
        for &(line, text) in rows.by_ref().take(dims.garages) {
            let f = record(line, text, "garage", 3)?;
            garages.push(Garage {
                id: field(line, "garage", f[0], INTEGER)?,
                x: number(line, "garage", f[1])?,
                y: number(line, "garage", f[2])?,
            });
        }

        let mut stations = Vec::with_capacity(dims.stations);
        for &(line, text) in rows.by_ref().take(dims.stations) {
            let f = record(line, text, "station", 3 + p)?;
            stations.push(Station {
                id: field(line, "station", f[0], INTEGER)?,
                x: number(line, "station", f[1])?,
                y: number(line, "station", f[2])?,
                demand: f[3..]
                    .iter()
                    .map(|v| number(line, "station", v))
                    .collect::<Result<_, _>>()?,
            });
        }

        log::debug!(
            "Loaded instance {}: {} products, {} depots, {} garages, {} stations, {} vehicles",
            uuid.as_deref().unwrap_or("<no uuid>"),
            dims.products,
            dims.depots,
            dims.garages,
            dims.stations,
            dims.vehicles
        );

        Ok(Instance::new(uuid, dims, costs, vehicles, depots, garages, stations))
    }
}

/// Statistics about an MPVRP-CC instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub uuid: Option<String>,
    pub dims: Dimensions,
    pub fleet_capacity: f64,
    pub total_stock: Vec<f64>,
    pub total_demand: Vec<f64>,
    pub avg_distance: f64,
    pub max_distance: f64,
}

impl fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Instance: {}", self.uuid.as_deref().unwrap_or("(no uuid)"))?;
        writeln!(f, "  Products: {}", self.dims.products)?;
        writeln!(f, "  Depots: {}", self.dims.depots)?;
        writeln!(f, "  Garages: {}", self.dims.garages)?;
        writeln!(f, "  Stations: {}", self.dims.stations)?;
        writeln!(f, "  Vehicles: {} (fleet capacity {:.0})", self.dims.vehicles, self.fleet_capacity)?;
        for (p, (stock, demand)) in self.total_stock.iter().zip(&self.total_demand).enumerate() {
            writeln!(f, "  Product {}: stock {:.0}, demand {:.0}", p + 1, stock, demand)?;
        }
        writeln!(f, "  Avg distance: {:.2}", self.avg_distance)?;
        write!(f, "  Max distance: {:.2}", self.max_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::SAMPLE_INSTANCE;
    use std::io::Write;

    #[test]
    fn test_parse_sample() {
        let instance: Instance = SAMPLE_INSTANCE.parse().unwrap();

        assert_eq!(
            instance.uuid.as_deref(),
            Some("1f0e4c2a-3b5d-4e6f-8a9b-0c1d2e3f4a5b")
        );
        assert_eq!(instance.dims.products, 2);
        assert_eq!(instance.vehicles.len(), 2);
        assert_eq!(instance.costs[0][1], 10.0);
        assert_eq!(instance.costs[1][0], 12.0);
        assert_eq!(instance.vehicle(2).unwrap().capacity, 1000.0);
        assert_eq!(instance.depot(1).unwrap().stock(1), 2000.0);
        assert_eq!(instance.station(2).unwrap().demand(1), 800.0);
        assert!(instance.contains(NodeKey::Garage(2)));
        assert!(!instance.contains(NodeKey::Garage(3)));
    }

    #[test]
    fn test_distance_calculation() {
        let instance: Instance = SAMPLE_INSTANCE.parse().unwrap();

        let d = instance.distance(NodeKey::Station(1), NodeKey::Station(2)).unwrap();
        assert!((d - 50.0).abs() < 1e-10);
        let d = instance.distance(NodeKey::Depot(1), NodeKey::Garage(1)).unwrap();
        assert!((d - 50.0 * 2f64.sqrt()).abs() < 1e-10);
        assert_eq!(instance.distance(NodeKey::Garage(1), NodeKey::Garage(1)), Some(0.0));
        assert_eq!(instance.distance(NodeKey::Garage(1), NodeKey::Station(9)), None);
    }

    #[test]
    fn test_line_count_mismatch() {
        let text = "1 1 1 1 1\n0\n1 100 1 1\n1 0 0 10\n1 5 5\n";
        match text.parse::<Instance>() {
            Err(ParseError::LineCount { line, expected, found, .. }) => {
                assert_eq!(line, 5);
                assert_eq!(expected, 6);
                assert_eq!(found, 5);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let surplus = "1 1 1 1 1\n0\n1 100 1 1\n\n1 0 0 10\n1 5 5\n2 3 3 4\n3 1 1 1\n";
        match surplus.parse::<Instance>() {
            Err(err @ ParseError::LineCount { .. }) => {
                assert!(matches!(err, ParseError::LineCount { line: 8, found: 7, .. }));
                assert!(err.to_string().starts_with("line 8: wrong number of data lines"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_quantities_rejected() {
        for (from, to, line, section) in [
            ("1 50 50 3000 2000", "1 50 50 3000 NaN", 7, "depot"),
            ("2 75 25 0 800", "2 75 25 inf 800", 11, "station"),
            ("1 5000 1 1", "1 infinity 1 1", 5, "vehicle"),
        ] {
            let text = SAMPLE_INSTANCE.replace(from, to);
            match text.parse::<Instance>() {
                Err(ParseError::InvalidField { line: l, section: s, expected, .. }) => {
                    assert_eq!((l, s), (line, section), "{}", to);
                    assert_eq!(expected, "finite number");
                }
                other => panic!("{}: unexpected result: {:?}", to, other),
            }
        }
    }

    #[test]
    fn test_invalid_field_names_line() {
        let text = "# comment\n1 1 1 1 1\n0\n1 abc 1 1\n1 0 0 10\n1 5 5\n2 3 3 4\n";
        match text.parse::<Instance>() {
            Err(ParseError::InvalidField { line, section, value, .. }) => {
                assert_eq!(line, 4);
                assert_eq!(section, "vehicle");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_field_count_mismatch() {
        let text = "1 1 1 1 1\n0\n1 100 1 1\n1 0 0\n1 5 5\n2 3 3 4\n";
        match text.parse::<Instance>() {
            Err(ParseError::FieldCount { line, section, expected, found }) => {
                assert_eq!(line, 4);
                assert_eq!(section, "depot");
                assert_eq!(expected, 4);
                assert_eq!(found, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_empty_and_bad_header() {
        assert!(matches!("".parse::<Instance>(), Err(ParseError::MissingHeader)));
        assert!(matches!(
            "1 2 3\n".parse::<Instance>(),
            Err(ParseError::HeaderFieldCount { line: 1, found: 3 })
        ));
    }

    #[test]
    fn test_comment_without_uuid() {
        assert_eq!(comment_uuid("# generated by hand"), None);
        assert_eq!(
            comment_uuid("#   1F0E4C2A-3B5D-4E6F-8A9B-0C1D2E3F4A5B"),
            Some("1f0e4c2a-3b5d-4e6f-8a9b-0c1d2e3f4a5b".to_string())
        );
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_INSTANCE.as_bytes()).unwrap();

        let instance = Instance::from_file(file.path()).unwrap();
        assert_eq!(instance.stations.len(), 2);

        let missing = Instance::from_file(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ParseError::Io(_))));
    }

    #[test]
    fn test_statistics() {
        let instance: Instance = SAMPLE_INSTANCE.parse().unwrap();
        let stats = instance.statistics();

        assert_eq!(stats.fleet_capacity, 6000.0);
        assert_eq!(stats.total_stock, vec![3000.0, 2000.0]);
        assert_eq!(stats.total_demand, vec![1000.0, 1300.0]);
        assert!(stats.max_distance > 0.0);
        assert!(stats.to_string().contains("Product 2: stock 2000, demand 1300"));
    }
}

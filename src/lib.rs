//! MPVRP-CC Verifier Library
//!
//! Verification engine for the Multi-Product Vehicle Routing Problem with
//! Changeover Costs: trucks load one product at a time at depots, deliver it
//! to stations, and pay a cost whenever they switch product.
//!
//! # Features
//!
//! - Instance loading with precomputed distances, and instance validation
//! - Solution parsing, including the legacy node numbering
//! - Feasibility checks (garages, capacity, mass conservation, demand, stock)
//! - Cross-validation of the metrics declared by a solution
//! - Quality scoring and batch evaluation of solution directories
//!
//! # Example
//!
//! ```no_run
//! use mpvrp_verifier::config::VerifierConfig;
//! use mpvrp_verifier::instance::Instance;
//! use mpvrp_verifier::solution::ParsedSolution;
//! use mpvrp_verifier::verifier::verify;
//!
//! let instance = Instance::from_file("MPVRP_S_001.dat").unwrap();
//! let text = std::fs::read_to_string("Sol_MPVRP_S_001.dat").unwrap();
//! let solution = ParsedSolution::parse(&text, &instance.dims).unwrap();
//!
//! let report = verify(&instance, &solution, &VerifierConfig::default());
//! for message in report.messages() {
//!     println!("{}", message);
//! }
//! println!("Feasible: {}", report.is_feasible());
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod instance;
pub mod metrics;
pub mod scoring;
pub mod solution;
pub mod validation;
pub mod verifier;

#[cfg(test)]
mod fixtures;

pub use config::{Tolerances, ValidationPolicy, VerifierConfig};
pub use error::{Error, FormatError, ParseError, Violation, ViolationKind};
pub use instance::{Instance, NodeKey};
pub use solution::ParsedSolution;
pub use verifier::{verify, verify_text, VerificationReport};

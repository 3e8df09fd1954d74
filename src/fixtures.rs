//! Shared instance and solution texts for unit tests.

/// Two products, one depot, two garages, two stations, two vehicles.
///
/// Vehicle 1 (capacity 5000) lives in G1, vehicle 2 (capacity 1000) in G2.
pub const SAMPLE_INSTANCE: &str = "\
# 1f0e4c2a-3b5d-4e6f-8a9b-0c1d2e3f4a5b
2 1 2 2 2
0.0 10.0
12.0 0.0
1 5000 1 1
2 1000 2 2
1 50 50 3000 2000
1 0 0
2 100 100
1 25 25 1000 500
2 75 25 0 800
";

/// A feasible solution of [`SAMPLE_INSTANCE`] served by vehicle 1 alone.
pub const VALID_SOLUTION: &str = "\
1: 1 - 1 [1000] - 1 (1000) - 1 [1300] - 1 (500) - 2 (800) - 1
1: 0(0.0) - 0(0.0) - 0(0.0) - 1(10.0) - 1(10.0) - 1(10.0) - 1(10.0)

1
1
10.0
305.83
test-engine
0.512
";

/// Exact total distance of [`VALID_SOLUTION`].
pub fn valid_solution_distance() -> f64 {
    let diag = 25.0 * 2f64.sqrt();
    2.0 * diag + 3.0 * diag + 50.0 + (75f64 * 75.0 + 25.0 * 25.0).sqrt()
}

//! Batch verification of a directory of solutions.
//!
//! Every instance `<stem>.dat` is paired with the solution `Sol_<stem>.dat`.
//! A pair that cannot be evaluated (missing file, unreadable or malformed
//! text) becomes a failed record; the batch itself never stops early.
//! Anything but a feasible solution is charged a fixed penalty objective.

use crate::config::VerifierConfig;
use crate::instance::Instance;
use crate::scoring::score;
use crate::solution::ParsedSolution;
use crate::verifier::verify;

use indicatif::{ProgressBar, ProgressStyle};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Batch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub verifier: VerifierConfig,
    /// Evaluate pairs on the rayon thread pool
    pub parallel: bool,
    /// Objective charged to anything but a feasible solution
    pub penalty: f64,
    /// Show a progress bar on stderr
    pub progress: bool,
    /// File name prefix of solutions
    pub solution_prefix: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            verifier: VerifierConfig::default(),
            parallel: true,
            penalty: 100_000.0,
            progress: true,
            solution_prefix: "Sol_".to_string(),
        }
    }
}

impl BatchConfig {
    /// Load a batch configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Cannot open config {}: {}", path.as_ref().display(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("Invalid config {}: {}", path.as_ref().display(), e))
    }
}

/// An instance file and the solution expected for it
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPair {
    pub name: String,
    pub instance: PathBuf,
    pub solution: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Feasible,
    Infeasible,
    MissingSolution,
    InstanceError,
    SolutionError,
}

impl RecordStatus {
    /// Whether the pair could not be verified at all
    pub fn is_failure(&self) -> bool {
        !matches!(self, RecordStatus::Feasible | RecordStatus::Infeasible)
    }
}

/// Result of evaluating a single pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub instance: String,
    pub status: RecordStatus,
    pub feasible: bool,
    pub error_count: usize,
    pub used_vehicles: Option<usize>,
    pub total_changes: Option<usize>,
    pub total_switch_cost: Option<f64>,
    pub total_distance: Option<f64>,
    /// Distance plus switch cost, or the penalty
    pub objective: f64,
    pub score: Option<f64>,
    /// Solve time declared by the solution
    pub declared_time: Option<f64>,
    /// First error or failure reason
    pub message: Option<String>,
}

impl BatchRecord {
    fn failed(name: &str, status: RecordStatus, message: String, penalty: f64) -> Self {
        log::warn!("{}: {}", name, message);
        BatchRecord {
            instance: name.to_string(),
            status,
            feasible: false,
            error_count: 1,
            used_vehicles: None,
            total_changes: None,
            total_switch_cost: None,
            total_distance: None,
            objective: penalty,
            score: None,
            declared_time: None,
            message: Some(message),
        }
    }
}

/// Aggregated figures of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub feasible: usize,
    pub infeasible: usize,
    pub failed: usize,
    /// Sum of every objective, penalties included
    pub total_objective: f64,
    /// Statistics over feasible records only
    pub mean_objective: Option<f64>,
    pub std_objective: Option<f64>,
    pub best_objective: Option<f64>,
    pub worst_objective: Option<f64>,
    pub mean_score: Option<f64>,
}

/// List instance/solution pairs, sorted by instance name.
///
/// Solutions may sit in the same directory as the instances; files carrying
/// the solution prefix are never taken as instances.
pub fn discover_pairs<P: AsRef<Path>, Q: AsRef<Path>>(
    instances_dir: P,
    solutions_dir: Q,
    prefix: &str,
) -> std::io::Result<Vec<BatchPair>> {
    let mut pairs = Vec::new();

    for entry in fs::read_dir(instances_dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().map(|e| e != "dat").unwrap_or(true) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.starts_with(prefix) {
            continue;
        }
        let solution = solutions_dir.as_ref().join(format!("{}{}.dat", prefix, stem));
        pairs.push(BatchPair {
            name: stem.to_string(),
            instance: path.clone(),
            solution,
        });
    }

    pairs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(pairs)
}

/// Load, parse, verify and score one pair.
pub fn evaluate_pair(pair: &BatchPair, config: &BatchConfig) -> BatchRecord {
    let name = pair.name.as_str();

    let instance = match Instance::from_file(&pair.instance) {
        Ok(instance) => instance,
        Err(e) => return BatchRecord::failed(name, RecordStatus::InstanceError, e.to_string(), config.penalty),
    };
    let text = match fs::read_to_string(&pair.solution) {
        Ok(text) => text,
        Err(e) => {
            return BatchRecord::failed(
                name,
                RecordStatus::MissingSolution,
                format!("cannot read {}: {}", pair.solution.display(), e),
                config.penalty,
            )
        }
    };
    let solution = match ParsedSolution::parse(&text, &instance.dims) {
        Ok(solution) => solution,
        Err(e) => return BatchRecord::failed(name, RecordStatus::SolutionError, e.to_string(), config.penalty),
    };

    let report = verify(&instance, &solution, &config.verifier);
    let feasible = report.is_feasible();
    let computed = report.computed;
    let quality = feasible.then(|| score(&instance, &solution, &report).total);

    BatchRecord {
        instance: name.to_string(),
        status: if feasible {
            RecordStatus::Feasible
        } else {
            RecordStatus::Infeasible
        },
        feasible,
        error_count: report.errors.len(),
        used_vehicles: Some(computed.used_vehicles),
        total_changes: Some(computed.total_changes),
        total_switch_cost: Some(computed.total_switch_cost),
        total_distance: Some(computed.total_distance),
        objective: if feasible { computed.objective() } else { config.penalty },
        score: quality,
        declared_time: Some(solution.metrics.elapsed),
        message: report.errors.first().map(|e| e.to_string()),
    }
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Batch verification engine
pub struct BatchRunner {
    config: BatchConfig,
    records: Vec<BatchRecord>,
}

impl BatchRunner {
    pub fn new(config: BatchConfig) -> Self {
        BatchRunner {
            config,
            records: Vec::new(),
        }
    }

    /// Evaluate the given pairs, appending one record per pair in input order.
    pub fn run_pairs(&mut self, pairs: &[BatchPair]) {
        let bar = progress_bar(pairs.len(), self.config.progress);
        let config = &self.config;

        let evaluate = |pair: &BatchPair| {
            let record = evaluate_pair(pair, config);
            bar.set_message(pair.name.clone());
            bar.inc(1);
            record
        };
        let records: Vec<BatchRecord> = if config.parallel {
            pairs.par_iter().map(evaluate).collect()
        } else {
            pairs.iter().map(evaluate).collect()
        };
        bar.finish_and_clear();

        log::info!(
            "Batch evaluated {} pair(s), {} feasible",
            records.len(),
            records.iter().filter(|r| r.feasible).count()
        );
        self.records.extend(records);
    }

    /// Discover and evaluate every pair of two directories.
    pub fn run<P: AsRef<Path>, Q: AsRef<Path>>(&mut self, instances_dir: P, solutions_dir: Q) -> std::io::Result<()> {
        let pairs = discover_pairs(instances_dir, solutions_dir, &self.config.solution_prefix)?;
        self.run_pairs(&pairs);
        Ok(())
    }

    pub fn records(&self) -> &[BatchRecord] {
        &self.records
    }

    /// Compute summary statistics over the records
    pub fn compute_summary(&self) -> BatchSummary {
        let feasible: Vec<&BatchRecord> = self.records.iter().filter(|r| r.feasible).collect();
        let objectives: Vec<f64> = feasible.iter().map(|r| r.objective).collect();
        let scores: Vec<f64> = feasible.iter().filter_map(|r| r.score).collect();
        let failed = self.records.iter().filter(|r| r.status.is_failure()).count();

        let stat = |value: f64| if value.is_finite() { Some(value) } else { None };
        let (mean, std, best, worst) = if objectives.is_empty() {
            (None, None, None, None)
        } else {
            (
                stat(objectives.iter().mean()),
                // Sample deviation is undefined for a single value
                stat(objectives.iter().std_dev()).or(Some(0.0)),
                stat(objectives.iter().copied().fold(f64::INFINITY, f64::min)),
                stat(objectives.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            )
        };

        BatchSummary {
            total: self.records.len(),
            feasible: feasible.len(),
            infeasible: self.records.len() - feasible.len() - failed,
            failed,
            total_objective: self.records.iter().map(|r| r.objective).sum(),
            mean_objective: mean,
            std_objective: std,
            best_objective: best,
            worst_objective: worst,
            mean_score: if scores.is_empty() {
                None
            } else {
                stat(scores.iter().mean())
            },
        }
    }

    /// Export records to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for record in &self.records {
            writer.serialize(record)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Generate a plain-text report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();
        let summary = self.compute_summary();
        let fmt_opt = |v: Option<f64>| v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "-".to_string());

        report.push_str("========================================\n");
        report.push_str("       MPVRP-CC Verification Report\n");
        report.push_str("========================================\n");
        report.push_str(&format!(
            "Generated: {}\n\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));

        report.push_str(&format!(
            "Pairs: {} ({} feasible, {} infeasible, {} failed)\n",
            summary.total, summary.feasible, summary.infeasible, summary.failed
        ));
        report.push_str(&format!("Total objective: {:.2}\n", summary.total_objective));
        report.push_str(&format!(
            "Feasible objective: mean {} / std {} / best {} / worst {}\n",
            fmt_opt(summary.mean_objective),
            fmt_opt(summary.std_objective),
            fmt_opt(summary.best_objective),
            fmt_opt(summary.worst_objective)
        ));
        report.push_str(&format!("Mean quality score: {}\n\n", fmt_opt(summary.mean_score)));

        let mut ranked: Vec<&BatchRecord> = self.records.iter().collect();
        ranked.sort_by_key(|r| (!r.feasible, OrderedFloat(r.objective)));

        report.push_str("-".repeat(80).as_str());
        report.push('\n');
        report.push_str(&format!(
            "{:<30} {:>16} {:>8} {:>12} {:>10}\n",
            "Instance", "Status", "Errors", "Objective", "Score"
        ));
        report.push_str("-".repeat(80).as_str());
        report.push('\n');

        for record in &ranked {
            report.push_str(&format!(
                "{:<30} {:>16} {:>8} {:>12.2} {:>10}\n",
                record.instance,
                format!("{:?}", record.status),
                record.error_count,
                record.objective,
                fmt_opt(record.score)
            ));
        }
        report.push_str("-".repeat(80).as_str());
        report.push('\n');

        let problems: Vec<&BatchRecord> = ranked.iter().copied().filter(|r| !r.feasible).collect();
        if !problems.is_empty() {
            report.push_str("\nFirst error per rejected pair:\n");
            for record in problems {
                report.push_str(&format!(
                    "  {}: {}\n",
                    record.instance,
                    record.message.as_deref().unwrap_or("-")
                ));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{SAMPLE_INSTANCE, VALID_SOLUTION};

    fn quiet() -> BatchConfig {
        BatchConfig {
            progress: false,
            ..Default::default()
        }
    }

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    /// a: feasible, b: missing solution, c: broken instance, d: infeasible
    fn populate(dir: &Path) {
        write(dir, "a.dat", SAMPLE_INSTANCE);
        write(dir, "Sol_a.dat", VALID_SOLUTION);
        write(dir, "b.dat", SAMPLE_INSTANCE);
        write(dir, "c.dat", "2 1 2\n");
        write(dir, "Sol_c.dat", VALID_SOLUTION);
        write(dir, "d.dat", SAMPLE_INSTANCE);
        write(dir, "Sol_d.dat", &VALID_SOLUTION.replacen("\n1\n1\n", "\n5\n1\n", 1));
        write(dir, "notes.txt", "ignored");
    }

    #[test]
    fn test_batch_config_default() {
        let config = BatchConfig::default();
        assert_eq!(config.penalty, 100_000.0);
        assert_eq!(config.solution_prefix, "Sol_");
        assert!(config.parallel);
    }

    #[test]
    fn test_discover_pairs() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());

        let pairs = discover_pairs(dir.path(), dir.path(), "Sol_").unwrap();
        let names: Vec<&str> = pairs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_eq!(pairs[0].solution, dir.path().join("Sol_a.dat"));
    }

    #[test]
    fn test_batch_never_aborts() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());

        for parallel in [true, false] {
            let mut runner = BatchRunner::new(BatchConfig { parallel, ..quiet() });
            runner.run(dir.path(), dir.path()).unwrap();

            let statuses: Vec<RecordStatus> = runner.records().iter().map(|r| r.status).collect();
            assert_eq!(
                statuses,
                vec![
                    RecordStatus::Feasible,
                    RecordStatus::MissingSolution,
                    RecordStatus::InstanceError,
                    RecordStatus::Infeasible
                ]
            );

            let records = runner.records();
            assert!(records[0].score.unwrap() > 0.0);
            assert!((records[0].objective - (records[0].total_distance.unwrap() + 10.0)).abs() < 1e-9);
            assert_eq!(records[1].objective, 100_000.0);
            assert_eq!(records[3].objective, 100_000.0);
            assert!(records[3].message.as_deref().unwrap().contains("used_vehicles"));
        }
    }

    #[test]
    fn test_summary_and_report() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());

        let mut runner = BatchRunner::new(quiet());
        runner.run(dir.path(), dir.path()).unwrap();

        let summary = runner.compute_summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.feasible, 1);
        assert_eq!(summary.infeasible, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.std_objective, Some(0.0));
        assert_eq!(summary.best_objective, summary.worst_objective);
        assert!(summary.total_objective > 300_000.0);

        let report = runner.generate_report();
        assert!(report.contains("MPVRP-CC Verification Report"));
        assert!(report.contains("1 feasible, 1 infeasible, 2 failed"));
        let first_row = report.lines().position(|l| l.starts_with("a ")).unwrap();
        let last_row = report.lines().position(|l| l.starts_with("d ")).unwrap();
        assert!(first_row < last_row);
    }

    #[test]
    fn test_export_csv() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());

        let mut runner = BatchRunner::new(quiet());
        runner.run(dir.path(), dir.path()).unwrap();

        let path = dir.path().join("results.csv");
        runner.export_to_csv(&path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "instance");
        assert_eq!(&headers[1], "status");
        let rows: Vec<BatchRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1].status, RecordStatus::MissingSolution);
    }

    #[test]
    fn test_empty_summary() {
        let runner = BatchRunner::new(quiet());
        let summary = runner.compute_summary();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.mean_objective, None);
        assert!(runner.generate_report().contains("Pairs: 0"));
    }
}

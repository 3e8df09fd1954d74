//! MPVRP-CC Verifier - Command Line Interface
//!
//! Verifies contest solutions, validates instances and evaluates whole
//! directories of submissions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mpvrp_verifier::batch::{BatchConfig, BatchRunner};
use mpvrp_verifier::config::{Severity, ValidationPolicy, VerifierConfig};
use mpvrp_verifier::instance::Instance;
use mpvrp_verifier::scoring::{score, QualityScore};
use mpvrp_verifier::solution::ParsedSolution;
use mpvrp_verifier::validation::validate;
use mpvrp_verifier::verifier::{verify, VerificationReport};

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "mpvrp-verifier")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "Verification engine for the multi-product VRP with changeover costs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a solution against its instance
    Verify {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,

        /// Path to the solution file
        #[arg(short, long)]
        solution: PathBuf,

        /// JSON file overriding tolerances
        #[arg(long)]
        config: Option<PathBuf>,

        /// Walk routes in parallel
        #[arg(long)]
        parallel: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Also compute the quality score
        #[arg(long)]
        score: bool,
    },

    /// Validate an instance
    Check {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,

        /// JSON file whose "validation" section sets the starting policy
        #[arg(long)]
        config: Option<PathBuf>,

        /// Require ids to be exactly 1..n
        #[arg(long)]
        strict_ids: bool,

        /// Treat changeover triangle inequality violations as errors
        #[arg(long)]
        triangle_errors: bool,

        /// Treat negative coordinates as errors
        #[arg(long)]
        negative_coordinates_errors: bool,

        /// Print instance statistics
        #[arg(short, long)]
        verbose: bool,
    },

    /// Verify every solution of a directory
    Batch {
        /// Directory containing instance files
        #[arg(short, long)]
        dir: PathBuf,

        /// Directory containing Sol_<instance>.dat files
        #[arg(short, long)]
        solutions: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Evaluate pairs one after another
        #[arg(long)]
        sequential: bool,

        /// JSON batch configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct VerifyOutput<'a> {
    feasible: bool,
    #[serde(flatten)]
    report: &'a VerificationReport,
    score: Option<QualityScore>,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let success = match cli.command {
        Commands::Verify { instance, solution, config, parallel, json, score } => {
            verify_solution(&instance, &solution, config.as_deref(), parallel, json, score)?
        }

        Commands::Check {
            instance,
            config,
            strict_ids,
            triangle_errors,
            negative_coordinates_errors,
            verbose,
        } => {
            let policy = check_policy(
                config.as_deref(),
                strict_ids,
                triangle_errors,
                negative_coordinates_errors,
            )?;
            check_instance(&instance, &policy, verbose)?
        }

        Commands::Batch { dir, solutions, output, sequential, config } => {
            run_batch(&dir, &solutions, output.as_deref(), sequential, config.as_deref())?
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

fn verify_solution(
    instance_path: &Path,
    solution_path: &Path,
    config_path: Option<&Path>,
    parallel: bool,
    json: bool,
    with_score: bool,
) -> Result<bool> {
    let mut config = match config_path {
        Some(path) => VerifierConfig::from_file(path).map_err(anyhow::Error::msg)?,
        None => VerifierConfig::default(),
    };
    config.parallel |= parallel;

    let instance = Instance::from_file(instance_path)
        .with_context(|| format!("Error loading instance {}", instance_path.display()))?;
    let text = std::fs::read_to_string(solution_path)
        .with_context(|| format!("Error reading solution {}", solution_path.display()))?;
    let solution = ParsedSolution::parse(&text, &instance.dims)
        .with_context(|| format!("Error parsing solution {}", solution_path.display()))?;

    let start = Instant::now();
    let report = verify(&instance, &solution, &config);
    let elapsed = start.elapsed().as_secs_f64();
    let quality = with_score.then(|| score(&instance, &solution, &report));

    if json {
        let output = VerifyOutput {
            feasible: report.is_feasible(),
            report: &report,
            score: quality,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("========== Verification ==========\n");
        println!("Instance: {}", instance_path.display());
        println!("Solution: {} ({} route(s))", solution_path.display(), solution.routes.len());
        println!("Engine: {} ({:.3}s declared)", solution.metrics.engine, solution.metrics.elapsed);
        let legacy = solution.routes.iter().filter(|r| r.uses_legacy_ids()).count();
        if legacy > 0 {
            println!("Routes using legacy node numbering: {}", legacy);
        }
        println!("\n{}", report);
        if let Some(quality) = &quality {
            println!("\n{}", quality);
        }
        println!("\nVerified in {:.4}s", elapsed);
    }

    Ok(report.is_feasible())
}

/// Policy of the `check` command: the config file's policy, tightened by the flags.
fn check_policy(
    config_path: Option<&Path>,
    strict_ids: bool,
    triangle_errors: bool,
    negative_coordinates_errors: bool,
) -> Result<ValidationPolicy> {
    let mut policy = match config_path {
        Some(path) => VerifierConfig::from_file(path).map_err(anyhow::Error::msg)?.validation,
        None => ValidationPolicy::default(),
    };
    if strict_ids {
        policy.contiguous_ids = true;
    }
    if triangle_errors {
        policy.triangle_inequality = Severity::Error;
    }
    if negative_coordinates_errors {
        policy.negative_coordinates = Severity::Error;
    }
    Ok(policy)
}

fn check_instance(path: &Path, policy: &ValidationPolicy, verbose: bool) -> Result<bool> {
    let instance = Instance::from_file(path)
        .with_context(|| format!("Error loading instance {}", path.display()))?;

    println!("========== Instance Check ==========\n");
    if verbose {
        println!("{}\n", instance.statistics());
    }

    let report = validate(&instance, policy);
    println!("{}", report);

    Ok(report.is_valid())
}

fn run_batch(
    dir: &Path,
    solutions: &Path,
    output: Option<&Path>,
    sequential: bool,
    config_path: Option<&Path>,
) -> Result<bool> {
    let mut config = match config_path {
        Some(path) => BatchConfig::from_file(path).map_err(anyhow::Error::msg)?,
        None => BatchConfig::default(),
    };
    if sequential {
        config.parallel = false;
    }

    println!("Verifying solutions of {:?} against {:?}...", solutions, dir);

    let mut runner = BatchRunner::new(config);
    runner
        .run(dir, solutions)
        .with_context(|| format!("Error listing {}", dir.display()))?;

    if runner.records().is_empty() {
        eprintln!("No instances found!");
        return Ok(false);
    }

    if let Some(path) = output {
        runner
            .export_to_csv(path)
            .with_context(|| format!("Failed to export results to {}", path.display()))?;
        println!("Results exported to {:?}", path);
    }

    println!("\n{}", runner.generate_report());
    Ok(true)
}

//! SegmentForge: Customer segmentation CLI using Gower distance and hierarchical clustering
//!
//! This is the main entrypoint that orchestrates data loading, fitting,
//! persistence, evaluation and prediction.

use anyhow::{Context, Result};
use clap::Parser;
use segmentforge::cli::{Command, EvaluateArgs, FitArgs, InspectArgs, PredictArgs};
use segmentforge::{
    evaluate_k_range, fit, load_training_rows, viz, Args, ComputationError, ErrorKind,
    PersistenceError, PipelineSnapshot, PreconditionError, SegmentError, ValidationError,
};
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    if args.verbose {
        println!("SegmentForge - Customer Segmentation using Gower Distance");
        println!("=========================================================\n");
    }

    let outcome = match args.command {
        Command::Fit(ref fit_args) => run_fit(&args, fit_args),
        Command::Predict(ref predict_args) => run_predict(predict_args),
        Command::Evaluate(ref evaluate_args) => run_evaluate(evaluate_args),
        Command::Inspect(ref inspect_args) => run_inspect(inspect_args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_status(&err))
        }
    }
}

/// `RUST_LOG` overrides the level chosen by `--verbose`
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

/// Distinct exit status per error family so callers can react without parsing text
fn exit_status(err: &anyhow::Error) -> u8 {
    match error_kind(err) {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::Precondition) => 3,
        Some(ErrorKind::Persistence) => 4,
        Some(ErrorKind::Computation) => 5,
        None => 1,
    }
}

/// Error family of `err`, whether or not it was raised through `SegmentError`
fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    if let Some(err) = err.downcast_ref::<SegmentError>() {
        Some(err.kind())
    } else if err.downcast_ref::<ValidationError>().is_some() {
        Some(ErrorKind::Validation)
    } else if err.downcast_ref::<PreconditionError>().is_some() {
        Some(ErrorKind::Precondition)
    } else if err.downcast_ref::<PersistenceError>().is_some() {
        Some(ErrorKind::Persistence)
    } else if err.downcast_ref::<ComputationError>().is_some() {
        Some(ErrorKind::Computation)
    } else {
        None
    }
}

/// Fit the full pipeline and write the snapshot
fn run_fit(args: &Args, fit_args: &FitArgs) -> Result<()> {
    println!("=== Fit Segmentation Pipeline ===\n");
    let start_time = Instant::now();
    let config = fit_args.config()?;

    // Step 1: Load data
    if args.verbose {
        println!("Step 1: Loading data");
        println!("  Input file: {}", fit_args.training.input);
    }
    let rows = load_training_rows(&fit_args.training.input)
        .with_context(|| format!("Failed to load {}", fit_args.training.input))?;
    println!("✓ Data loaded: {} customers", rows.len());

    // Step 2: Build the tree and cut it
    if args.verbose {
        println!("\nStep 2: Fitting hierarchical model");
        println!("  Segments: {}", config.k);
        println!("  Linkage: {}", config.linkage);
        println!("  Reference date: {}", config.reference_date);
        println!("  Normalization: {}", config.normalization);
    }
    let model_start = Instant::now();
    let snapshot = fit(&rows, &config)?;
    println!("✓ Model fitted successfully");
    if args.verbose {
        println!("  Fitting time: {:.2}s", model_start.elapsed().as_secs_f64());
    }

    // Step 3: Persist
    snapshot.save(&fit_args.output)?;
    println!("✓ Snapshot saved to: {}", fit_args.output);

    let summary = snapshot.summary()?;
    viz::print_segment_statistics(&summary);

    if let Some(ref plot) = fit_args.plot {
        viz::generate_visualization_report(&snapshot, plot)?;
    }

    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());

    Ok(())
}

/// Assign one customer with a saved snapshot
fn run_predict(predict_args: &PredictArgs) -> Result<()> {
    println!("=== Prediction Mode ===");
    let start_time = Instant::now();

    let record = predict_args.raw_record()?;
    let snapshot = PipelineSnapshot::load(&predict_args.model)?;
    let assignment = snapshot.assign(&record)?;

    println!("\n✓ Predicted Segment: {}", assignment.label);
    println!(
        "  Nearest training customer: #{} (distance {:.4})",
        assignment.nearest, assignment.distance
    );
    println!("  Processing time: {:.3}s", start_time.elapsed().as_secs_f64());

    let summary = snapshot.summary()?;
    if let Some(segment) = summary.segments.get(assignment.label - 1) {
        println!("\nSegment {} details:", segment.label);
        println!(
            "  Size: {} customers ({:.1}% of total)",
            segment.size,
            segment.size as f64 / summary.n as f64 * 100.0
        );
        println!(
            "  Typical member: {} / {} / {}, {:.0} days tenure",
            segment.dominant_tier,
            segment.dominant_gender,
            segment.dominant_location,
            segment.mean_tenure_days
        );
    }

    Ok(())
}

/// Score a range of segment counts on one tree
fn run_evaluate(evaluate_args: &EvaluateArgs) -> Result<()> {
    println!("=== Segment Count Evaluation ===\n");
    let config = evaluate_args.training.base_config()?;
    let k_range = evaluate_args.k_range()?;

    let rows = load_training_rows(&evaluate_args.training.input)
        .with_context(|| format!("Failed to load {}", evaluate_args.training.input))?;
    let scores = evaluate_k_range(&rows, &config, k_range)?;

    println!("   k | Silhouette | Sizes");
    println!("  ---|------------|------");
    for score in &scores {
        println!("  {:2} | {:10.4} | {:?}", score.k, score.silhouette, score.cluster_sizes);
    }
    if let Some(best) = scores
        .iter()
        .max_by(|a, b| a.silhouette.total_cmp(&b.silhouette))
    {
        println!("\nBest silhouette at k={} ({:.4})", best.k, best.silhouette);
    }

    Ok(())
}

/// Describe a saved snapshot
fn run_inspect(inspect_args: &InspectArgs) -> Result<()> {
    let snapshot = PipelineSnapshot::load(&inspect_args.model)?;
    match inspect_args.plot {
        Some(ref plot) => viz::generate_visualization_report(&snapshot, plot)?,
        None => viz::print_segment_statistics(&snapshot.summary()?),
    }
    Ok(())
}

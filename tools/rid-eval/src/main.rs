//! rid-eval: train and test Remote ID spoofing detectors on exported event logs.
//!
//! Usage:
//!   rid-eval evaluate --train data/train --test data/test --detector all -o results/
//!   rid-eval evaluate --test data/test --detector mlat --test-only --threshold mlat=250 --path-loss-exponent 2.0
//!   rid-eval synthetic --output data/demo --scenarios 4
//!
//! Log verbosity follows `RIDWATCH_LOG` (e.g. `RIDWATCH_LOG=ridwatch_detect=debug`).

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use glam::DVec3;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ridwatch_core::config::EvaluationConfig;
use ridwatch_core::enums::{DetectorKind, HostType};
use ridwatch_core::types::Position;
use ridwatch_detect::ExternalScores;
use ridwatch_eval::{EvaluationPipeline, EvaluationReport, OperatingPoint, TrainedModel};
use ridwatch_store::dataset::load_dataset;
use ridwatch_store::synthetic::{ScenarioBuilder, Track};

#[derive(Parser, Debug)]
#[command(name = "rid-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train thresholds on one dataset and report metrics on another.
    Evaluate(EvaluateArgs),
    /// Write a directory of synthetic scenario CSVs.
    Synthetic(SyntheticArgs),
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Training scenario directory.
    #[arg(long, value_name = "DIR", required_unless_present = "test_only")]
    train: Option<PathBuf>,

    /// Test scenario directory.
    #[arg(long, value_name = "DIR")]
    test: PathBuf,

    /// Detectors to run: kf, mlat, single, or all.
    #[arg(short, long, value_delimiter = ',', default_value = "all")]
    detector: Vec<String>,

    /// Output directory for JSON reports.
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// JSON configuration overriding the defaults.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Externally computed transmission scores (CSV).
    #[arg(long, value_name = "FILE")]
    external_scores: Option<PathBuf>,

    #[arg(long)]
    train_limit: Option<usize>,

    #[arg(long)]
    test_limit: Option<usize>,

    /// Aggregate per-event scores to one per transmission.
    #[arg(long)]
    transmission_level: bool,

    /// Pick the highest-recall threshold with at most this FPR instead of Youden's J.
    #[arg(long, value_name = "FPR")]
    target_fpr: Option<f64>,

    /// Skip training; use --threshold values.
    #[arg(long, requires = "threshold")]
    test_only: bool,

    /// Supplied threshold, e.g. `mlat=250`. Repeatable.
    #[arg(long, value_name = "DETECTOR=VALUE")]
    threshold: Vec<String>,

    /// Path-loss exponent for multilateration in test-only mode.
    #[arg(long, default_value_t = 2.0)]
    path_loss_exponent: f64,
}

#[derive(Args, Debug)]
struct SyntheticArgs {
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    #[arg(long, default_value_t = 4)]
    scenarios: u64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// RSSI noise standard deviation (dB).
    #[arg(long, default_value_t = 1.0)]
    noise_db: f64,
}

fn main() -> ExitCode {
    init_logging();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("RIDWATCH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Evaluate(args) => cmd_evaluate(args),
        Command::Synthetic(args) => cmd_synthetic(args),
    }
}

fn parse_detectors(names: &[String]) -> Result<Vec<DetectorKind>> {
    let mut kinds = Vec::new();
    for name in names {
        if name == "all" {
            kinds.extend([
                DetectorKind::KalmanPower,
                DetectorKind::Multilateration,
                DetectorKind::SingleSample,
            ]);
            continue;
        }
        match DetectorKind::parse(name) {
            Some(DetectorKind::External) => {
                bail!("use --external-scores to add external scores")
            }
            Some(kind) => kinds.push(kind),
            None => bail!("unknown detector '{name}' (expected kf, mlat, single, or all)"),
        }
    }
    Ok(kinds)
}

fn parse_thresholds(raw: &[String]) -> Result<Vec<(DetectorKind, f64)>> {
    raw.iter()
        .map(|entry| {
            let (name, value) = entry
                .split_once('=')
                .with_context(|| format!("threshold '{entry}' is not DETECTOR=VALUE"))?;
            let kind = DetectorKind::parse(name.trim())
                .with_context(|| format!("unknown detector '{name}' in --threshold"))?;
            let value: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("threshold '{entry}' is not a number"))?;
            Ok((kind, value))
        })
        .collect()
}

fn cmd_evaluate(args: EvaluateArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => EvaluationConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EvaluationConfig::default(),
    };
    if args.train_limit.is_some() {
        config.train_limit = args.train_limit;
    }
    if args.test_limit.is_some() {
        config.test_limit = args.test_limit;
    }
    config.transmission_level |= args.transmission_level;

    let detectors = parse_detectors(&args.detector)?;
    let mut pipeline = EvaluationPipeline::new(config.clone(), &detectors)
        .context("invalid evaluation configuration")?;
    if let Some(path) = &args.external_scores {
        let scores = ExternalScores::load(path)
            .with_context(|| format!("failed to load external scores {}", path.display()))?;
        pipeline = pipeline.with_external_scores(scores);
    }
    if let Some(fpr) = args.target_fpr {
        pipeline = pipeline.with_operating_point(OperatingPoint::TargetFpr(fpr));
    }

    let test = load_dataset(&args.test, config.test_limit)
        .with_context(|| format!("failed to load test set {}", args.test.display()))?;

    let report = if args.test_only {
        let thresholds = parse_thresholds(&args.threshold)?;
        let model = TrainedModel::from_thresholds(&thresholds, Some(args.path_loss_exponent));
        pipeline.evaluate(&model, &test).context("evaluation failed")?
    } else {
        let train_dir = args
            .train
            .as_deref()
            .context("--train is required unless --test-only is given")?;
        let train = load_dataset(train_dir, config.train_limit)
            .with_context(|| format!("failed to load training set {}", train_dir.display()))?;
        pipeline.run(&train, &test).context("evaluation failed")?
    };

    print_summary(&report);
    if let Some(dir) = &args.output {
        write_report(&report, dir)?;
    }
    Ok(())
}

fn print_summary(report: &EvaluationReport) {
    println!();
    print!("{}", report.comparison_table());
    for d in &report.detectors {
        let tally = &d.test.tally;
        let skipped: Vec<String> = tally
            .skipped
            .iter()
            .map(|(reason, count)| format!("{reason}: {count}"))
            .collect();
        println!(
            "{:<10} scored {} | skipped {} [{}] | dropped rows {}",
            d.name,
            tally.scored,
            tally.skipped_total(),
            skipped.join(", "),
            d.test.load.dropped_total()
        );
    }
}

fn write_report(report: &EvaluationReport, dir: &Path) -> Result<()> {
    let written = report
        .write_dir(dir)
        .with_context(|| format!("failed to write reports to {}", dir.display()))?;
    for path in written {
        info!(path = %path.display(), "wrote report");
    }
    Ok(())
}

fn cmd_synthetic(args: SyntheticArgs) -> Result<()> {
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;

    for i in 0..args.scenarios {
        let seed = args.seed.wrapping_add(i);
        let name = format!("scenario_{i:03}.csv");
        let mut builder = ScenarioBuilder::new(&name, seed).with_rssi_noise(args.noise_db)?;
        builder
            .receiver(1, Position::new(0.0, 0.0, 2.0), HostType::Federate)
            .receiver(2, Position::new(500.0, 0.0, 15.0), HostType::Federate)
            .receiver(3, Position::new(0.0, 500.0, 30.0), HostType::Federate)
            .receiver(4, Position::new(500.0, 500.0, 60.0), HostType::Federate)
            .receiver(5, Position::new(250.0, 250.0, 5.0), HostType::Benign);

        let offset = 200.0 + 100.0 * (i % 5) as f64;
        builder
            .track(Track {
                serial_number: 100,
                start: Position::new(100.0, 150.0, 40.0),
                velocity: DVec3::new(6.0, 2.0, 0.0),
                tx_power_dbm: 14.0,
                start_ms: 0,
                period_ms: 1000,
                count: 60,
                spoof_offset: None,
            })
            .track(Track {
                serial_number: 101,
                start: Position::new(400.0, 300.0, 35.0),
                velocity: DVec3::new(-4.0, 3.0, 0.0),
                tx_power_dbm: 10.0,
                start_ms: 250,
                period_ms: 1000,
                count: 60,
                spoof_offset: None,
            })
            .track(Track {
                serial_number: 200,
                start: Position::new(250.0, 100.0, 50.0),
                velocity: DVec3::new(0.0, 5.0, 0.0),
                tx_power_dbm: 14.0,
                start_ms: 10_000,
                period_ms: 1000,
                count: 40,
                spoof_offset: Some(DVec3::new(offset, 0.0, 0.0)),
            });

        let path = args.output.join(&name);
        builder
            .write_csv(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), spoof_offset_m = offset, "wrote scenario");
    }
    Ok(())
}

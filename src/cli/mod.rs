//! mathscore CLI Module
//!
//! Command-line interface for training the model catalog, scoring a student and
//! listing the search spaces.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::pipeline::{
    PredictPipeline, StudentRecord, TrainPipeline, DEFAULT_MODEL_PATH, DEFAULT_PREPROCESSOR_PATH,
};
use crate::training::{ModelCatalog, TrainerConfig};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "mathscore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Predict student math scores from a catalog of tuned regressors")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train every catalog regressor and persist the best one
    Train {
        /// Student performance CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Trainer configuration (JSON); flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where to write the model artifact
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Where to write the fitted preprocessor
        #[arg(long, default_value = DEFAULT_PREPROCESSOR_PATH)]
        preprocessor: PathBuf,

        /// Minimum test R² required to persist a model
        #[arg(long)]
        min_score: Option<f64>,

        /// Number of cross-validation folds
        #[arg(long)]
        cv_folds: Option<usize>,

        /// Evaluate catalog entries in parallel
        #[arg(long)]
        parallel: bool,

        /// Fraction of rows held out for the test score
        #[arg(long, default_value = "0.2")]
        test_ratio: f64,

        /// Seed for the train/test split
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Predict the math score of one student
    Predict {
        /// Model artifact
        #[arg(short, long, default_value = DEFAULT_MODEL_PATH)]
        model: PathBuf,

        /// Fitted preprocessor
        #[arg(long, default_value = DEFAULT_PREPROCESSOR_PATH)]
        preprocessor: PathBuf,

        #[arg(long)]
        gender: String,

        #[arg(long)]
        race_ethnicity: String,

        #[arg(long)]
        parental_level_of_education: String,

        #[arg(long)]
        lunch: String,

        #[arg(long)]
        test_preparation_course: String,

        #[arg(long)]
        reading_score: f64,

        #[arg(long)]
        writing_score: f64,
    },

    /// List the regressors and their hyperparameter grids
    Catalog,
}

// ─── Commands ──────────────────────────────────────────────────────────────────

/// Options of the `train` subcommand
pub struct TrainArgs<'a> {
    pub data: &'a Path,
    pub config: Option<&'a Path>,
    pub output: Option<&'a Path>,
    pub preprocessor: &'a Path,
    pub min_score: Option<f64>,
    pub cv_folds: Option<usize>,
    pub parallel: bool,
    pub test_ratio: f64,
    pub seed: u64,
}

pub fn cmd_train(args: TrainArgs<'_>) -> anyhow::Result<()> {
    section("Train");

    let mut config = match args.config {
        Some(path) => TrainerConfig::from_json_file(path)?,
        None => TrainerConfig::default(),
    };
    if let Some(output) = args.output {
        config = config.with_artifact_path(output);
    }
    if let Some(min_score) = args.min_score {
        config = config.with_min_score(min_score);
    }
    if let Some(folds) = args.cv_folds {
        config = config.with_cv(folds);
    }
    if args.parallel {
        config = config.with_parallel(true);
    }
    config.validate()?;

    let artifact_path = config.artifact_path.clone();
    let threshold = config.min_score;
    let pipeline = TrainPipeline::new(config)
        .with_preprocessor_path(args.preprocessor)
        .with_test_ratio(args.test_ratio)
        .with_split_seed(args.seed);

    step_run(&format!("Training on {}", args.data.display().to_string().cyan()));
    let start = Instant::now();
    let outcome = pipeline.run(args.data)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    println!();
    println!(
        "  {:<26} {:>10} {:>10} {:>10}",
        muted("Model"), muted("Test R²"), muted("CV R²"), muted("RMSE")
    );
    println!("  {}", dim(&"─".repeat(59)));
    for evaluation in outcome.report.evaluations() {
        let cv = evaluation
            .cv_score
            .map(|s| format!("{:.4}", s))
            .unwrap_or_else(|| "-".to_string());
        let marker = if evaluation.name == outcome.model_name { ok("✓") } else { " ".normal() };
        println!(
            "{} {:<26} {:>10.4} {:>10} {:>10.3}",
            marker, evaluation.name, evaluation.score, cv, evaluation.metrics.rmse
        );
    }
    println!("  {}", dim(&"─".repeat(59)));

    println!();
    println!("  {:<16} {}", muted("Best"), outcome.model_name.white().bold());
    println!("  {:<16} {}", muted("R²"), format!("{:.4}", outcome.score).white().bold());
    println!("  {:<16} {}", muted("Threshold"), format!("{:.2}", threshold).white());
    println!("  {:<16} {} / {}", muted("Rows"), outcome.n_train, outcome.n_test);
    println!("  {:<16} {}", muted("Artifact"), artifact_path.display());
    println!();

    Ok(())
}

pub fn cmd_predict(model: &Path, preprocessor: &Path, record: StudentRecord) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading model");
    let pipeline = PredictPipeline::load(model, preprocessor)?;
    step_done(pipeline.model_name());

    let prediction = pipeline.predict(std::slice::from_ref(&record))?;
    let score = prediction.first().copied().unwrap_or(f64::NAN);

    println!();
    println!("  {:<16} {}", muted("Math score"), format!("{:.2}", score).white().bold());
    println!();
    Ok(())
}

pub fn cmd_catalog(random_state: u64) -> anyhow::Result<()> {
    section("Catalog");

    let catalog = ModelCatalog::default_regressors(random_state);
    println!("  {:<26} {:>10}  {}", muted("Model"), muted("Candidates"), muted("Grid"));
    println!("  {}", dim(&"─".repeat(56)));
    for entry in catalog.entries() {
        println!(
            "  {:<26} {:>10}  {}",
            entry.name,
            entry.grid.n_candidates(),
            dim(&entry.grid.to_string())
        );
    }
    println!();
    Ok(())
}

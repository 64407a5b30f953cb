#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;

use glyco::config::PipelineConfig;
use glyco::health::run_checks;
use glyco::logging;
use glyco::pipeline;
use glyco::preprocess::ImputationScope;
use glyco::service::{PatientRecord, RiskService};
use glyco::summary::summarize;
use glyco::triage::{health_tips, input_warnings, patient_summary, validate_medical_ranges};

#[derive(Clone, ValueEnum)]
pub enum ImputationScopeCli {
    /// Medians over the whole dataset, before splitting
    Dataset,
    /// Medians over the training partition only
    TrainingSplit,
}

impl From<ImputationScopeCli> for ImputationScope {
    fn from(scope: ImputationScopeCli) -> Self {
        match scope {
            ImputationScopeCli::Dataset => ImputationScope::Dataset,
            ImputationScopeCli::TrainingSplit => ImputationScope::TrainingSplit,
        }
    }
}

#[derive(Args)]
pub struct TrainArgs {
    /// Seed for the stratified train/test split
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fraction of rows held out for testing
    #[arg(long, value_name = "FRACTION")]
    pub test_fraction: Option<f64>,

    /// Number of stratified cross-validation folds
    #[arg(long, value_name = "K")]
    pub cv_folds: Option<usize>,

    /// Inverse L2 regularization strength
    #[arg(short = 'C', long, value_name = "C")]
    pub inverse_regularization: Option<f64>,

    /// Iteration cap for the BFGS solver
    #[arg(long, value_name = "N")]
    pub max_iterations: Option<usize>,

    /// Gradient tolerance for the BFGS solver
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Rows used to compute imputation medians
    #[arg(long, value_enum)]
    pub imputation_scope: Option<ImputationScopeCli>,

    /// Print the training report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PredictArgs {
    #[arg(long, default_value = "1")]
    pub pregnancies: f64,

    /// Plasma glucose concentration (mg/dL)
    #[arg(long, default_value = "120")]
    pub glucose: f64,

    /// Diastolic blood pressure (mmHg)
    #[arg(long, default_value = "80")]
    pub blood_pressure: f64,

    /// Triceps skinfold thickness (mm)
    #[arg(long, default_value = "20")]
    pub skin_thickness: f64,

    /// Two-hour serum insulin (mu U/ml)
    #[arg(long, default_value = "80")]
    pub insulin: f64,

    #[arg(long, default_value = "25")]
    pub bmi: f64,

    #[arg(long, default_value = "0.5")]
    pub diabetes_pedigree: f64,

    #[arg(long, default_value = "30")]
    pub age: f64,

    /// Train and save a model first if no artifacts exist
    #[arg(long)]
    pub train_if_missing: bool,

    /// Print the prediction as JSON
    #[arg(long)]
    pub json: bool,
}

impl PredictArgs {
    fn record(&self) -> PatientRecord {
        PatientRecord {
            pregnancies: self.pregnancies,
            glucose: self.glucose,
            blood_pressure: self.blood_pressure,
            skin_thickness: self.skin_thickness,
            insulin: self.insulin,
            bmi: self.bmi,
            diabetes_pedigree: self.diabetes_pedigree,
            age: self.age,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "glyco",
    about = "Diabetes risk classifier",
    long_about = "Trains an L2-regularized logistic regression on the Pima diabetes dataset, \
                 persists it with backups, and scores individual patients."
)]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Dataset CSV (overrides the configuration)
    #[arg(long, global = true, value_name = "PATH")]
    dataset: Option<PathBuf>,

    /// Directory holding the model artifacts (overrides the configuration)
    #[arg(long, global = true, value_name = "DIR")]
    artifact_dir: Option<PathBuf>,

    /// off, error, warn, info, debug or trace
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Append log lines to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Train, evaluate and save the classifier
    #[command(about = "Train the classifier (outputs: logistic_model.toml, scaler.toml)")]
    Train(TrainArgs),

    /// Score a single patient
    #[command(about = "Predict diabetes risk for one patient")]
    Predict(PredictArgs),

    /// Print the saved coefficients by magnitude
    #[command(about = "Show feature importance of the saved classifier")]
    Importance,

    /// Describe the raw dataset
    #[command(about = "Summarize the dataset")]
    Summary,

    /// Check dataset and artifacts
    #[command(about = "Run readiness checks (exit status 1 on failure)")]
    Check,
}

fn main() {
    let cli = Cli::parse();
    let Cli {
        config,
        dataset,
        artifact_dir,
        log_level,
        log_file,
        command,
    } = cli;

    let Some(command) = command else {
        if let Err(e) = Cli::command().print_help() {
            eprintln!("Error: {e}");
            process::exit(1);
        }
        println!();
        return;
    };

    let result = load_config(config, dataset, artifact_dir, log_level, log_file).and_then(
        |config| {
            logging::init(&config.logging)?;
            match command {
                Commands::Train(args) => train(config, args),
                Commands::Predict(args) => predict(config, args),
                Commands::Importance => importance(config),
                Commands::Summary => summary(config),
                Commands::Check => check(config),
            }
        },
    );

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn load_config(
    path: Option<PathBuf>,
    dataset: Option<PathBuf>,
    artifact_dir: Option<PathBuf>,
    log_level: Option<String>,
    log_file: Option<PathBuf>,
) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = PipelineConfig::load(path.as_deref())?;
    if let Some(dataset) = dataset {
        config.dataset = dataset;
    }
    if let Some(dir) = artifact_dir {
        config.artifacts.dir = dir;
    }
    if let Some(level) = log_level {
        config.logging.level = level;
    }
    if log_file.is_some() {
        config.logging.file = log_file;
    }
    config.validate()?;
    Ok(config)
}

fn train(mut config: PipelineConfig, args: TrainArgs) -> Result<(), Box<dyn std::error::Error>> {
    let training = &mut config.training;
    if let Some(seed) = args.seed {
        training.seed = seed;
    }
    if let Some(fraction) = args.test_fraction {
        training.test_fraction = fraction;
    }
    if let Some(folds) = args.cv_folds {
        training.cv_folds = folds;
    }
    if let Some(c) = args.inverse_regularization {
        training.inverse_regularization = c;
    }
    if let Some(n) = args.max_iterations {
        training.max_iterations = n;
    }
    if let Some(tol) = args.tolerance {
        training.tolerance = tol;
    }
    if let Some(scope) = args.imputation_scope {
        training.imputation_scope = scope.into();
    }
    config.validate()?;

    println!("Loading training data from: {}", config.dataset.display());
    let (report, saved) = pipeline::run(&config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    println!("Model saved to: {}", saved.model_path.display());
    println!("Scaler saved to: {}", saved.preprocessor_path.display());
    for backup in &saved.backups {
        println!("Previous artifact backed up to: {}", backup.display());
    }
    Ok(())
}

fn predict(config: PipelineConfig, args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let record = args.record();
    let service = RiskService::new(config);
    let prediction = if args.train_if_missing {
        service.predict_or_train(&record)?
    } else {
        service.predict(&record)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&prediction)?);
        return Ok(());
    }

    let outcome = if prediction.label == 1 {
        "Diabetes"
    } else {
        "No Diabetes"
    };
    println!("Prediction: {outcome}");
    println!("Probability of diabetes: {:.3}", prediction.probability);
    println!("Risk level: {}", prediction.band);
    println!("Confidence: {}", prediction.confidence);
    println!();
    println!("{}", prediction.band.headline());
    for line in prediction.band.recommendations() {
        println!("  - {line}");
    }

    let warnings: Vec<String> = validate_medical_ranges(&record)
        .into_iter()
        .chain(input_warnings(&record))
        .collect();
    if !warnings.is_empty() {
        println!();
        println!("Input warnings:");
        for w in &warnings {
            println!("  - {w}");
        }
    }

    let tips = health_tips(&record, prediction.probability);
    if !tips.is_empty() {
        println!();
        println!("Health tips:");
        for tip in tips {
            println!("  - {tip}");
        }
    }

    println!();
    println!("{}", patient_summary(&record));
    Ok(())
}

fn importance(config: PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let service = RiskService::new(config);
    let weights = service.feature_importance()?;
    println!("{:<26} {:>12} {:>12}", "Feature", "Coefficient", "Importance");
    for w in &weights {
        println!(
            "{:<26} {:>12.4} {:>12.4}",
            w.feature,
            w.coefficient,
            w.importance()
        );
    }
    Ok(())
}

fn summary(config: PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let service = RiskService::new(config);
    let dataset = service.dataset()?;
    println!("{}", summarize(&dataset));
    Ok(())
}

fn check(config: PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let report = run_checks(&config);
    println!("{report}");
    if report.passed() {
        Ok(())
    } else {
        Err("readiness checks failed".into())
    }
}

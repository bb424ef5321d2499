mod handlers;
mod render;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use churn_io::{CsvPredictionLog, LogFilter, ResultWriter};
use churn_model::{prepare, PrepareConfig, Trainer, TrainerConfig};
use churn_rf::RandomForestConfig;

use handlers::{AppContext, FormInput, Rendered};

#[derive(Parser)]
#[command(name = "churn")]
#[command(about = "Customer churn prediction: train, predict, and review logged predictions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the model artifact
    #[arg(long, default_value = "models/churn_model.bin", global = true)]
    model: PathBuf,

    /// Path to the prediction log CSV
    #[arg(long, default_value = "logs/predictions.csv", global = true)]
    log: PathBuf,

    /// RNG seed for the holdout split and the forest
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Prepare a customer CSV, train a random forest, and save the model
    Train {
        /// Path to the training CSV (customerID, features, Churn)
        #[arg(long)]
        data: PathBuf,

        /// Number of trees in the Random Forest
        #[arg(long, default_value_t = 100)]
        n_trees: usize,

        /// Fraction of rows held out for evaluation
        #[arg(long, default_value_t = 0.2)]
        test_fraction: f64,
    },

    /// Predict churn for one customer entered as flags
    Predict {
        #[command(flatten)]
        form: FormInput,
    },

    /// Predict churn for every row of a CSV upload
    Batch {
        /// Path to the CSV with all feature columns
        #[arg(long)]
        input: PathBuf,

        /// Where to save the results CSV
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show logged predictions
    History {
        /// Only this predicted class
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
        prediction: Option<u8>,

        /// Only entries with at least this churn probability
        #[arg(long)]
        min_probability: Option<f64>,

        /// Only entries logged at or after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Only entries logged at or before this RFC 3339 time
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        /// Save the filtered log as CSV
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

/// Print a rendered response; downloads go to `save_to` when given.
fn emit(rendered: Rendered, save_to: Option<&Path>) -> Result<ExitCode> {
    match rendered {
        Rendered::Success { body, download } => {
            print!("{body}");
            if let (Some(path), Some(download)) = (save_to, download) {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create {}", parent.display()))?;
                }
                std::fs::write(path, &download.bytes)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!(path = %path.display(), file = %download.file_name, "download saved");
            }
            Ok(ExitCode::SUCCESS)
        }
        Rendered::Error { message } => {
            eprintln!("error: {message}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Configure Rayon thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    let ctx = AppContext::new(&cli.model, CsvPredictionLog::new(&cli.log));

    match cli.command {
        Command::Train {
            data,
            n_trees,
            test_fraction,
        } => {
            let prepared = prepare(&data, &PrepareConfig::default())
                .context("failed to prepare training data")?;

            let forest = RandomForestConfig::new(n_trees)?.with_seed(cli.seed);
            let config = TrainerConfig::new(forest)
                .with_test_fraction(test_fraction)?
                .with_seed(cli.seed);
            let outcome = Trainer::new(config)
                .train(&prepared)
                .context("training failed")?;

            outcome
                .artifact
                .save(&cli.model)
                .context("failed to save model")?;

            let stem = cli
                .model
                .file_stem()
                .map_or_else(|| "churn_model".into(), |s| s.to_string_lossy());
            let report_name = PathBuf::from(format!("{stem}_report.json"));
            let report_path = ResultWriter::for_file(&cli.model)?
                .write_json(&report_name, &outcome.summary())?;

            print!("{}", render::training(&outcome));
            println!("\nModel saved to {}", cli.model.display());
            println!("Report saved to {}", report_path.display());
            Ok(ExitCode::SUCCESS)
        }

        Command::Predict { form } => {
            let rendered = handlers::handle_form_submission(&ctx, &form, Utc::now())
                .context("prediction failed")?;
            emit(rendered, None)
        }

        Command::Batch { input, output } => {
            let content = std::fs::read(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let upload_name = input.display().to_string();
            let rendered = handlers::handle_batch_upload(&ctx, &upload_name, &content, Utc::now())
                .context("batch prediction failed")?;
            emit(rendered, output.as_deref())
        }

        Command::History {
            prediction,
            min_probability,
            since,
            until,
            export,
        } => {
            let mut filter = LogFilter::new();
            if let Some(p) = prediction {
                filter = filter.with_prediction(p);
            }
            if let Some(p) = min_probability {
                filter = filter.with_min_probability(p);
            }
            if let Some(t) = since {
                filter = filter.with_since(t);
            }
            if let Some(t) = until {
                filter = filter.with_until(t);
            }
            let rendered = handlers::handle_history(&ctx, &filter)
                .context("failed to read prediction log")?;
            emit(rendered, export.as_deref())
        }
    }
}

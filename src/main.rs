//! mathscore - Main Entry Point
//!
//! Trains the regressor catalog on student performance data and scores new students.

use clap::Parser;
use mathscore::cli::{cmd_catalog, cmd_predict, cmd_train, Cli, Commands, TrainArgs};
use mathscore::pipeline::StudentRecord;
use mathscore::training::TrainerConfig;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mathscore=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            data,
            config,
            output,
            preprocessor,
            min_score,
            cv_folds,
            parallel,
            test_ratio,
            seed,
        } => {
            cmd_train(TrainArgs {
                data: &data,
                config: config.as_deref(),
                output: output.as_deref(),
                preprocessor: &preprocessor,
                min_score,
                cv_folds,
                parallel,
                test_ratio,
                seed,
            })?;
        }
        Commands::Predict {
            model,
            preprocessor,
            gender,
            race_ethnicity,
            parental_level_of_education,
            lunch,
            test_preparation_course,
            reading_score,
            writing_score,
        } => {
            let record = StudentRecord {
                gender,
                race_ethnicity,
                parental_level_of_education,
                lunch,
                test_preparation_course,
                reading_score,
                writing_score,
            };
            cmd_predict(&model, &preprocessor, record)?;
        }
        Commands::Catalog => {
            cmd_catalog(TrainerConfig::default().random_state)?;
        }
    }

    Ok(())
}

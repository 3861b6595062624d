//! churnflow - Main Entry Point
//!
//! Command-line front end for the churn training and scoring pipeline.

use clap::Parser;
use churnflow::cli::{cmd_info, cmd_predict, cmd_process, cmd_score, cmd_train, show_help, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "churnflow=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Process { data, output }) => {
            cmd_process(&data, &output)?;
        }
        Some(Commands::Train(args)) => {
            cmd_train(&args)?;
        }
        Some(Commands::Predict { artifact, features, features_file }) => {
            cmd_predict(&artifact, features.as_deref(), features_file.as_deref())?;
        }
        Some(Commands::Score { artifact, data, output }) => {
            cmd_score(&artifact, &data, &output)?;
        }
        Some(Commands::Info { artifact }) => {
            cmd_info(&artifact)?;
        }
        None => show_help(),
    }

    Ok(())
}

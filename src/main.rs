//! Stackcast - Main Entry Point

use clap::Parser;
use stackcast::cli::{cmd_features, cmd_plan, cmd_run, cmd_targets, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stackcast=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { data, config, output, target, parallel, folds, aux_dir } => {
            cmd_run(
                &data,
                config.as_deref(),
                &output,
                &target,
                parallel,
                folds,
                aux_dir.as_deref(),
            )?;
        }
        Commands::Plan { data, config } => {
            cmd_plan(&data, config.as_deref())?;
        }
        Commands::Features { config, target } => {
            cmd_features(config.as_deref(), &target)?;
        }
        Commands::Targets { config, json } => {
            cmd_targets(config.as_deref(), json)?;
        }
    }

    Ok(())
}

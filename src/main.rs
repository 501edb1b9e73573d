mod cli;
mod commands;
mod output;

use bringup::Error as BringupError;
use clap::Parser;
use cli::{Cli, Commands};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(err) = e.downcast_ref::<BringupError>() {
            eprintln!("Error: {}", err);
            if let Some(suggestion) = err.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let out = output::CliOutput;
    match cli.command {
        Commands::Validate => commands::run_validate(cli.config, cli.workdir, &out),
        Commands::Order { json } => {
            let loaded = commands::load_config(cli.config, cli.workdir)?;
            commands::run_order(&loaded, json, &out)
        }
        Commands::Check { units } => {
            let loaded = commands::load_config(cli.config, cli.workdir)?;
            commands::run_check(&loaded, &units, &out).await
        }
        Commands::Up {
            units,
            sequential,
            json,
        } => {
            let loaded = commands::load_config(cli.config, cli.workdir)?;

            let cancellation_token = CancellationToken::new();
            let on_interrupt = cancellation_token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, waiting for units in flight to finish");
                    on_interrupt.cancel();
                }
            });

            commands::run_up(loaded, &units, sequential, json, cancellation_token, &out).await
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

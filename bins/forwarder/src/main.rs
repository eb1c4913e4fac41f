mod cmd;
mod config;
mod error;

use clap::Parser;
use cmd::Exit;
use config::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Forward(args) => cmd::forward::run(args).await,
        Commands::Publish(args) => cmd::publish::run(args).await,
        Commands::Provision(args) => cmd::provision::run(args).await,
        Commands::Demo(args) => cmd::demo::run(args).await,
    };
    match result {
        Ok(Exit::Success) => {}
        // Прогон не довёл запись до commit'а: планировщик может перезапустить.
        Ok(Exit::Incomplete) => std::process::exit(2),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

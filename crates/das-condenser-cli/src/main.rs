//! `das-condense` entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use das_condenser_cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Condense(args) => commands::condense(args)?,
        Commands::Inspect(args) => commands::inspect(args)?,
        Commands::InitConfig(args) => commands::init_config(args)?,
        Commands::Version => {
            println!("das-condense {}", env!("CARGO_PKG_VERSION"));
            println!("das-condenser library {}", das_condenser::VERSION);
        }
    }

    Ok(())
}

use anyhow::Result;
use audioscribe::{
    app,
    cli::{handle_sweep_command, Cli, CliCommand},
    config::Config,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("audioscribe {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Sweep(args)) => {
            handle_sweep_command(cli.config.as_deref(), args).await?;
            return Ok(());
        }
        Some(CliCommand::Serve) | None => {}
    }

    let config = Config::load(cli.config.as_deref())?;
    app::run_service(config).await
}

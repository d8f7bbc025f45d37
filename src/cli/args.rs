use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "audioscribe")]
#[command(about = "Queued audio/video transcription service", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the HTTP service, transcription worker and cleanup scheduler (default)
    Serve,
    /// Run one retention sweep over the managed directories and exit
    Sweep(SweepCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug, Default)]
pub struct SweepCliArgs {
    /// Override the configured retention window
    #[arg(long, value_name = "DAYS")]
    pub retention_days: Option<u32>,
}

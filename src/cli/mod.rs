pub mod args;
pub mod sweep;

pub use args::{Cli, CliCommand, SweepCliArgs};
pub use sweep::handle_sweep_command;

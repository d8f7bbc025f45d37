//! CLI handler for a one-off retention sweep.

use crate::cleanup::RetentionSweep;
use crate::config::Config;
use anyhow::{bail, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::args::SweepCliArgs;

pub async fn handle_sweep_command(config_path: Option<&Path>, args: SweepCliArgs) -> Result<()> {
    let config = Config::load(config_path)?;
    let retention_days = args
        .retention_days
        .unwrap_or(config.cleanup.retention_days);
    if retention_days == 0 {
        bail!("--retention-days must be at least 1");
    }

    let dirs = config.storage.resolve()?;
    let targets = dirs.all().iter().map(|d| d.to_path_buf()).collect();
    let sweep = RetentionSweep::new(targets, retention_days);

    let report = tokio::task::spawn_blocking(move || sweep.run_blocking(&CancellationToken::new()))
        .await??;

    println!("Retention: {} day(s)", retention_days);
    for dir in dirs.all() {
        println!("  {}", dir.display());
    }
    println!(
        "Deleted {} file(s), freed {:.2} MB, removed {} empty director(ies)",
        report.deleted_files,
        report.freed_megabytes(),
        report.removed_dirs
    );
    if report.failures > 0 {
        println!("{} entries could not be removed (see log)", report.failures);
    }

    Ok(())
}

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio_util::sync::CancellationToken;

pub enum RunOutcome {
    Exited(Output),
    /// Shutdown was requested; the child was asked to terminate.
    Cancelled,
}

/// Runs the transcriber to completion with stdout/stderr captured.
///
/// On cancellation the wait is abandoned and `kill_on_drop` sends the child
/// a kill request.
pub async fn run_transcriber(
    executable: &Path,
    args: &[OsString],
    working_dir: &Path,
    cancel: &CancellationToken,
) -> Result<RunOutcome> {
    let child = tokio::process::Command::new(executable)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start transcriber {:?}", executable))?;

    tokio::select! {
        output = child.wait_with_output() => {
            let output = output.context("Failed to wait for transcriber")?;
            Ok(RunOutcome::Exited(output))
        }
        _ = cancel.cancelled() => Ok(RunOutcome::Cancelled),
    }
}

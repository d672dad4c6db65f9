//! Bounded execution of external measurement tools.

use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::ProbeError;

/// Run `program` with `args`, killing it if it outlives `limit`
///
/// A missing or non-executable program maps to
/// [`ProbeError::ResourceUnavailable`]. A non-zero exit status is not an
/// error here; callers interpret the output.
pub async fn run_command(program: &str, args: &[String], limit: Duration) -> Result<Output, ProbeError> {
    debug!(program, ?args, "Executing");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(limit, child).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) => Err(ProbeError::from_io(err, program)),
        Err(_) => Err(ProbeError::Timeout(limit)),
    }
}

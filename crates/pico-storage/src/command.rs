//! Shell command execution for remote storage transports.

use std::process::Command;

use pico_core::{Error, Result};

/// Run a shell command, returning stdout. A non-zero exit raises the storage
/// error kind with the failing command echoed.
pub fn run(cmd: &str) -> Result<String> {
    tracing::debug!(cmd, "storage command");
    let output = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .map_err(|e| Error::storage(cmd, e.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::storage(cmd, format!("exit {}: {}", output.status, stderr.trim())));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a shell command, reporting only success or failure.
pub fn succeeds(cmd: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

//! Dataset catalogue queries.
//!
//! Samples name their inputs by catalogue ("DAS") paths; the client shells
//! out to `dasgoclient`. A storage-backed listing is available for samples
//! kept outside the catalogue.

use std::process::Command;

use pico_core::{Error, Result};

/// A dataset catalogue: resolves a dataset path to file URLs and event
/// counts.
pub trait Catalogue {
    /// File URLs of a dataset.
    fn files(&self, dataset: &str, instance: &str) -> Result<Vec<String>>;
    /// Total event count of a dataset.
    fn nevents(&self, dataset: &str, instance: &str) -> Result<u64>;
}

/// The grid dataset catalogue, queried through `dasgoclient`.
pub struct DasClient {
    executable: String,
}

impl DasClient {
    /// Default client.
    pub fn new() -> Self {
        DasClient { executable: "dasgoclient".to_string() }
    }

    /// Client with an alternative executable (used by tests).
    pub fn with_executable(executable: impl Into<String>) -> Self {
        DasClient { executable: executable.into() }
    }

    fn query(&self, query: &str) -> Result<String> {
        let cmd = format!("{} --limit=0 --query=\"{}\"", self.executable, query);
        tracing::debug!(%cmd, "catalogue query");
        let output = Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .output()
            .map_err(|e| Error::Catalogue(format!("`{cmd}`: {e}")))?;
        if !output.status.success() {
            return Err(Error::Catalogue(format!(
                "`{cmd}`: exit {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for DasClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalogue for DasClient {
    fn files(&self, dataset: &str, instance: &str) -> Result<Vec<String>> {
        let out = self.query(&format!("file dataset={dataset} instance={instance}"))?;
        let files: Vec<String> = out
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if files.is_empty() {
            return Err(Error::Catalogue(format!("no files found for dataset {dataset}")));
        }
        Ok(files)
    }

    fn nevents(&self, dataset: &str, instance: &str) -> Result<u64> {
        let out = self.query(&format!("summary dataset={dataset} instance={instance}"))?;
        parse_summary_nevents(&out)
            .ok_or_else(|| Error::Catalogue(format!("no event summary for dataset {dataset}")))
    }
}

/// Pull `"nevents": N` out of a catalogue summary blob.
pub fn parse_summary_nevents(summary: &str) -> Option<u64> {
    let idx = summary.find("\"nevents\":")?;
    let rest = summary[idx + "\"nevents\":".len()..].trim_start();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

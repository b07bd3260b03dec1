//! Error types shared across the taupico crates.

use thiserror::Error;

/// Framework-wide error type.
///
/// Variants follow the operational error kinds of the framework: a
/// configuration error aborts before any job is touched, a storage error is
/// fatal to the current operation but not to the surrounding sweep, and so on.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown channel/era/module, malformed sample entry, bad flag value.
    #[error("configuration error: {0}")]
    Config(String),

    /// A storage back-end command failed; the failing command is echoed.
    #[error("storage I/O error: `{cmd}`: {msg}")]
    Storage {
        /// Command that was issued to the back-end.
        cmd: String,
        /// What went wrong.
        msg: String,
    },

    /// Remote catalogue query failed or returned nothing where results were
    /// mandatory.
    #[error("catalogue error: {0}")]
    Catalogue(String),

    /// Output that looked successful is unreadable or inconsistent.
    #[error("data integrity error: {0}")]
    Integrity(String),

    /// An analysis module failed during its lifecycle.
    #[error("analysis module '{module}': {msg}")]
    Module {
        /// Module identifier.
        module: String,
        /// What went wrong.
        msg: String,
    },

    /// Hadd failure or cutflow label mismatch.
    #[error("merge error: {0}")]
    Merge(String),

    /// Orchestrator-level sanity check (missing cross-section, duplicate
    /// sample name, ...).
    #[error("sanity check failed: {0}")]
    Sanity(String),

    /// Malformed variable/selection/weight expression, or a reference to an
    /// undefined branch.
    #[error("expression error: {0}")]
    Expression(String),

    /// Event-file container error (unreadable file, missing tree/branch,
    /// schema mismatch).
    #[error("event file error: {0}")]
    EventFile(String),

    /// Batch back-end command failed.
    #[error("batch error: {0}")]
    Batch(String),
}

impl Error {
    /// Shorthand for a storage error echoing the failing command.
    pub fn storage(cmd: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Storage { cmd: cmd.into(), msg: msg.into() }
    }

    /// Shorthand for a module error.
    pub fn module(module: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Module { module: module.into(), msg: msg.into() }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Process exit code for a given failure, per the driver contract:
/// 0 = success, 1 = non-final job status, >1 = fatal configuration error.
pub fn exit_code(err: &Error) -> i32 {
    match err {
        Error::Config(_) | Error::Sanity(_) => 2,
        _ => 3,
    }
}

//! # pico-core
//!
//! Shared foundation of the taupico framework: the error taxonomy, common
//! data types (sample kind, event-windowed input files), `$KEY` path
//! expansion, sample-name matching and `>>>`-prefixed console reporting.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod console;
pub mod error;
pub mod strings;
pub mod types;

pub use error::{Error, Result, exit_code};
pub use strings::{match_any, match_glob, match_sample, repkey, tagify};
pub use types::{DataKind, InputFile, era_lumi};

//! # pico-producer
//!
//! The per-job event-processing engine: a single-threaded event loop that
//! opens the chunk's inputs, applies the window, pre-selection and
//! certified-run filter, runs the configured analysis modules in declaration
//! order, and writes the skimmed output tree plus the standard cutflow.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bookkeeper;
pub mod certified;
pub mod module;
pub mod modules;
pub mod processor;
pub mod registry;

pub use bookkeeper::{Bookkeeper, CUTFLOW, FileCounts, check_cutflow, new_cutflow};
pub use certified::CertifiedLumis;
pub use module::{AnalysisModule, EventContext, FileContext, ModuleOptions, OptValue};
pub use processor::{ProcessorConfig, RunReport, run};
pub use registry::{ModuleFactory, ModuleRegistry};

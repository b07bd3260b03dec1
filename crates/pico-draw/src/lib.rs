//! # pico-draw
//!
//! The histogram-production layer: draw-side samples pointing at merged
//! pico files, merged samples summing normalized children, sample sets with
//! concurrent multi-variable draws, and the data-driven QCD multijet
//! estimate from the same-sign region.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod histset;
pub mod qcd;
pub mod sample;
pub mod sampleset;
pub mod variable;

pub use histset::{HistSet, HistSetDict};
pub use qcd::{QcdOptions, invertcharge, qcd_osss};
pub use sample::{DrawOptions, Role, Sample, SampleSource};
pub use sampleset::{SampleSet, StackOptions};
pub use variable::{Selection, Variable, Variable2D, joincuts, joinweights, makehistname};

//! # pico-nano
//!
//! Event-tuple layer of the taupico framework: the on-disk container with
//! named trees and histograms, per-event views with particle collections and
//! kinematics, weighted 1-D/2-D histograms, a compiled expression engine and
//! a single-pass multi-histogram filler.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event;
pub mod expr;
pub mod file;
pub mod filler;
pub mod histogram;
pub mod tree;

pub use event::{Event, FourVector, ParticleView, delta_phi, delta_r};
pub use expr::CompiledExpr;
pub use file::{EVENT_TREE, NanoFile, count_events, merge_files};
pub use filler::{DrawResult, DrawSpec, VarSpec, fill_from_columns, fill_histograms, required_branches};
pub use histogram::{Hist1D, Hist2D};
pub use tree::{Cell, Column, Tree};

//! Cutflow bookkeeping.
//!
//! Every chunk output carries a `cutflow` histogram with 12 bins; the first
//! eight count events and summed generator weights at the standard stages.
//! Counts are additive across files within a job and merge across jobs
//! without double counting.

use pico_core::{Error, Result};
use pico_nano::Hist1D;

/// Histogram name in the output file.
pub const CUTFLOW: &str = "cutflow";

/// Bin indices (0-based) of the standard stages.
pub mod bins {
    /// All events in the input tree.
    pub const FULL: usize = 0;
    /// Events within the `[firstevt, firstevt+maxevts)` window.
    pub const READ: usize = 1;
    /// Events surviving the pre-selection and certified-run filter.
    pub const SKIM: usize = 2;
    /// Events written to the output tree.
    pub const PASS: usize = 3;
    /// Weighted counterpart of `FULL`.
    pub const FULL_WGT: usize = 4;
    /// Weighted counterpart of `READ`.
    pub const READ_WGT: usize = 5;
    /// Weighted counterpart of `SKIM`.
    pub const SKIM_WGT: usize = 6;
    /// Weighted counterpart of `PASS`.
    pub const PASS_WGT: usize = 7;
}

const LABELS: [&str; 8] =
    ["full", "read", "skim", "pass", "full_wgt", "read_wgt", "skim_wgt", "pass_wgt"];

/// Per-file stage counts, summed into the cutflow at file boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FileCounts {
    /// All events in the input tree.
    pub full: u64,
    /// Events in the read window.
    pub read: u64,
    /// Events surviving pre-selection and the certified-run filter.
    pub skim: u64,
    /// Events written out.
    pub pass: u64,
    /// Sum of generator weights over all events.
    pub full_wgt: f64,
    /// Sum of generator weights over the read window.
    pub read_wgt: f64,
    /// Sum of generator weights over skimmed events.
    pub skim_wgt: f64,
    /// Sum of generator weights over written events.
    pub pass_wgt: f64,
}

impl FileCounts {
    /// Stage monotonicity: `pass ≤ skim ≤ read ≤ full`.
    pub fn is_monotone(&self) -> bool {
        self.pass <= self.skim && self.skim <= self.read && self.read <= self.full
    }
}

/// The cutflow accumulator of one job.
#[derive(Debug, Clone)]
pub struct Bookkeeper {
    cutflow: Hist1D,
}

impl Bookkeeper {
    /// Fresh cutflow with the standard labels.
    pub fn new() -> Self {
        Bookkeeper { cutflow: new_cutflow() }
    }

    /// Fold one file's counts into the cutflow.
    pub fn add_file(&mut self, counts: &FileCounts) -> Result<()> {
        if !counts.is_monotone() {
            return Err(Error::Integrity(format!(
                "cutflow stages not monotone: pass={} skim={} read={} full={}",
                counts.pass, counts.skim, counts.read, counts.full
            )));
        }
        let h = &mut self.cutflow;
        h.add_bin_content(bins::FULL, counts.full as f64);
        h.add_bin_content(bins::READ, counts.read as f64);
        h.add_bin_content(bins::SKIM, counts.skim as f64);
        h.add_bin_content(bins::PASS, counts.pass as f64);
        h.add_bin_content(bins::FULL_WGT, counts.full_wgt);
        h.add_bin_content(bins::READ_WGT, counts.read_wgt);
        h.add_bin_content(bins::SKIM_WGT, counts.skim_wgt);
        h.add_bin_content(bins::PASS_WGT, counts.pass_wgt);
        Ok(())
    }

    /// The accumulated cutflow.
    pub fn cutflow(&self) -> &Hist1D {
        &self.cutflow
    }

    /// Print the cutflow with stage fractions.
    pub fn report(&self) {
        let full = self.cutflow.bin_content(bins::FULL);
        pico_core::console::say(format!("{:>13} {:>8}", "events", "/full"));
        for (i, label) in LABELS.iter().enumerate() {
            let n = self.cutflow.bin_content(i);
            let frac = if full > 0.0 && i < 4 {
                format!("{:.2}%", 100.0 * n / full)
            } else {
                String::new()
            };
            pico_core::console::say(format!("{n:>13.1} {frac:>8}  {label}"));
        }
    }
}

impl Default for Bookkeeper {
    fn default() -> Self {
        Self::new()
    }
}

/// An empty cutflow histogram with the standard binning and labels.
pub fn new_cutflow() -> Hist1D {
    let mut h = Hist1D::new(CUTFLOW, 12, 0.0, 12.0);
    for (i, label) in LABELS.iter().enumerate() {
        h.set_bin_label(i, *label);
    }
    h
}

/// Check the merged-cutflow invariants (`pass ≤ skim ≤ read ≤ full`, same
/// for weighted bins of simulation).
pub fn check_cutflow(h: &Hist1D) -> Result<()> {
    if h.bin_label(bins::FULL) != Some("full") {
        return Err(Error::Merge("cutflow bin labels missing or mismatched".into()));
    }
    let (full, read, skim, pass) = (
        h.bin_content(bins::FULL),
        h.bin_content(bins::READ),
        h.bin_content(bins::SKIM),
        h.bin_content(bins::PASS),
    );
    if !(pass <= skim && skim <= read && read <= full) {
        return Err(Error::Integrity(format!(
            "merged cutflow not monotone: pass={pass} skim={skim} read={read} full={full}"
        )));
    }
    Ok(())
}

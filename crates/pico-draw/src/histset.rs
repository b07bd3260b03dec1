//! Containers for the results of one draw request.

use std::collections::BTreeMap;

use pico_nano::Hist1D;

/// Histograms of one variable under one selection: at most one data
/// histogram, one expected histogram per process, optional signals.
#[derive(Debug, Default)]
pub struct HistSet {
    /// Observed data, if a data sample is in the set.
    pub data: Option<Hist1D>,
    /// Expected processes, in stacking order.
    pub exp: Vec<Hist1D>,
    /// Signal hypotheses.
    pub signal: Vec<Hist1D>,
}

impl HistSet {
    /// Sum of the expected histograms, bin by bin.
    pub fn exp_total(&self) -> Option<Hist1D> {
        let mut iter = self.exp.iter();
        let mut total = iter.next()?.clone();
        total.name = format!("{}_total", total.name);
        for hist in iter {
            // binning is uniform within one draw request
            total.add(hist).ok()?;
        }
        Some(total)
    }
}

/// Draw results keyed by variable identifier.
pub type HistSetDict = BTreeMap<String, HistSet>;

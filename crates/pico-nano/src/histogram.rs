//! Weighted 1-D and 2-D histograms with explicit under/overflow and
//! per-bin sum of squared weights.

use pico_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// A 1-D weighted histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hist1D {
    /// Histogram name.
    pub name: String,
    /// Histogram title.
    pub title: String,
    /// Bin edges (length = n_bins + 1, strictly increasing).
    pub bin_edges: Vec<f64>,
    /// Bin contents (sum of weights per bin, excluding under/overflow).
    pub content: Vec<f64>,
    /// Sum of squared weights per bin.
    pub sumw2: Vec<f64>,
    /// Underflow sum of weights.
    pub underflow: f64,
    /// Overflow sum of weights.
    pub overflow: f64,
    /// Underflow sum of squared weights.
    pub underflow_sumw2: f64,
    /// Overflow sum of squared weights.
    pub overflow_sumw2: f64,
    /// Optional bin labels (used by the cutflow); empty when unused.
    pub labels: Vec<String>,
    /// Number of fills.
    pub entries: f64,
}

impl Hist1D {
    /// Uniform binning over `[xmin, xmax)`.
    pub fn new(name: impl Into<String>, nbins: usize, xmin: f64, xmax: f64) -> Self {
        let step = (xmax - xmin) / nbins as f64;
        let edges = (0..=nbins).map(|i| xmin + step * i as f64).collect();
        Self::with_edges(name, edges)
    }

    /// Explicit bin edges.
    pub fn with_edges(name: impl Into<String>, bin_edges: Vec<f64>) -> Self {
        let n = bin_edges.len().saturating_sub(1);
        let name = name.into();
        Hist1D {
            title: name.clone(),
            name,
            bin_edges,
            content: vec![0.0; n],
            sumw2: vec![0.0; n],
            underflow: 0.0,
            overflow: 0.0,
            underflow_sumw2: 0.0,
            overflow_sumw2: 0.0,
            labels: Vec::new(),
            entries: 0.0,
        }
    }

    /// Number of in-range bins.
    pub fn nbins(&self) -> usize {
        self.content.len()
    }

    /// Bin index for a value, `None` for under/overflow.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        let edges = &self.bin_edges;
        if x < edges[0] || x >= edges[edges.len() - 1] {
            return None;
        }
        match edges.binary_search_by(|e| e.partial_cmp(&x).unwrap()) {
            Ok(i) => (i < edges.len() - 1).then_some(i),
            Err(i) => Some(i - 1),
        }
    }

    /// Fill with unit weight.
    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    /// Fill with a weight; out-of-range values land in under/overflow.
    pub fn fill_weighted(&mut self, x: f64, w: f64) {
        self.entries += 1.0;
        match self.find_bin(x) {
            Some(i) => {
                self.content[i] += w;
                self.sumw2[i] += w * w;
            }
            None if x < self.bin_edges[0] => {
                self.underflow += w;
                self.underflow_sumw2 += w * w;
            }
            None => {
                self.overflow += w;
                self.overflow_sumw2 += w * w;
            }
        }
    }

    /// Add a weight directly to bin `i` (0-based), as the bookkeeper does
    /// when counting stages rather than filling values.
    pub fn add_bin_content(&mut self, i: usize, w: f64) {
        if i < self.content.len() {
            self.content[i] += w;
            self.sumw2[i] += w * w;
        }
    }

    /// Bin content by 0-based index.
    pub fn bin_content(&self, i: usize) -> f64 {
        self.content.get(i).copied().unwrap_or(0.0)
    }

    /// Label bin `i`; grows the label table as needed.
    pub fn set_bin_label(&mut self, i: usize, label: impl Into<String>) {
        if self.labels.len() < self.content.len() {
            self.labels.resize(self.content.len(), String::new());
        }
        if i < self.labels.len() {
            self.labels[i] = label.into();
        }
    }

    /// Label of bin `i`, if any.
    pub fn bin_label(&self, i: usize) -> Option<&str> {
        self.labels.get(i).map(|s| s.as_str()).filter(|s| !s.is_empty())
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.content.iter().sum()
    }

    /// Statistical error of bin `i` (`sqrt(sumw2)`).
    pub fn bin_error(&self, i: usize) -> f64 {
        self.sumw2.get(i).copied().unwrap_or(0.0).sqrt()
    }

    /// Scale all contents (incl. flows) by a constant.
    pub fn scale(&mut self, factor: f64) {
        for c in &mut self.content {
            *c *= factor;
        }
        for s in &mut self.sumw2 {
            *s *= factor * factor;
        }
        self.underflow *= factor;
        self.overflow *= factor;
        self.underflow_sumw2 *= factor * factor;
        self.overflow_sumw2 *= factor * factor;
    }

    /// Add another histogram bin-for-bin, scaled by `c`. Binning and labels
    /// must agree.
    pub fn add_scaled(&mut self, other: &Hist1D, c: f64) -> Result<()> {
        if self.bin_edges != other.bin_edges {
            return Err(Error::Merge(format!(
                "histogram '{}' binning mismatch against '{}'",
                self.name, other.name
            )));
        }
        if !self.labels.is_empty() && !other.labels.is_empty() && self.labels != other.labels {
            return Err(Error::Merge(format!(
                "histogram '{}' bin-label mismatch against '{}'",
                self.name, other.name
            )));
        }
        for (a, b) in self.content.iter_mut().zip(&other.content) {
            *a += c * b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += c * c * b;
        }
        self.underflow += c * other.underflow;
        self.overflow += c * other.overflow;
        self.underflow_sumw2 += c * c * other.underflow_sumw2;
        self.overflow_sumw2 += c * c * other.overflow_sumw2;
        self.entries += other.entries;
        if self.labels.is_empty() && !other.labels.is_empty() {
            self.labels = other.labels.clone();
        }
        Ok(())
    }

    /// Add another histogram bin-for-bin.
    pub fn add(&mut self, other: &Hist1D) -> Result<()> {
        self.add_scaled(other, 1.0)
    }
}

/// A 2-D weighted histogram (row-major `nx × ny` contents, flows dropped but
/// counted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hist2D {
    /// Histogram name.
    pub name: String,
    /// Histogram title.
    pub title: String,
    /// x bin edges.
    pub x_edges: Vec<f64>,
    /// y bin edges.
    pub y_edges: Vec<f64>,
    /// Bin contents, row-major over `(ix, iy)`.
    pub content: Vec<f64>,
    /// Sum of squared weights per bin.
    pub sumw2: Vec<f64>,
    /// Fills falling outside either axis.
    pub n_flow: u64,
    /// Number of fills.
    pub entries: f64,
}

impl Hist2D {
    /// Explicit bin edges on both axes.
    pub fn with_edges(name: impl Into<String>, x_edges: Vec<f64>, y_edges: Vec<f64>) -> Self {
        let n = x_edges.len().saturating_sub(1) * y_edges.len().saturating_sub(1);
        let name = name.into();
        Hist2D {
            title: name.clone(),
            name,
            x_edges,
            y_edges,
            content: vec![0.0; n],
            sumw2: vec![0.0; n],
            n_flow: 0,
            entries: 0.0,
        }
    }

    /// Number of x bins.
    pub fn nx(&self) -> usize {
        self.x_edges.len().saturating_sub(1)
    }

    /// Number of y bins.
    pub fn ny(&self) -> usize {
        self.y_edges.len().saturating_sub(1)
    }

    fn axis_bin(edges: &[f64], v: f64) -> Option<usize> {
        if v < edges[0] || v >= edges[edges.len() - 1] {
            return None;
        }
        match edges.binary_search_by(|e| e.partial_cmp(&v).unwrap()) {
            Ok(i) => (i < edges.len() - 1).then_some(i),
            Err(i) => Some(i - 1),
        }
    }

    /// Fill with a weight.
    pub fn fill_weighted(&mut self, x: f64, y: f64, w: f64) {
        self.entries += 1.0;
        match (Self::axis_bin(&self.x_edges, x), Self::axis_bin(&self.y_edges, y)) {
            (Some(ix), Some(iy)) => {
                let idx = ix * self.ny() + iy;
                self.content[idx] += w;
                self.sumw2[idx] += w * w;
            }
            _ => self.n_flow += 1,
        }
    }

    /// Content of bin `(ix, iy)`.
    pub fn bin_content(&self, ix: usize, iy: usize) -> f64 {
        self.content.get(ix * self.ny() + iy).copied().unwrap_or(0.0)
    }

    /// Scale all contents by a constant.
    pub fn scale(&mut self, factor: f64) {
        for c in &mut self.content {
            *c *= factor;
        }
        for s in &mut self.sumw2 {
            *s *= factor * factor;
        }
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.content.iter().sum()
    }

    /// Add another 2-D histogram bin-for-bin.
    pub fn add(&mut self, other: &Hist2D) -> Result<()> {
        if self.x_edges != other.x_edges || self.y_edges != other.y_edges {
            return Err(Error::Merge(format!(
                "2D histogram '{}' binning mismatch against '{}'",
                self.name, other.name
            )));
        }
        for (a, b) in self.content.iter_mut().zip(&other.content) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.n_flow += other.n_flow;
        self.entries += other.entries;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_and_flows() {
        let mut h = Hist1D::new("h", 3, 0.0, 3.0);
        for x in [0.5, 1.5, 2.5, 0.5, -1.0, 3.5] {
            h.fill(x);
        }
        assert_eq!(h.content, vec![2.0, 1.0, 1.0]);
        assert_eq!(h.underflow, 1.0);
        assert_eq!(h.overflow, 1.0);
        assert_eq!(h.entries, 6.0);
    }

    #[test]
    fn weighted_errors() {
        let mut h = Hist1D::new("h", 2, 0.0, 2.0);
        h.fill_weighted(0.5, 2.0);
        h.fill_weighted(0.5, 1.0);
        h.fill_weighted(1.5, 3.0);
        assert_eq!(h.content, vec![3.0, 3.0]);
        assert_eq!(h.sumw2, vec![5.0, 9.0]);
        assert_eq!(h.bin_error(1), 3.0);
    }

    #[test]
    fn scale_scales_flows() {
        let mut h = Hist1D::new("h", 1, 0.0, 1.0);
        h.fill_weighted(0.5, 2.0);
        h.fill_weighted(-1.0, 1.0);
        h.scale(3.0);
        assert_eq!(h.content, vec![6.0]);
        assert_eq!(h.underflow, 3.0);
        assert_eq!(h.sumw2, vec![36.0]);
    }

    #[test]
    fn merge_is_associative() {
        let mk = |vals: &[f64]| {
            let mut h = Hist1D::new("h", 4, 0.0, 4.0);
            for &v in vals {
                h.fill(v);
            }
            h
        };
        let (a, b, c) = (mk(&[0.5, 1.5]), mk(&[2.5]), mk(&[3.5, 0.5]));

        let mut left = a.clone();
        left.add(&b).unwrap();
        left.add(&c).unwrap();

        let mut right_inner = b.clone();
        right_inner.add(&c).unwrap();
        let mut right = a.clone();
        right.add(&right_inner).unwrap();

        assert_eq!(left.content, right.content);
        assert_eq!(left.sumw2, right.sumw2);
    }

    #[test]
    fn label_mismatch_fails_merge() {
        let mut a = Hist1D::new("cutflow", 2, 0.0, 2.0);
        a.set_bin_label(0, "full");
        a.set_bin_label(1, "read");
        let mut b = Hist1D::new("cutflow", 2, 0.0, 2.0);
        b.set_bin_label(0, "full");
        b.set_bin_label(1, "pass");
        assert!(a.add(&b).is_err());
    }

    #[test]
    fn hist2d_fill() {
        let mut h = Hist2D::with_edges("h2", vec![0.0, 1.0, 2.0], vec![0.0, 10.0, 20.0]);
        h.fill_weighted(0.5, 5.0, 2.0);
        h.fill_weighted(1.5, 15.0, 1.0);
        h.fill_weighted(5.0, 5.0, 1.0);
        assert_eq!(h.bin_content(0, 0), 2.0);
        assert_eq!(h.bin_content(1, 1), 1.0);
        assert_eq!(h.n_flow, 1);
    }
}

//! Histogram variables and selections.

use pico_core::{Error, Result};

/// A variable to histogram: an expression plus its binning.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Expression evaluated per event (e.g. `m_vis`, `abs(eta_1)`).
    pub expr: String,
    /// File-name-safe identifier used in histogram names.
    pub filename: String,
    /// Axis title.
    pub title: String,
    /// Bin edges.
    pub edges: Vec<f64>,
}

impl Variable {
    /// Uniform binning.
    pub fn new(expr: impl Into<String>, nbins: usize, xmin: f64, xmax: f64) -> Self {
        let expr = expr.into();
        let step = (xmax - xmin) / nbins as f64;
        let edges = (0..=nbins).map(|i| xmin + step * i as f64).collect();
        Variable { filename: filename_safe(&expr), title: expr.clone(), expr, edges }
    }

    /// Explicit bin edges.
    pub fn with_edges(expr: impl Into<String>, edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 || edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Config(format!("bin edges must be increasing: {edges:?}")));
        }
        let expr = expr.into();
        Ok(Variable { filename: filename_safe(&expr), title: expr.clone(), expr, edges })
    }

    /// Override the axis title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Number of bins.
    pub fn nbins(&self) -> usize {
        self.edges.len() - 1
    }
}

/// A pair of variables for 2-D draws.
#[derive(Debug, Clone)]
pub struct Variable2D {
    /// x variable.
    pub x: Variable,
    /// y variable.
    pub y: Variable,
}

impl Variable2D {
    /// Pair two variables.
    pub fn new(x: Variable, y: Variable) -> Self {
        Variable2D { x, y }
    }

    /// File-name-safe identifier (`y_vs_x`).
    pub fn filename(&self) -> String {
        format!("{}_vs_{}", self.y.filename, self.x.filename)
    }
}

/// A named selection.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Human-readable title.
    pub title: String,
    /// Cut expression; empty selects everything.
    pub cuts: String,
}

impl Selection {
    /// New selection.
    pub fn new(title: impl Into<String>, cuts: impl Into<String>) -> Self {
        Selection { title: title.into(), cuts: cuts.into() }
    }
}

/// Reduce an expression to a file-name-safe identifier.
pub fn filename_safe(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    for c in expr.chars() {
        match c {
            c if c.is_ascii_alphanumeric() || c == '_' => out.push(c),
            '(' | ')' | ' ' => {}
            _ => out.push('_'),
        }
    }
    out.trim_matches('_').to_string()
}

/// Join two cut expressions with `&&`; empty parts drop out.
pub fn joincuts(a: &str, b: &str) -> String {
    match (a.trim(), b.trim()) {
        ("", "") => String::new(),
        (a, "") => a.to_string(),
        ("", b) => b.to_string(),
        (a, b) => format!("({a}) && ({b})"),
    }
}

/// Join weight expressions multiplicatively; empty parts drop out.
pub fn joinweights(parts: &[&str]) -> String {
    let parts: Vec<&str> = parts.iter().map(|p| p.trim()).filter(|p| !p.is_empty()).collect();
    match parts.len() {
        0 => String::new(),
        1 => parts[0].to_string(),
        _ => parts.iter().map(|p| format!("({p})")).collect::<Vec<_>>().join("*"),
    }
}

/// Histogram name `$VAR_$PROCESS$TAG`, unique per draw.
pub fn makehistname(variable: &str, process: &str, tag: &str) -> String {
    format!("{variable}_{process}{tag}")
}

//! Single-pass filling of many histograms from one tree.
//!
//! This is the "multi-draw" mode of the draw layer: all requested
//! `(variable, selection, weight)` combinations are evaluated with one pass
//! over the column data, so a sample's file is read once no matter how many
//! histograms are requested.

use std::collections::HashMap;

use pico_core::{Error, Result};

use crate::expr::CompiledExpr;
use crate::histogram::{Hist1D, Hist2D};
use crate::tree::Tree;

/// Variable part of a draw request.
#[derive(Debug, Clone)]
pub enum VarSpec {
    /// 1-D draw over one expression.
    OneD {
        /// Variable expression.
        expr: CompiledExpr,
        /// Bin edges.
        edges: Vec<f64>,
    },
    /// 2-D draw over two expressions.
    TwoD {
        /// x expression.
        x: CompiledExpr,
        /// y expression.
        y: CompiledExpr,
        /// x bin edges.
        x_edges: Vec<f64>,
        /// y bin edges.
        y_edges: Vec<f64>,
    },
}

/// One histogram to fill.
#[derive(Debug, Clone)]
pub struct DrawSpec {
    /// Histogram name (must be unique within one draw call).
    pub name: String,
    /// Variable(s) and binning.
    pub var: VarSpec,
    /// Selection expression; entries pass when it evaluates > 0.
    pub selection: Option<CompiledExpr>,
    /// Weight expression; defaults to 1.
    pub weight: Option<CompiledExpr>,
}

/// Result of one draw spec.
#[derive(Debug, Clone)]
pub enum DrawResult {
    /// Filled 1-D histogram.
    OneD(Hist1D),
    /// Filled 2-D histogram.
    TwoD(Hist2D),
}

impl DrawResult {
    /// Unwrap a 1-D result.
    pub fn into_1d(self) -> Result<Hist1D> {
        match self {
            DrawResult::OneD(h) => Ok(h),
            DrawResult::TwoD(h) => {
                Err(Error::Expression(format!("draw '{}' produced a 2D histogram", h.name)))
            }
        }
    }

    /// Unwrap a 2-D result.
    pub fn into_2d(self) -> Result<Hist2D> {
        match self {
            DrawResult::TwoD(h) => Ok(h),
            DrawResult::OneD(h) => {
                Err(Error::Expression(format!("draw '{}' produced a 1D histogram", h.name)))
            }
        }
    }

    /// Add a same-shape result (used to accumulate across files).
    pub fn add(&mut self, other: &DrawResult) -> Result<()> {
        match (self, other) {
            (DrawResult::OneD(a), DrawResult::OneD(b)) => a.add(b),
            (DrawResult::TwoD(a), DrawResult::TwoD(b)) => a.add(b),
            _ => Err(Error::Merge("1D/2D draw result mismatch".into())),
        }
    }

    /// Scale contents.
    pub fn scale(&mut self, factor: f64) {
        match self {
            DrawResult::OneD(h) => h.scale(factor),
            DrawResult::TwoD(h) => h.scale(factor),
        }
    }
}

fn resolve_columns<'a>(
    expr: &CompiledExpr,
    columns: &'a HashMap<String, Vec<f64>>,
) -> Result<Vec<&'a [f64]>> {
    expr.branches
        .iter()
        .map(|name| {
            columns
                .get(name)
                .map(|v| v.as_slice())
                .ok_or_else(|| Error::Expression(format!("undefined branch '{name}' in '{expr}'")))
        })
        .collect()
}

/// Gather all branch names required by a set of specs.
pub fn required_branches(specs: &[DrawSpec]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |expr: &CompiledExpr| {
        for b in &expr.branches {
            if !out.contains(b) {
                out.push(b.clone());
            }
        }
    };
    for spec in specs {
        match &spec.var {
            VarSpec::OneD { expr, .. } => push(expr),
            VarSpec::TwoD { x, y, .. } => {
                push(x);
                push(y);
            }
        }
        if let Some(sel) = &spec.selection {
            push(sel);
        }
        if let Some(w) = &spec.weight {
            push(w);
        }
    }
    out
}

/// Fill all specs in one pass over pre-extracted column data.
pub fn fill_from_columns(
    specs: &[DrawSpec],
    columns: &HashMap<String, Vec<f64>>,
    n_entries: usize,
) -> Result<Vec<DrawResult>> {
    // Pre-evaluate every expression bulk-wise.
    struct Prepared {
        var: (Vec<f64>, Option<Vec<f64>>),
        sel: Option<Vec<f64>>,
        weight: Option<Vec<f64>>,
    }
    let mut prepared = Vec::with_capacity(specs.len());
    for spec in specs {
        let var = match &spec.var {
            VarSpec::OneD { expr, .. } => {
                (expr.eval_bulk(&resolve_columns(expr, columns)?, n_entries), None)
            }
            VarSpec::TwoD { x, y, .. } => (
                x.eval_bulk(&resolve_columns(x, columns)?, n_entries),
                Some(y.eval_bulk(&resolve_columns(y, columns)?, n_entries)),
            ),
        };
        let sel = match &spec.selection {
            Some(s) => Some(s.eval_bulk(&resolve_columns(s, columns)?, n_entries)),
            None => None,
        };
        let weight = match &spec.weight {
            Some(w) => Some(w.eval_bulk(&resolve_columns(w, columns)?, n_entries)),
            None => None,
        };
        prepared.push(Prepared { var, sel, weight });
    }

    let mut results: Vec<DrawResult> = specs
        .iter()
        .map(|spec| match &spec.var {
            VarSpec::OneD { edges, .. } => {
                DrawResult::OneD(Hist1D::with_edges(spec.name.clone(), edges.clone()))
            }
            VarSpec::TwoD { x_edges, y_edges, .. } => DrawResult::TwoD(Hist2D::with_edges(
                spec.name.clone(),
                x_edges.clone(),
                y_edges.clone(),
            )),
        })
        .collect();

    for entry in 0..n_entries {
        for (i, prep) in prepared.iter().enumerate() {
            if let Some(sel) = &prep.sel
                && sel[entry] <= 0.0
            {
                continue;
            }
            let w = prep.weight.as_ref().map_or(1.0, |w| w[entry]);
            match &mut results[i] {
                DrawResult::OneD(h) => h.fill_weighted(prep.var.0[entry], w),
                DrawResult::TwoD(h) => {
                    let y = prep.var.1.as_ref().map(|y| y[entry]).unwrap_or(0.0);
                    h.fill_weighted(prep.var.0[entry], y, w)
                }
            }
        }
    }
    Ok(results)
}

/// Fill all specs in one pass over a tree.
pub fn fill_histograms(specs: &[DrawSpec], tree: &Tree) -> Result<Vec<DrawResult>> {
    let mut columns = HashMap::new();
    for name in required_branches(specs) {
        let data = tree.scalar_f64(&name)?;
        columns.insert(name, data);
    }
    fill_from_columns(specs, &columns, tree.nevents() as usize)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::tree::{Cell, Column};

    fn demo_tree() -> Tree {
        let mut tree = Tree::new("Events");
        tree.declare("m_vis", Column::F64(Vec::new())).unwrap();
        tree.declare("pt_1", Column::F64(Vec::new())).unwrap();
        tree.declare("genweight", Column::F64(Vec::new())).unwrap();
        for (m, pt, w) in [(60.0, 30.0, 1.0), (90.0, 40.0, 2.0), (120.0, 20.0, 1.0), (91.0, 35.0, -1.0)] {
            let mut row = BTreeMap::new();
            row.insert("m_vis".to_string(), Cell::F64(m));
            row.insert("pt_1".to_string(), Cell::F64(pt));
            row.insert("genweight".to_string(), Cell::F64(w));
            tree.fill(&row).unwrap();
        }
        tree
    }

    fn spec_1d(name: &str, var: &str, sel: Option<&str>, weight: Option<&str>) -> DrawSpec {
        DrawSpec {
            name: name.into(),
            var: VarSpec::OneD {
                expr: CompiledExpr::compile(var).unwrap(),
                edges: vec![0.0, 50.0, 100.0, 150.0],
            },
            selection: sel.map(|s| CompiledExpr::compile(s).unwrap()),
            weight: weight.map(|w| CompiledExpr::compile(w).unwrap()),
        }
    }

    #[test]
    fn multi_draw_single_pass() {
        let tree = demo_tree();
        let specs = vec![
            spec_1d("m_all", "m_vis", None, None),
            spec_1d("m_sel", "m_vis", Some("pt_1 > 25"), Some("genweight")),
        ];
        let out = fill_histograms(&specs, &tree).unwrap();
        let all = out[0].clone().into_1d().unwrap();
        assert_eq!(all.content, vec![0.0, 3.0, 1.0]);
        let sel = out[1].clone().into_1d().unwrap();
        // pt_1>25 keeps events 0, 1, 3 with weights 1, 2, -1.
        assert_eq!(sel.content, vec![0.0, 2.0, 0.0]);
        assert_eq!(sel.sumw2, vec![0.0, 6.0, 0.0]);
    }

    #[test]
    fn undefined_branch_is_fatal() {
        let tree = demo_tree();
        let specs = vec![spec_1d("bad", "pt_2", None, None)];
        let err = fill_histograms(&specs, &tree).unwrap_err();
        assert!(err.to_string().contains("pt_2"));
    }

    #[test]
    fn empty_selection_yields_valid_empty_hist() {
        let tree = demo_tree();
        let specs = vec![spec_1d("none", "m_vis", Some("pt_1 > 1000"), None)];
        let out = fill_histograms(&specs, &tree).unwrap();
        let h = out[0].clone().into_1d().unwrap();
        assert_eq!(h.integral(), 0.0);
    }

    #[test]
    fn two_dim_draw() {
        let tree = demo_tree();
        let spec = DrawSpec {
            name: "m_vs_pt".into(),
            var: VarSpec::TwoD {
                x: CompiledExpr::compile("m_vis").unwrap(),
                y: CompiledExpr::compile("pt_1").unwrap(),
                x_edges: vec![0.0, 100.0, 200.0],
                y_edges: vec![0.0, 25.0, 50.0],
            },
            selection: None,
            weight: None,
        };
        let out = fill_histograms(&[spec], &tree).unwrap();
        let h = out[0].clone().into_2d().unwrap();
        assert_eq!(h.bin_content(0, 1), 3.0); // m<100, pt>=25
        assert_eq!(h.bin_content(1, 0), 1.0); // m>=100, pt<25
    }
}

//! Data-driven QCD multijet estimate from the same-sign region.
//!
//! The opposite-sign selection is inverted to same-sign, data minus the
//! summed expectation is taken there, negative bins are clamped to `0 ± 1`,
//! and the result is scaled to the opposite-sign region by a per-channel
//! factor.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use pico_core::{Result, console};
use pico_nano::Hist1D;
use regex::Regex;

use crate::sample::DrawOptions;
use crate::sampleset::{SampleSet, StackOptions};
use crate::variable::{Selection, Variable, makehistname};

static OS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"q_[12]\s*\*\s*q_[12]\s*<\s*0").unwrap());
static SS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"q_[12]\s*\*\s*q_[12]\s*>\s*0").unwrap());

/// Invert the charge product of a selection to same-sign. Returns the new
/// cuts and whether the input already selected same-sign pairs.
pub fn invertcharge(cuts: &str) -> (String, bool) {
    if cuts.trim().is_empty() {
        return ("q_1*q_2>0".to_string(), false);
    }
    let n_os = OS_RE.find_iter(cuts).count();
    let n_ss = SS_RE.find_iter(cuts).count();
    if n_os + n_ss > 1 {
        console::warn(format!("more than one charge requirement in '{cuts}'"));
    }
    if n_os == 0 {
        // Already same-sign (or no charge requirement to invert).
        return (cuts.to_string(), n_ss > 0);
    }
    (OS_RE.replace_all(cuts, "q_1*q_2>0").into_owned(), false)
}

/// Options of the QCD estimate.
#[derive(Debug, Clone)]
pub struct QcdOptions {
    /// Histogram name tag.
    pub tag: String,
    /// SS→OS extrapolation scale; `None` uses the per-channel default
    /// (2.0 for `emu`, 1.10 otherwise).
    pub scale: Option<f64>,
    /// Relative systematic shift of the scale.
    pub shift: f64,
    /// Warn when more than this fraction of bins is clamped.
    pub warn_frac: f64,
}

impl Default for QcdOptions {
    fn default() -> Self {
        QcdOptions { tag: String::new(), scale: None, shift: 0.0, warn_frac: 0.25 }
    }
}

/// Estimate the QCD multijet contribution for each variable under the given
/// (opposite-sign) selection.
pub fn qcd_osss(
    set: &SampleSet,
    variables: &[Variable],
    selection: &Selection,
    opts: &QcdOptions,
) -> Result<BTreeMap<String, Hist1D>> {
    let (cuts_ss, already_ss) = invertcharge(&selection.cuts);
    let scale = if already_ss {
        1.0
    } else {
        opts.scale.unwrap_or(if set.channel.contains("emu") { 2.0 } else { 1.10 })
    } * (1.0 + opts.shift);

    let ss_selection = Selection::new(format!("{} (same-sign)", selection.title), cuts_ss);
    let ss_opts = StackOptions {
        draw: DrawOptions { tag: format!("{}_SS", opts.tag), ..Default::default() },
        split: false,
        signal: false,
        data: true,
        parallel: true,
        qcd: false,
    };
    let hists = set.get_hists(variables, &ss_selection, &ss_opts)?;

    let mut out = BTreeMap::new();
    for (var, histset) in hists {
        let Some(data) = histset.data else {
            return Err(pico_core::Error::Sanity(
                "no data sample for the data-driven QCD estimate".into(),
            ));
        };
        let mut qcd = data.clone();
        qcd.name = makehistname(&var, "QCD", &opts.tag);
        qcd.title = "QCD multijet".to_string();
        for exp in &histset.exp {
            qcd.add_scaled(exp, -1.0)?;
        }

        // Clamp negative bins (incl. flows) to 0 ± 1.
        let nbins = qcd.nbins() + 2;
        let mut nneg = 0usize;
        for i in 0..qcd.nbins() {
            if qcd.content[i] < 0.0 {
                qcd.content[i] = 0.0;
                qcd.sumw2[i] = 1.0;
                nneg += 1;
            }
        }
        if qcd.underflow < 0.0 {
            qcd.underflow = 0.0;
            qcd.underflow_sumw2 = 1.0;
            nneg += 1;
        }
        if qcd.overflow < 0.0 {
            qcd.overflow = 0.0;
            qcd.overflow_sumw2 = 1.0;
            nneg += 1;
        }
        if nneg as f64 > opts.warn_frac * nbins as f64 {
            console::warn(format!(
                "QCD estimate for '{var}' clamped {nneg}/{nbins} negative bins to 0 +- 1"
            ));
        }

        qcd.scale(scale);
        tracing::debug!(
            variable = %var,
            yield_ = qcd.integral(),
            scale,
            clamped = nneg,
            "QCD OS/SS estimate"
        );
        out.insert(var, qcd);
    }
    Ok(out)
}

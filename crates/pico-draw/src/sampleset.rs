//! A set of samples drawn together: one optional data sample plus the
//! expected processes, with parallel histogram production.

use pico_core::{Error, Result};
use rayon::prelude::*;

use crate::histset::{HistSet, HistSetDict};
use crate::sample::{DrawOptions, Role, Sample};
use crate::variable::{Selection, Variable};

/// Options of a set-level draw.
#[derive(Debug, Clone)]
pub struct StackOptions {
    /// Per-histogram draw options.
    pub draw: DrawOptions,
    /// Expand split samples into their virtual siblings.
    pub split: bool,
    /// Include signal samples.
    pub signal: bool,
    /// Include the data sample.
    pub data: bool,
    /// Draw samples concurrently (each worker owns its files).
    pub parallel: bool,
    /// Append the data-driven QCD estimate to the expected set.
    pub qcd: bool,
}

impl Default for StackOptions {
    fn default() -> Self {
        StackOptions {
            draw: DrawOptions::default(),
            split: true,
            signal: true,
            data: true,
            parallel: true,
            qcd: false,
        }
    }
}

/// The sample set of one channel.
#[derive(Debug, Clone)]
pub struct SampleSet {
    /// Channel label (`mutau`, `emu`, ...); drives the QCD OS/SS scale.
    pub channel: String,
    /// Observed data (at most one sample).
    pub data: Option<Sample>,
    /// Expected processes, in stacking order.
    pub exp: Vec<Sample>,
    /// Signal samples.
    pub signal: Vec<Sample>,
}

impl SampleSet {
    /// Assemble a set, enforcing unique sample names.
    pub fn new(
        channel: impl Into<String>,
        data: Option<Sample>,
        exp: Vec<Sample>,
        signal: Vec<Sample>,
    ) -> Result<Self> {
        if let Some(data) = &data
            && data.role != Role::Data
        {
            return Err(Error::Sanity(format!("sample '{}' is not a data sample", data.name)));
        }
        let mut seen = std::collections::HashSet::new();
        for sample in data.iter().chain(&exp).chain(&signal) {
            if !seen.insert(sample.name.clone()) {
                return Err(Error::Sanity(format!("duplicate sample name '{}' in set", sample.name)));
            }
            for split in &sample.splitsamples {
                if !seen.insert(split.name.clone()) {
                    return Err(Error::Sanity(format!(
                        "split sample name '{}' appears twice in set",
                        split.name
                    )));
                }
            }
        }
        Ok(SampleSet { channel: channel.into(), data, exp, signal })
    }

    /// Iterate all samples.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.data.iter().chain(&self.exp).chain(&self.signal)
    }

    fn expand_split<'a>(sample: &'a Sample, split: bool) -> Vec<&'a Sample> {
        if split && !sample.splitsamples.is_empty() {
            sample.splitsamples.iter().collect()
        } else {
            vec![sample]
        }
    }

    /// Fill histograms for every sample of the set.
    ///
    /// Each requested variable yields one [`HistSet`]. Samples are drawn
    /// concurrently when `parallel` is set; the multi-variable pass over
    /// each sample's files happens once either way.
    pub fn get_hists(
        &self,
        variables: &[Variable],
        selection: &Selection,
        opts: &StackOptions,
    ) -> Result<HistSetDict> {
        let mut tasks: Vec<(&Sample, Role)> = Vec::new();
        if opts.data
            && let Some(data) = &self.data
        {
            tasks.push((data, Role::Data));
        }
        for sample in &self.exp {
            for s in Self::expand_split(sample, opts.split) {
                tasks.push((s, Role::Background));
            }
        }
        if opts.signal {
            for sample in &self.signal {
                tasks.push((sample, Role::Signal));
            }
        }

        let draw = |(sample, role): &(&Sample, Role)| -> Result<(Role, Vec<pico_nano::Hist1D>)> {
            Ok((*role, sample.get_hists(variables, selection, &opts.draw)?))
        };
        let results: Vec<(Role, Vec<pico_nano::Hist1D>)> = if opts.parallel {
            tasks.par_iter().map(draw).collect::<Result<_>>()?
        } else {
            tasks.iter().map(draw).collect::<Result<_>>()?
        };

        let mut dict = HistSetDict::new();
        for var in variables {
            dict.insert(var.filename.clone(), HistSet::default());
        }
        for (role, hists) in results {
            for (var, hist) in variables.iter().zip(hists) {
                let set = dict.get_mut(&var.filename).expect("histset prepared per variable");
                match role {
                    Role::Data => set.data = Some(hist),
                    Role::Background => set.exp.push(hist),
                    Role::Signal => set.signal.push(hist),
                }
            }
        }

        if opts.qcd {
            let qcd = crate::qcd::qcd_osss(self, variables, selection, &crate::qcd::QcdOptions {
                tag: opts.draw.tag.clone(),
                ..Default::default()
            })?;
            for (var, hist) in qcd {
                if let Some(set) = dict.get_mut(&var) {
                    set.exp.push(hist);
                }
            }
        }
        Ok(dict)
    }

    /// Draw the full stack (data + expected + signal) for each variable.
    pub fn get_stack(
        &self,
        variables: &[Variable],
        selection: &Selection,
        opts: &StackOptions,
    ) -> Result<HistSetDict> {
        self.get_hists(variables, selection, opts)
    }
}

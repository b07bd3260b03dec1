//! The draw-side sample: a process pointing at merged pico files, with its
//! normalization and optional virtual splits.

use pico_core::{Error, Result};
use pico_nano::{CompiledExpr, DrawResult, DrawSpec, Hist1D, Hist2D, NanoFile, VarSpec};

use crate::variable::{Selection, Variable, Variable2D, joincuts, joinweights, makehistname};

/// Sample role within a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Observed data.
    Data,
    /// Expected standard-model process.
    Background,
    /// Signal hypothesis.
    Signal,
}

/// Where a sample's events come from: its own files, or child samples whose
/// normalized histograms are summed.
#[derive(Debug, Clone)]
pub enum SampleSource {
    /// Merged pico files.
    Files(Vec<String>),
    /// Child samples owned by a merged sample.
    Merged(Vec<Sample>),
}

/// Draw options of one histogram request.
#[derive(Debug, Clone, Default)]
pub struct DrawOptions {
    /// Name tag appended to histogram names.
    pub tag: String,
    /// Extra weight applied to simulation.
    pub extraweight: String,
    /// Extra weight applied to data.
    pub dataweight: String,
    /// Extra cuts applied on top of the selection.
    pub extracuts: String,
}

/// One process of the analysis.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Process name (used in histogram names).
    pub name: String,
    /// Display title.
    pub title: String,
    /// Role in the set.
    pub role: Role,
    /// Event source.
    pub source: SampleSource,
    /// Cross-section in pb (simulation).
    pub xsec: f64,
    /// Sum of generator weights (simulation).
    pub sumweights: f64,
    /// Integrated luminosity in fb⁻¹.
    pub lumi: f64,
    /// `lumi × xsec × 1000 / sumweights` (1 for data).
    pub norm: f64,
    /// Ad-hoc scale factor on top of the normalization.
    pub scale: f64,
    /// Per-sample cuts joined into every selection.
    pub cuts: String,
    /// Per-event weight expression (simulation).
    pub weight: String,
    /// Per-sample multiplicative correction.
    pub extraweight: String,
    /// Virtual siblings sharing the files with extra cuts.
    pub splitsamples: Vec<Sample>,
}

impl Sample {
    /// A data sample.
    pub fn data(name: impl Into<String>, files: Vec<String>) -> Self {
        let name = name.into();
        Sample {
            title: name.clone(),
            name,
            role: Role::Data,
            source: SampleSource::Files(files),
            xsec: -1.0,
            sumweights: 0.0,
            lumi: 0.0,
            norm: 1.0,
            scale: 1.0,
            cuts: String::new(),
            weight: String::new(),
            extraweight: String::new(),
            splitsamples: Vec::new(),
        }
    }

    /// A simulated sample; `normalize` must be called once the sum of
    /// weights and luminosity are known.
    pub fn mc(name: impl Into<String>, title: impl Into<String>, files: Vec<String>, xsec: f64) -> Self {
        Sample {
            name: name.into(),
            title: title.into(),
            role: Role::Background,
            source: SampleSource::Files(files),
            xsec,
            sumweights: 0.0,
            lumi: 0.0,
            norm: 1.0,
            scale: 1.0,
            cuts: String::new(),
            weight: String::new(),
            extraweight: String::new(),
            splitsamples: Vec::new(),
        }
    }

    /// Merge child samples into one process (e.g. several data-taking
    /// periods). The children keep their own normalizations.
    pub fn merged(name: impl Into<String>, title: impl Into<String>, children: Vec<Sample>) -> Result<Self> {
        if children.is_empty() {
            return Err(Error::Config("merged sample needs at least one child".into()));
        }
        let role = children[0].role;
        if children.iter().any(|c| c.role != role) {
            return Err(Error::Sanity("merged sample mixes data and simulation".into()));
        }
        Ok(Sample {
            name: name.into(),
            title: title.into(),
            role,
            source: SampleSource::Merged(children),
            xsec: -1.0,
            sumweights: 0.0,
            lumi: 0.0,
            norm: 1.0,
            scale: 1.0,
            cuts: String::new(),
            weight: String::new(),
            extraweight: String::new(),
            splitsamples: Vec::new(),
        })
    }

    /// Mark as signal.
    pub fn as_signal(mut self) -> Self {
        self.role = Role::Signal;
        self
    }

    /// Whether this sample is observed data.
    pub fn is_data(&self) -> bool {
        self.role == Role::Data
    }

    /// Compute the normalization `lumi × xsec × 1000 / sumweights`
    /// (cross-section in pb, luminosity in fb⁻¹).
    pub fn normalize(&mut self, lumi: f64) -> Result<()> {
        self.lumi = lumi;
        if self.is_data() {
            self.norm = 1.0;
            return Ok(());
        }
        if let SampleSource::Merged(children) = &mut self.source {
            for child in children {
                child.normalize(lumi)?;
            }
            self.norm = 1.0;
            return Ok(());
        }
        if self.xsec <= 0.0 || self.sumweights <= 0.0 || lumi <= 0.0 {
            return Err(Error::Sanity(format!(
                "cannot normalize '{}': xsec={}, sumweights={}, lumi={lumi}",
                self.name, self.xsec, self.sumweights
            )));
        }
        self.norm = lumi * self.xsec * 1000.0 / self.sumweights;
        Ok(())
    }

    /// Read the sum of generator weights from the `cutflow` histogram of
    /// the sample's first file (the `full_wgt` bin).
    pub fn load_sumweights(&mut self) -> Result<()> {
        match &mut self.source {
            SampleSource::Merged(children) => {
                for child in children {
                    child.load_sumweights()?;
                }
                Ok(())
            }
            SampleSource::Files(files) => {
                let first = files.first().ok_or_else(|| {
                    Error::Config(format!("sample '{}' has no files", self.name))
                })?;
                let file = NanoFile::open(first)?;
                let cutflow = file.hist("cutflow")?;
                let sumw = cutflow.bin_content(4); // full_wgt
                self.sumweights = if sumw > 0.0 { sumw } else { cutflow.bin_content(0) };
                Ok(())
            }
        }
    }

    /// Split into virtual siblings (shared files, extra cuts).
    pub fn split(&mut self, rules: &[(String, String, String)]) {
        self.splitsamples = rules
            .iter()
            .map(|(name, title, cut)| {
                let mut sub = self.clone();
                sub.splitsamples = Vec::new();
                sub.name = name.clone();
                sub.title = title.clone();
                sub.cuts = joincuts(&self.cuts, cut);
                sub
            })
            .collect();
    }

    fn specs_for(
        &self,
        variables: &[Variable],
        selection: &Selection,
        opts: &DrawOptions,
    ) -> Result<Vec<DrawSpec>> {
        let cuts = joincuts(&joincuts(&selection.cuts, &self.cuts), &opts.extracuts);
        let weight = if self.is_data() {
            joinweights(&[&self.weight, &opts.dataweight])
        } else {
            joinweights(&[&self.weight, &self.extraweight, &opts.extraweight])
        };
        let selexpr = (!cuts.is_empty()).then(|| CompiledExpr::compile(&cuts)).transpose()?;
        let wexpr = (!weight.is_empty()).then(|| CompiledExpr::compile(&weight)).transpose()?;
        variables
            .iter()
            .map(|var| {
                Ok(DrawSpec {
                    name: makehistname(&var.filename, &self.name, &opts.tag),
                    var: VarSpec::OneD {
                        expr: CompiledExpr::compile(&var.expr)?,
                        edges: var.edges.clone(),
                    },
                    selection: selexpr.clone(),
                    weight: wexpr.clone(),
                })
            })
            .collect()
    }

    /// Fill one histogram per variable with a single pass over this
    /// sample's files, normalized by `norm × scale` (post-fill).
    pub fn get_hists(
        &self,
        variables: &[Variable],
        selection: &Selection,
        opts: &DrawOptions,
    ) -> Result<Vec<Hist1D>> {
        match &self.source {
            SampleSource::Merged(children) => {
                let mut sums: Option<Vec<Hist1D>> = None;
                for child in children {
                    let hists = child.get_hists(variables, selection, opts)?;
                    match &mut sums {
                        None => {
                            let mut renamed = hists;
                            for (hist, var) in renamed.iter_mut().zip(variables) {
                                hist.name = makehistname(&var.filename, &self.name, &opts.tag);
                                hist.title = self.title.clone();
                            }
                            sums = Some(renamed);
                        }
                        Some(sums) => {
                            for (sum, hist) in sums.iter_mut().zip(&hists) {
                                sum.add(hist)?;
                            }
                        }
                    }
                }
                let mut sums = sums.ok_or_else(|| {
                    Error::Config(format!("merged sample '{}' has no children", self.name))
                })?;
                for hist in &mut sums {
                    hist.scale(self.scale);
                }
                Ok(sums)
            }
            SampleSource::Files(files) => {
                let specs = self.specs_for(variables, selection, opts)?;
                let mut results: Option<Vec<DrawResult>> = None;
                for path in files {
                    let file = NanoFile::open(path)?;
                    let tree = file.tree(pico_nano::EVENT_TREE)?;
                    let filled = pico_nano::fill_histograms(&specs, tree)?;
                    match &mut results {
                        None => results = Some(filled),
                        Some(results) => {
                            for (sum, hist) in results.iter_mut().zip(&filled) {
                                sum.add(hist)?;
                            }
                        }
                    }
                }
                let results = results
                    .ok_or_else(|| Error::Config(format!("sample '{}' has no files", self.name)))?;
                let mut hists = Vec::with_capacity(results.len());
                for (result, var) in results.into_iter().zip(variables) {
                    let mut hist = result.into_1d()?;
                    hist.scale(self.norm * self.scale);
                    hist.title = format!("{};{};Events", self.title, var.title);
                    hists.push(hist);
                }
                Ok(hists)
            }
        }
    }

    /// 2-D variant of [`Self::get_hists`].
    pub fn get_hists2d(
        &self,
        variables: &[Variable2D],
        selection: &Selection,
        opts: &DrawOptions,
    ) -> Result<Vec<Hist2D>> {
        match &self.source {
            SampleSource::Merged(children) => {
                let mut sums: Option<Vec<Hist2D>> = None;
                for child in children {
                    let hists = child.get_hists2d(variables, selection, opts)?;
                    match &mut sums {
                        None => sums = Some(hists),
                        Some(sums) => {
                            for (sum, hist) in sums.iter_mut().zip(&hists) {
                                sum.add(hist)?;
                            }
                        }
                    }
                }
                sums.ok_or_else(|| {
                    Error::Config(format!("merged sample '{}' has no children", self.name))
                })
            }
            SampleSource::Files(files) => {
                let cuts = joincuts(&joincuts(&selection.cuts, &self.cuts), &opts.extracuts);
                let weight = if self.is_data() {
                    joinweights(&[&self.weight, &opts.dataweight])
                } else {
                    joinweights(&[&self.weight, &self.extraweight, &opts.extraweight])
                };
                let selexpr =
                    (!cuts.is_empty()).then(|| CompiledExpr::compile(&cuts)).transpose()?;
                let wexpr =
                    (!weight.is_empty()).then(|| CompiledExpr::compile(&weight)).transpose()?;
                let specs: Vec<DrawSpec> = variables
                    .iter()
                    .map(|var| {
                        Ok(DrawSpec {
                            name: makehistname(&var.filename(), &self.name, &opts.tag),
                            var: VarSpec::TwoD {
                                x: CompiledExpr::compile(&var.x.expr)?,
                                y: CompiledExpr::compile(&var.y.expr)?,
                                x_edges: var.x.edges.clone(),
                                y_edges: var.y.edges.clone(),
                            },
                            selection: selexpr.clone(),
                            weight: wexpr.clone(),
                        })
                    })
                    .collect::<Result<_>>()?;
                let mut results: Option<Vec<DrawResult>> = None;
                for path in files {
                    let file = NanoFile::open(path)?;
                    let tree = file.tree(pico_nano::EVENT_TREE)?;
                    let filled = pico_nano::fill_histograms(&specs, tree)?;
                    match &mut results {
                        None => results = Some(filled),
                        Some(results) => {
                            for (sum, hist) in results.iter_mut().zip(&filled) {
                                sum.add(hist)?;
                            }
                        }
                    }
                }
                let results = results
                    .ok_or_else(|| Error::Config(format!("sample '{}' has no files", self.name)))?;
                results
                    .into_iter()
                    .map(|r| {
                        let mut h = r.into_2d()?;
                        h.scale(self.norm * self.scale);
                        Ok(h)
                    })
                    .collect()
            }
        }
    }
}

//! The per-chunk event loop.
//!
//! Opens every input (fetching through the storage layer when the URL is not
//! directly readable), applies the event window, the pre-selection cut and
//! the certified-run filter, runs the configured analysis module chain per
//! event, and writes one output file with the skimmed `Events` tree and the
//! `cutflow` histogram.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pico_core::{DataKind, Error, InputFile, Result, console};
use pico_nano::{CompiledExpr, Event, Hist1D, NanoFile, Tree};
use pico_storage::storage_for;

use crate::bookkeeper::{Bookkeeper, FileCounts};
use crate::certified::CertifiedLumis;
use crate::module::{AnalysisModule, EventContext, FileContext, ModuleOptions};
use crate::registry::ModuleRegistry;

const GENWEIGHT: &str = "genweight";

/// Everything one chunk needs to run.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Analysis-module identifier; a comma-separated list runs the modules
    /// as a chain in declaration order.
    pub module: String,
    /// Module constructor options.
    pub options: ModuleOptions,
    /// Channel label (drives the output file name).
    pub channel: String,
    /// Era label.
    pub era: String,
    /// Sample kind; data enables the certified-run filter.
    pub kind: DataKind,
    /// Input files, each with an optional event window.
    pub infiles: Vec<InputFile>,
    /// Local directory the output is written to.
    pub outdir: PathBuf,
    /// Storage URL the output is copied to after a successful run.
    pub copydir: Option<String>,
    /// File-name tag (`_<channel><tag>_<chunk>`).
    pub tag: String,
    /// Cap on processed events (test runs); `None` = no cap.
    pub maxevts: Option<u64>,
    /// Pre-selection cut applied before any module runs.
    pub preselect: Option<String>,
    /// Certification JSON for data.
    pub json: Option<PathBuf>,
    /// Copy inputs to local scratch before opening.
    pub prefetch: bool,
    /// Open retries per input file.
    pub retries: u32,
}

impl ProcessorConfig {
    /// Output file name for this chunk.
    pub fn outfname(&self) -> String {
        format!("pico_{}{}.json", self.channel, self.tag)
    }
}

/// Result of a chunk run.
#[derive(Debug)]
pub struct RunReport {
    /// Path of the written output file.
    pub outfile: PathBuf,
    /// Events written to the output tree.
    pub written: u64,
    /// The accumulated cutflow.
    pub cutflow: Hist1D,
}

fn fetch_input(url: &str, prefetch: bool, retries: u32, scratch: &Path) -> Result<(PathBuf, bool)> {
    let direct = Path::new(url);
    if direct.is_file() && !prefetch {
        return Ok((direct.to_path_buf(), false));
    }
    std::fs::create_dir_all(scratch)?;
    let local = scratch.join(
        Path::new(url).file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "input.json".into()),
    );
    let mut last_err = None;
    for attempt in 0..=retries {
        let result = if direct.is_file() {
            std::fs::copy(url, &local).map(|_| ()).map_err(|e| Error::storage(format!("cp {url}"), e.to_string()))
        } else {
            storage_for(url).and_then(|s| s.cp(url, &local.to_string_lossy()))
        };
        match result {
            Ok(()) => return Ok((local, true)),
            Err(e) => {
                if attempt < retries {
                    console::warn(format!("retrying fetch of {url} ({e})"));
                }
                last_err = Some(e);
            }
        }
    }
    Err(Error::EventFile(format!(
        "giving up on {url} after {} attempts: {}",
        retries + 1,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

struct PreselMask {
    values: Vec<f64>,
}

impl PreselMask {
    fn build(expr: Option<&CompiledExpr>, tree: &Tree) -> Result<Option<PreselMask>> {
        let Some(expr) = expr else { return Ok(None) };
        let mut columns: HashMap<String, Vec<f64>> = HashMap::new();
        for branch in &expr.branches {
            columns.insert(branch.clone(), tree.scalar_f64(branch)?);
        }
        let cols: Vec<&[f64]> =
            expr.branches.iter().map(|b| columns[b].as_slice()).collect();
        Ok(Some(PreselMask { values: expr.eval_bulk(&cols, tree.nevents() as usize) }))
    }

    fn passes(&self, index: usize) -> bool {
        self.values[index] > 0.0
    }
}

/// Run one chunk. Fatal errors (unknown module, unreadable input after
/// retries, malformed JSON, module failure) abort the whole chunk; a chunk
/// that selects zero events still produces a valid output with a cutflow.
pub fn run(cfg: &ProcessorConfig, registry: &ModuleRegistry) -> Result<RunReport> {
    // Resolve everything fallible before any event is read.
    let mut modules: Vec<Box<dyn AnalysisModule>> = cfg
        .module
        .split(',')
        .map(|name| registry.resolve(name.trim(), &cfg.options))
        .collect::<Result<_>>()?;
    let presel = cfg.preselect.as_deref().map(CompiledExpr::compile).transpose()?;
    let certified = match (&cfg.json, cfg.kind) {
        (Some(path), DataKind::Data) => Some(CertifiedLumis::load(path)?),
        _ => None,
    };
    if cfg.kind == DataKind::Data && certified.is_none() {
        console::warn(format!("no certification JSON for data chunk '{}'", cfg.outfname()));
    }

    std::fs::create_dir_all(&cfg.outdir)?;
    let scratch = std::env::temp_dir().join(format!("pico_prefetch.{}", std::process::id()));

    let mut out_file = NanoFile::new();
    let mut out_tree = Tree::new(pico_nano::EVENT_TREE);
    let mut bookkeeper = Bookkeeper::new();
    let mut budget = cfg.maxevts;

    for module in &mut modules {
        module.begin_job().map_err(|e| Error::module(module.name(), e.to_string()))?;
    }

    for input in &cfg.infiles {
        let (local, staged) = fetch_input(&input.url, cfg.prefetch, cfg.retries, &scratch)?;
        let in_file = NanoFile::open(&local)?;
        let in_tree = in_file.tree(pico_nano::EVENT_TREE)?;
        let ntot = in_tree.nevents();

        let (first, assigned) = match input.range {
            Some((first, count)) => {
                let first = first.min(ntot);
                (first, count.min(ntot - first))
            }
            None => (0, ntot),
        };
        let count = match budget {
            Some(remaining) => assigned.min(remaining),
            None => assigned,
        };
        // For a windowed input this chunk owns only its window, so the
        // `full` stage counts the window; summed over a file's chunks this
        // reproduces the file total without double counting.
        let full = if input.range.is_some() { assigned } else { ntot };

        let mut ctx = FileContext {
            in_file: &in_file,
            in_tree,
            out_file: &mut out_file,
            out_tree: &mut out_tree,
        };
        for module in &mut modules {
            module.begin_file(&mut ctx).map_err(|e| Error::module(module.name(), e.to_string()))?;
        }

        let weights: Option<Vec<f64>> = in_tree
            .has_branch(GENWEIGHT)
            .then(|| in_tree.scalar_f64(GENWEIGHT))
            .transpose()?;
        let wgt = |i: u64| weights.as_ref().map_or(1.0, |w| w[i as usize]);
        let presel_mask = PreselMask::build(presel.as_ref(), in_tree)?;

        let mut counts = FileCounts {
            full,
            read: count,
            full_wgt: if input.range.is_some() {
                (first..first + assigned).map(wgt).sum()
            } else {
                (0..ntot).map(wgt).sum()
            },
            read_wgt: (first..first + count).map(wgt).sum(),
            ..Default::default()
        };

        for index in first..first + count {
            if let Some(mask) = &presel_mask
                && !mask.passes(index as usize)
            {
                continue;
            }
            let event = Event::new(in_tree, index as usize)?;
            if let Some(cert) = &certified {
                let run = event.i64("run")? as u32;
                let lumi = event.i64("luminosityBlock")? as u32;
                if !cert.contains(run, lumi) {
                    continue;
                }
            }
            counts.skim += 1;
            counts.skim_wgt += wgt(index);

            let mut event_ctx = EventContext::new(event);
            // Modules run in declaration order; the first falsy verdict
            // drops the event.
            let mut passed = true;
            for module in &mut modules {
                if !module
                    .analyze(&mut event_ctx)
                    .map_err(|e| Error::module(module.name(), e.to_string()))?
                {
                    passed = false;
                    break;
                }
            }
            if passed {
                out_tree.fill(&event_ctx.into_output())?;
                counts.pass += 1;
                counts.pass_wgt += wgt(index);
            }
        }

        let mut ctx = FileContext {
            in_file: &in_file,
            in_tree,
            out_file: &mut out_file,
            out_tree: &mut out_tree,
        };
        for module in &mut modules {
            module.end_file(&mut ctx).map_err(|e| Error::module(module.name(), e.to_string()))?;
        }
        bookkeeper.add_file(&counts)?;
        if let Some(remaining) = &mut budget {
            *remaining = remaining.saturating_sub(counts.read);
        }
        if staged {
            let _ = std::fs::remove_file(&local);
        }
    }

    for module in &mut modules {
        module.end_job().map_err(|e| Error::module(module.name(), e.to_string()))?;
    }

    let written = out_tree.nevents();
    if written == 0 {
        console::warn(format!("chunk '{}' selected zero events", cfg.outfname()));
    }

    let cutflow = bookkeeper.cutflow().clone();
    out_file.put_hist(cutflow.clone());
    out_file.put_tree(out_tree);
    let outfile = cfg.outdir.join(cfg.outfname());
    out_file.save(&outfile)?;

    if let Some(copydir) = &cfg.copydir {
        let storage = storage_for(copydir)?;
        storage.ensure_dir("$PATH")?;
        let target = format!("{}/{}", copydir.trim_end_matches('/'), cfg.outfname());
        storage.cp(&outfile.to_string_lossy(), &target)?;
    }
    let _ = std::fs::remove_dir_all(&scratch);

    Ok(RunReport { outfile, written, cutflow })
}

//! Branch-preserving skim.
//!
//! Copies events through unchanged (the pre-selection cut and certified-run
//! filter have already been applied by the event loop), optionally keeping
//! only branches matching the `keep` glob list.

use pico_core::{Result, match_glob};

use crate::module::{AnalysisModule, EventContext, FileContext, ModuleOptions};

/// The skim passthrough module.
pub struct SkimModule {
    keep: Vec<String>,
    branches: Vec<String>,
}

impl SkimModule {
    /// Construct from module options (`keep` = comma-separated globs).
    pub fn from_options(opts: &ModuleOptions) -> Result<Box<dyn AnalysisModule>> {
        let keep = opts.get_str("keep", "");
        let keep = if keep.is_empty() {
            Vec::new()
        } else {
            keep.split(',').map(|s| s.trim().to_string()).collect()
        };
        Ok(Box::new(SkimModule { keep, branches: Vec::new() }))
    }

    fn kept(&self, branch: &str) -> bool {
        self.keep.is_empty() || self.keep.iter().any(|pat| match_glob(branch, pat))
    }
}

impl AnalysisModule for SkimModule {
    fn name(&self) -> &str {
        "Skim"
    }

    fn begin_file(&mut self, ctx: &mut FileContext<'_>) -> Result<()> {
        self.branches.clear();
        for name in ctx.in_tree.branch_names() {
            if self.kept(name) {
                self.branches.push(name.to_string());
                let column = ctx.in_tree.branch(name)?;
                let empty = match column {
                    pico_nano::Column::F64(_) => pico_nano::Column::F64(Vec::new()),
                    pico_nano::Column::I64(_) => pico_nano::Column::I64(Vec::new()),
                    pico_nano::Column::JaggedF64(_) => pico_nano::Column::JaggedF64(Vec::new()),
                    pico_nano::Column::JaggedI64(_) => pico_nano::Column::JaggedI64(Vec::new()),
                };
                ctx.out_tree.declare(name, empty)?;
            }
        }
        Ok(())
    }

    fn analyze(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        for branch in &self.branches {
            let cell = ctx.event.cell(branch)?;
            ctx.fill_output(branch.clone(), cell);
        }
        Ok(true)
    }
}

//! μτh pair selection.
//!
//! Picks the leading isolated muon and the leading identified hadronic tau
//! separated by ΔR > 0.5 and writes a flat pair tuple. This is the reference
//! channel module; analysis-specific selections belong in their own modules.

use pico_core::Result;
use pico_nano::Cell;
use pico_nano::tree::Column;

use crate::module::{AnalysisModule, EventContext, FileContext, ModuleOptions};

const GENWEIGHT: &str = "genweight";

fn wp_threshold(wp: &str) -> f64 {
    match wp {
        "VVVLoose" => 1.0,
        "VVLoose" => 2.0,
        "VLoose" => 4.0,
        "Loose" => 8.0,
        "Medium" => 16.0,
        "Tight" => 32.0,
        "VTight" => 64.0,
        "VVTight" => 128.0,
        _ => 16.0,
    }
}

/// The μτh channel module.
pub struct MuTauModule {
    mu_ptcut: f64,
    tau_ptcut: f64,
    mu_isocut: f64,
    tau_wp: f64,
}

impl MuTauModule {
    /// Construct from module options (`ptcut`, `tauptcut`, `isocut`, `wp`).
    pub fn from_options(opts: &ModuleOptions) -> Result<Box<dyn AnalysisModule>> {
        Ok(Box::new(MuTauModule {
            mu_ptcut: opts.get_f64("ptcut", 25.0),
            tau_ptcut: opts.get_f64("tauptcut", 20.0),
            mu_isocut: opts.get_f64("isocut", 0.15),
            tau_wp: wp_threshold(&opts.get_str("wp", "Medium")),
        }))
    }
}

impl AnalysisModule for MuTauModule {
    fn name(&self) -> &str {
        "MuTau"
    }

    fn begin_file(&mut self, ctx: &mut FileContext<'_>) -> Result<()> {
        let out = &mut *ctx.out_tree;
        for branch in ["run", "luminosityBlock", "q_1", "q_2", "genmatch_2"] {
            out.declare(branch, Column::I64(Vec::new()))?;
        }
        for branch in [
            "pt_1", "eta_1", "phi_1", "iso_1", "pt_2", "eta_2", "phi_2", "m_vis", "dR_ll",
            GENWEIGHT,
        ] {
            out.declare(branch, Column::F64(Vec::new()))?;
        }
        Ok(())
    }

    fn analyze(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let event = ctx.event;

        let muons = event.collection("Muon")?;
        let mut muon = None;
        for m in &muons {
            if m.pt()? > self.mu_ptcut
                && m.eta()?.abs() < 2.4
                && m.get("iso")? < self.mu_isocut
            {
                muon = Some(*m);
                break;
            }
        }
        let Some(muon) = muon else { return Ok(false) };

        let taus = event.collection("Tau")?;
        let mut tau = None;
        for t in &taus {
            if t.pt()? > self.tau_ptcut
                && t.eta()?.abs() < 2.3
                && t.get("idDeepTauVSjet")? >= self.tau_wp
                && t.delta_r(&muon)? > 0.5
            {
                tau = Some(*t);
                break;
            }
        }
        let Some(tau) = tau else { return Ok(false) };

        let m_vis = (muon.p4()? + tau.p4()?).mass();
        let genweight =
            if event.tree().has_branch(GENWEIGHT) { event.f64(GENWEIGHT)? } else { 1.0 };
        let genmatch = if event.tree().has_branch("Tau_genmatch") {
            tau.get_i64("genmatch")?
        } else {
            -1
        };

        for (branch, value) in [("run", "run"), ("luminosityBlock", "luminosityBlock")] {
            let v = if event.tree().has_branch(value) { event.i64(value)? } else { 0 };
            ctx.fill_output(branch, Cell::I64(v));
        }
        ctx.fill_output("pt_1", Cell::F64(muon.pt()?));
        ctx.fill_output("eta_1", Cell::F64(muon.eta()?));
        ctx.fill_output("phi_1", Cell::F64(muon.phi()?));
        ctx.fill_output("iso_1", Cell::F64(muon.get("iso")?));
        ctx.fill_output("q_1", Cell::I64(muon.get_i64("charge")?));
        ctx.fill_output("pt_2", Cell::F64(tau.pt()?));
        ctx.fill_output("eta_2", Cell::F64(tau.eta()?));
        ctx.fill_output("phi_2", Cell::F64(tau.phi()?));
        ctx.fill_output("q_2", Cell::I64(tau.get_i64("charge")?));
        ctx.fill_output("m_vis", Cell::F64(m_vis));
        ctx.fill_output("dR_ll", Cell::F64(muon.delta_r(&tau)?));
        ctx.fill_output("genmatch_2", Cell::I64(genmatch));
        ctx.fill_output(GENWEIGHT, Cell::F64(genweight));
        Ok(true)
    }
}

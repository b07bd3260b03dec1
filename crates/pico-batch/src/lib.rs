//! # pico-batch
//!
//! The batch orchestrator: splits samples into job chunks (by files or by
//! events), writes job-config sidecars and task lists, submits to HTCondor /
//! SLURM / SGE, classifies per-chunk state from on-disk artefacts and
//! scheduler records, resubmits what is missing, and merges finished chunk
//! outputs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod chunks;
pub mod htcondor;
pub mod jobcfg;
pub mod lifecycle;
pub mod sge;
pub mod slurm;

use pico_core::{Error, Result};

pub use batch::{BatchSystem, Job, JobStatus, SubmitRequest, parse_jobs};
pub use chunks::{chunkify, chunkify_by_evts, partition, probe_counts};
pub use htcondor::HtCondor;
pub use jobcfg::{JobConfig, latest_config};
pub use lifecycle::{
    ChunkReport, ChunkState, JobSettings, SubmitMode, Submission, check_chunks, hadd_sample,
    print_report, submit_sample,
};
pub use sge::Sge;
pub use slurm::Slurm;

/// Select a batch back-end by name.
pub fn batch_for(system: &str) -> Result<Box<dyn BatchSystem>> {
    match system {
        "HTCondor" => Ok(Box::new(HtCondor::new())),
        "SLURM" => Ok(Box::new(Slurm::new())),
        "SGE" => Ok(Box::new(Sge::new())),
        other => Err(Error::Config(format!(
            "unknown batch system '{other}' (choose HTCondor, SLURM, SGE)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_factory() {
        assert_eq!(batch_for("HTCondor").unwrap().system(), "HTCondor");
        assert_eq!(batch_for("SLURM").unwrap().system(), "SLURM");
        assert_eq!(batch_for("SGE").unwrap().system(), "SGE");
        assert!(batch_for("LSF").is_err());
    }
}

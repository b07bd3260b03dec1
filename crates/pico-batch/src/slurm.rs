//! SLURM back-end: array jobs, one task per task-list line.

use regex::Regex;

use pico_core::Result;

use crate::batch::{BatchSystem, Job, JobStatus, SubmitRequest, parse_jobs, scheduler_cmd};

/// The SLURM scheduler.
pub struct Slurm {
    jobid_re: Regex,
    user: String,
}

impl Slurm {
    /// New back-end for the current user.
    pub fn new() -> Self {
        Slurm {
            jobid_re: Regex::new(r"Submitted batch job (\d+)").unwrap(),
            user: std::env::var("USER").unwrap_or_default(),
        }
    }

    fn map_status(status: &str) -> JobStatus {
        match status {
            "PD" => JobStatus::Queued,
            "R" | "CG" => JobStatus::Running,
            "CD" => JobStatus::Complete,
            "F" | "NF" | "CA" | "TO" | "OOM" => JobStatus::Failed,
            _ => JobStatus::Unknown,
        }
    }
}

impl Default for Slurm {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchSystem for Slurm {
    fn system(&self) -> &str {
        "SLURM"
    }

    fn submit(&self, req: &SubmitRequest) -> Result<u64> {
        let mut cmd = String::from("sbatch");
        if !req.name.is_empty() {
            cmd.push_str(&format!(" -J {}", req.name));
        }
        if let Some(array) = req.array {
            cmd.push_str(&format!(" -a 1-{array}"));
        }
        if let Some(queue) = &req.queue {
            cmd.push_str(&format!(" --partition {queue}"));
        }
        if let Some(logdir) = &req.logdir {
            // $JOBNAME.$JOBID.$TASKID.log
            cmd.push_str(&format!(" -o {}/%x.%A.%a.log", logdir.display()));
        }
        if let Some(time) = &req.time {
            cmd.push_str(&format!(" --time='{time}'"));
        }
        if let Some(opts) = &req.options {
            cmd.push_str(&format!(" {opts}"));
        }
        cmd.push_str(&format!(" {}", req.script.display()));
        if let Some(tasklist) = &req.tasklist {
            cmd.push_str(&format!(" {}", tasklist.display()));
        }
        let out = scheduler_cmd(&cmd, req.dry)?;
        Ok(self
            .jobid_re
            .captures(&out)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0))
    }

    fn status(&self, jobid: u64, taskid: i64) -> Result<String> {
        let id = if taskid >= 0 { format!("{jobid}_{taskid}") } else { jobid.to_string() };
        scheduler_cmd(&format!("squeue -j {id}"), false)
    }

    fn jobs(&self, jobids: &[u64]) -> Result<Vec<Job>> {
        let mut cmd = format!("squeue -u {} --array -h", self.user);
        if !jobids.is_empty() {
            let ids: Vec<String> = jobids.iter().map(|j| j.to_string()).collect();
            cmd.push_str(&format!(" -j {}", ids.join(",")));
        }
        cmd.push_str(" -o '%u %F %K %t %o'"); // user jobid taskid status args
        let rows = scheduler_cmd(&cmd, false)?;
        Ok(parse_jobs(&rows, Self::map_status))
    }
}

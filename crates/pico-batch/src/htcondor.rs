//! HTCondor back-end.
//!
//! Submission extends the submit description with `-queue arg from
//! <tasklist>` so that every task-list line becomes one task of the cluster.

use regex::Regex;

use pico_core::Result;

use crate::batch::{BatchSystem, Job, JobStatus, SubmitRequest, parse_jobs, scheduler_cmd};

/// The HTCondor scheduler.
pub struct HtCondor {
    jobid_re: Regex,
}

impl HtCondor {
    /// New back-end.
    pub fn new() -> Self {
        HtCondor { jobid_re: Regex::new(r"submitted to cluster (\d+)").unwrap() }
    }

    fn map_status(status: &str) -> JobStatus {
        // JobStatus integers of the condor job classad.
        match status {
            "1" => JobStatus::Queued,
            "2" | "3" => JobStatus::Running,
            "4" => JobStatus::Complete,
            "5" | "6" => JobStatus::Failed,
            _ => JobStatus::Unknown,
        }
    }
}

impl Default for HtCondor {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchSystem for HtCondor {
    fn system(&self) -> &str {
        "HTCondor"
    }

    fn submit(&self, req: &SubmitRequest) -> Result<u64> {
        let mut cmd = String::from("condor_submit");
        if !req.name.is_empty() {
            cmd.push_str(&format!(" -batch-name {}", req.name));
        }
        if let Some(opts) = &req.options {
            cmd.push_str(&format!(" {opts}"));
        }
        if let Some(queue) = &req.queue {
            cmd.push_str(&format!(" -append +JobFlavour={queue}"));
        }
        if let Some(time) = &req.time {
            cmd.push_str(&format!(" -append +MaxRuntime={}", parse_seconds(time)));
        }
        if let Some(logdir) = &req.logdir {
            cmd.push_str(&format!(
                " -append log={}/$(ClusterId).$(ProcId).log",
                logdir.display()
            ));
        }
        cmd.push_str(&format!(" {}", req.script.display()));
        if let Some(tasklist) = &req.tasklist {
            cmd.push_str(&format!(" -queue arg from {}", tasklist.display()));
        }
        let out = scheduler_cmd(&cmd, req.dry)?;
        Ok(self
            .jobid_re
            .captures(&out)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0))
    }

    fn status(&self, jobid: u64, taskid: i64) -> Result<String> {
        let id = if taskid >= 0 { format!("{jobid}.{taskid}") } else { jobid.to_string() };
        scheduler_cmd(&format!("condor_q -wide {id}"), false)
    }

    fn jobs(&self, jobids: &[u64]) -> Result<Vec<Job>> {
        let mut cmd = String::from("condor_q");
        for jobid in jobids {
            cmd.push_str(&format!(" {jobid}"));
        }
        cmd.push_str(
            " -format '%s ' Owner -format '%s ' ClusterId -format '%s ' ProcId \
             -format '%s ' JobStatus -format '%s\\n' Args",
        );
        let rows = scheduler_cmd(&cmd, false)?;
        Ok(parse_jobs(&rows, Self::map_status))
    }
}

/// Convert `HH:MM[:SS]` or plain seconds to seconds.
fn parse_seconds(time: &str) -> u64 {
    let parts: Vec<&str> = time.split(':').collect();
    match parts.as_slice() {
        [h, m, s] => {
            3600 * h.parse().unwrap_or(0) + 60 * m.parse().unwrap_or(0) + s.parse().unwrap_or(0)
        }
        [h, m] => 3600 * h.parse().unwrap_or(0) + 60 * m.parse().unwrap_or(0),
        [s] => s.parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_parsing() {
        assert_eq!(parse_seconds("04:20:00"), 15600);
        assert_eq!(parse_seconds("04:20"), 15600);
        assert_eq!(parse_seconds("360"), 360);
    }

    #[test]
    fn condor_status_mapping() {
        assert_eq!(HtCondor::map_status("1"), JobStatus::Queued);
        assert_eq!(HtCondor::map_status("2"), JobStatus::Running);
        assert_eq!(HtCondor::map_status("4"), JobStatus::Complete);
        assert_eq!(HtCondor::map_status("5"), JobStatus::Failed);
        assert_eq!(HtCondor::map_status("9"), JobStatus::Unknown);
    }
}

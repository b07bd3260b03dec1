//! SGE back-end: task arrays via `qsub -t`.

use regex::Regex;

use pico_core::Result;

use crate::batch::{BatchSystem, Job, JobStatus, SubmitRequest, parse_jobs, scheduler_cmd};

/// The Sun Grid Engine scheduler.
pub struct Sge {
    jobid_re: Regex,
    user: String,
}

impl Sge {
    /// New back-end for the current user.
    pub fn new() -> Self {
        Sge {
            jobid_re: Regex::new(r"Your job(?:-array)? (\d+)").unwrap(),
            user: std::env::var("USER").unwrap_or_default(),
        }
    }

    fn map_status(status: &str) -> JobStatus {
        match status {
            "qw" | "hqw" => JobStatus::Queued,
            "r" | "t" => JobStatus::Running,
            s if s.contains('E') => JobStatus::Failed,
            _ => JobStatus::Unknown,
        }
    }
}

impl Default for Sge {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchSystem for Sge {
    fn system(&self) -> &str {
        "SGE"
    }

    fn submit(&self, req: &SubmitRequest) -> Result<u64> {
        let mut cmd = String::from("qsub");
        if !req.name.is_empty() {
            cmd.push_str(&format!(" -N {}", req.name));
        }
        if let Some(array) = req.array {
            cmd.push_str(&format!(" -t 1-{array}"));
        }
        if let Some(queue) = &req.queue {
            cmd.push_str(&format!(" -q {queue}"));
        }
        if let Some(logdir) = &req.logdir {
            cmd.push_str(&format!(" -o {0} -e {0}", logdir.display()));
        }
        if let Some(time) = &req.time {
            cmd.push_str(&format!(" -l h_rt={time}"));
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
        let mut cmd = format!("qstat -j {jobid}");
        if taskid >= 0 {
            cmd.push_str(&format!(" -t {taskid}"));
        }
        scheduler_cmd(&cmd, false)
    }

    fn jobs(&self, jobids: &[u64]) -> Result<Vec<Job>> {
        let cmd = format!(
            "qstat -u {} -g d | awk 'NR>2 {{print $4, $1, $10, $5, \"\"}}'",
            self.user
        );
        let rows = scheduler_cmd(&cmd, false)?;
        let mut jobs = parse_jobs(&rows, Self::map_status);
        if !jobids.is_empty() {
            jobs.retain(|j| jobids.contains(&j.jobid));
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sge_status_mapping() {
        assert_eq!(Sge::map_status("qw"), JobStatus::Queued);
        assert_eq!(Sge::map_status("r"), JobStatus::Running);
        assert_eq!(Sge::map_status("Eqw"), JobStatus::Failed);
        assert_eq!(Sge::map_status("d"), JobStatus::Unknown);
    }

    #[test]
    fn jobid_regex_matches_arrays() {
        let sge = Sge::new();
        assert_eq!(
            sge.jobid_re.captures("Your job-array 4711.1-10:1 has been submitted").unwrap()[1]
                .to_string(),
            "4711"
        );
        assert_eq!(
            sge.jobid_re.captures("Your job 4712 has been submitted").unwrap()[1].to_string(),
            "4712"
        );
    }
}

//! The abstract batch-system interface.

use std::path::PathBuf;

use pico_core::{Error, Result};

/// Normalized job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Queued / pending / idle.
    Queued,
    /// Running.
    Running,
    /// Complete.
    Complete,
    /// Failed / held / cancelled.
    Failed,
    /// Unknown or fallen out of the scheduler's history.
    Unknown,
}

impl JobStatus {
    /// One-letter spelling used in status tables.
    pub fn letter(&self) -> char {
        match self {
            JobStatus::Queued => 'q',
            JobStatus::Running => 'r',
            JobStatus::Complete => 'c',
            JobStatus::Failed => 'f',
            JobStatus::Unknown => '?',
        }
    }

    /// Queued or running.
    pub fn is_live(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

/// One scheduler task.
#[derive(Debug, Clone)]
pub struct Job {
    /// Cluster / batch job id.
    pub jobid: u64,
    /// Task id within an array job; `-1` when the job is not an array.
    pub taskid: i64,
    /// Normalized status.
    pub status: JobStatus,
    /// The exact command line the scheduler launched, used to map the job
    /// back to its chunk.
    pub args: String,
}

/// A submission request.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    /// Job script to execute per task.
    pub script: PathBuf,
    /// Task list file: one argument line per chunk.
    pub tasklist: Option<PathBuf>,
    /// Job name.
    pub name: String,
    /// Queue / partition / job flavor.
    pub queue: Option<String>,
    /// Wall-time request.
    pub time: Option<String>,
    /// Array size (one task per task-list line).
    pub array: Option<u64>,
    /// Directory for scheduler log files.
    pub logdir: Option<PathBuf>,
    /// Extra scheduler options, passed through verbatim.
    pub options: Option<String>,
    /// Print the submission command without executing it.
    pub dry: bool,
}

/// A batch back-end (HTCondor, SLURM, SGE).
pub trait BatchSystem: Send + Sync {
    /// Back-end name.
    fn system(&self) -> &str;

    /// Submit a job (array); returns the scheduler job id, `0` on dry runs.
    fn submit(&self, req: &SubmitRequest) -> Result<u64>;

    /// Raw status text of one job (diagnostics).
    fn status(&self, jobid: u64, taskid: i64) -> Result<String>;

    /// Normalized job list, optionally restricted to the given job ids.
    fn jobs(&self, jobids: &[u64]) -> Result<Vec<Job>>;
}

/// Parse scheduler rows of the common `user jobid taskid status args` shape
/// shared by all back-ends; `map_status` normalizes the scheduler-specific
/// status column.
pub fn parse_jobs(rows: &str, map_status: impl Fn(&str) -> JobStatus) -> Vec<Job> {
    let mut jobs = Vec::new();
    for line in rows.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(_user), Some(jobid), Some(taskid), Some(status)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let Ok(jobid) = jobid.parse::<u64>() else { continue };
        let taskid = taskid.parse::<i64>().unwrap_or(-1);
        let args: String = fields.collect::<Vec<_>>().join(" ");
        jobs.push(Job { jobid, taskid, status: map_status(status), args });
    }
    jobs
}

/// Run a scheduler command and capture stdout.
pub(crate) fn scheduler_cmd(cmd: &str, dry: bool) -> Result<String> {
    tracing::debug!(cmd, dry, "batch command");
    if dry {
        pico_core::console::say(format!("dry: {cmd}"));
        return Ok(String::new());
    }
    let output = std::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .map_err(|e| Error::Batch(format!("`{cmd}`: {e}")))?;
    if !output.status.success() {
        return Err(Error::Batch(format!(
            "`{cmd}`: exit {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_common_rows() {
        let rows = "\
tau 12345 0 2 run -y UL2018 -c mutau -i a.json
tau 12345 1 1 run -y UL2018 -c mutau -i b.json
garbage line
tau 12346 -1 4 run -y UL2018 -c etau -i c.json";
        let jobs = parse_jobs(rows, |s| match s {
            "1" => JobStatus::Queued,
            "2" => JobStatus::Running,
            "4" => JobStatus::Complete,
            _ => JobStatus::Unknown,
        });
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].status, JobStatus::Running);
        assert_eq!(jobs[0].taskid, 0);
        assert!(jobs[0].args.contains("-i a.json"));
        assert_eq!(jobs[1].status, JobStatus::Queued);
        assert_eq!(jobs[2].taskid, -1);
        assert_eq!(jobs[2].status, JobStatus::Complete);
    }

    #[test]
    fn status_letters() {
        assert_eq!(JobStatus::Queued.letter(), 'q');
        assert_eq!(JobStatus::Unknown.letter(), '?');
        assert!(JobStatus::Running.is_live());
        assert!(!JobStatus::Failed.is_live());
    }
}

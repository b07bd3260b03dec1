//! The submission lifecycle: prepare chunks, submit, classify chunk state
//! from on-disk artefacts and scheduler records, resubmit, merge.
//!
//! Submission is idempotent and resumable. State derives primarily from the
//! output files on storage; scheduler records refine it (pending/running,
//! failed), and a scheduler that has lost its history degrades gracefully to
//! the artefact view.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Local;
use pico_core::{DataKind, Error, InputFile, Result, console, repkey, tagify};
use pico_producer::ModuleOptions;
use pico_sample::{Catalogue, Sample};
use pico_storage::storage_for;
use regex::Regex;

use crate::batch::{BatchSystem, JobStatus, SubmitRequest};
use crate::chunks::{chunkify, chunkify_by_evts, probe_counts};
use crate::jobcfg::{JobConfig, latest_config};

/// Per-sweep job settings (era/channel scope).
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Era label.
    pub era: String,
    /// Channel label.
    pub channel: String,
    /// User tag (suffix of job and output names).
    pub tag: String,
    /// Analysis-module identifier.
    pub module: String,
    /// Module options.
    pub options: ModuleOptions,
    /// Job directory pattern (configs and logs).
    pub jobdir_pat: String,
    /// Chunk output directory pattern.
    pub outdir_pat: String,
    /// Merged output directory pattern.
    pub picodir_pat: String,
    /// Files per job (file-based splitting).
    pub nfilesperjob: u64,
    /// Split into exactly this many chunks instead (0 disables).
    pub nchunks: u64,
    /// Maximum events per job (event-based splitting; 0 disables).
    pub maxevts: u64,
    /// Scheduler queue / partition / flavor.
    pub queue: Option<String>,
    /// Wall-time request.
    pub time: Option<String>,
    /// Extra scheduler options.
    pub batchopts: Option<String>,
    /// Prefetch inputs on the worker.
    pub prefetch: bool,
    /// Pre-selection cut.
    pub preselect: Option<String>,
    /// Certification JSON for data samples.
    pub json: Option<String>,
    /// Worker-pool width for event-count probing and output validation.
    pub ncores: usize,
    /// Prepare everything but do not submit.
    pub dry: bool,
}

impl JobSettings {
    fn postfix(&self) -> String {
        format!("_{}{}", self.channel, tagify(&self.tag))
    }

    fn expand(&self, pattern: &str, sample: &Sample) -> String {
        repkey(
            &sample.expand(pattern),
            &[("CHANNEL", &self.channel), ("TAG", &tagify(&self.tag))],
        )
    }
}

/// State of one chunk, derived from artefacts and scheduler records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Output exists (and validates) at the expected URL.
    Done,
    /// A live scheduler record is queued.
    Pending,
    /// A live scheduler record is running.
    Running,
    /// Scheduler reported failure, or the output is corrupt.
    Failed,
    /// No output and no live scheduler record.
    Missing,
}

/// Classification of every chunk of a sample.
#[derive(Debug, Default)]
pub struct ChunkReport {
    /// Chunk id → state.
    pub states: BTreeMap<u32, ChunkState>,
    /// Events counted in validated outputs.
    pub nproc: u64,
    /// Inputs of failed and missing chunks, for resubmission.
    pub resub_inputs: Vec<InputFile>,
}

impl ChunkReport {
    /// Number of chunks in a state.
    pub fn count(&self, state: ChunkState) -> usize {
        self.states.values().filter(|&&s| s == state).count()
    }

    /// Chunks that are not `Done`.
    pub fn non_final(&self) -> usize {
        self.states.len() - self.count(ChunkState::Done)
    }

    /// Chunk ids in a state.
    pub fn in_state(&self, state: ChunkState) -> Vec<u32> {
        self.states.iter().filter(|&(_, &s)| s == state).map(|(&id, _)| id).collect()
    }
}

/// Classify every chunk of a job config.
///
/// `validate` opens each locally readable output and counts its events;
/// an unreadable output counts as failed.
pub fn check_chunks(
    cfg: &JobConfig,
    batch: Option<&dyn BatchSystem>,
    validate: bool,
) -> Result<ChunkReport> {
    let storage = storage_for(&cfg.output)?;
    let pattern = format!("pico{}_[0-9]*.json", cfg.postfix);
    let outfiles = storage.list_files("$PATH", Some(&pattern)).unwrap_or_default();
    let chunk_re = Regex::new(&format!(r"{}_(\d+)\.json$", regex::escape(&cfg.postfix)))
        .map_err(|e| Error::Config(e.to_string()))?;

    let mut found: BTreeMap<u32, String> = BTreeMap::new();
    for url in outfiles {
        if let Some(caps) = chunk_re.captures(&url)
            && let Ok(chunk) = caps[1].parse::<u32>()
        {
            if found.contains_key(&chunk) {
                return Err(Error::Sanity(format!(
                    "chunk {chunk} of '{}' has more than one output file",
                    cfg.name
                )));
            }
            found.insert(chunk, url);
        }
    }

    // Scheduler view. A lost history leaves these empty; artefacts rule.
    let mut live: BTreeMap<u32, JobStatus> = BTreeMap::new();
    let mut batch_failed: Vec<u32> = Vec::new();
    if let Some(batch) = batch
        && !cfg.jobids.is_empty()
    {
        let args_re = Regex::new(r"-t \S*_(\d+)").map_err(|e| Error::Config(e.to_string()))?;
        let jobs = batch.jobs(&cfg.jobids).unwrap_or_default();
        for job in jobs {
            let chunk = if job.taskid >= 1 && (job.taskid as usize) <= cfg.chunks.len() {
                Some(cfg.chunks[job.taskid as usize - 1])
            } else {
                args_re.captures(&job.args).and_then(|c| c[1].parse().ok())
            };
            let Some(chunk) = chunk else { continue };
            match job.status {
                JobStatus::Queued | JobStatus::Running => {
                    live.insert(chunk, job.status);
                }
                JobStatus::Failed => batch_failed.push(chunk),
                _ => {}
            }
        }
    }

    let file_url = storage.file_url().to_string();
    let mut report = ChunkReport::default();
    for (&chunk, inputs) in &cfg.chunkdict {
        let state = if let Some(status) = live.get(&chunk) {
            if *status == JobStatus::Queued { ChunkState::Pending } else { ChunkState::Running }
        } else if let Some(url) = found.get(&chunk) {
            let local = url.strip_prefix(&file_url).unwrap_or(url);
            if validate && Path::new(local).is_file() {
                match pico_nano::count_events(local) {
                    Ok(n) => {
                        if let Some(expected) = cfg.chunk_expected_events(chunk)
                            && n > expected
                        {
                            console::warn(format!(
                                "chunk {chunk} of '{}' has {n} events, expected at most {expected}",
                                cfg.name
                            ));
                        }
                        report.nproc += n;
                        ChunkState::Done
                    }
                    Err(_) => ChunkState::Failed,
                }
            } else {
                ChunkState::Done
            }
        } else if batch_failed.contains(&chunk) {
            ChunkState::Failed
        } else {
            ChunkState::Missing
        };
        if matches!(state, ChunkState::Failed | ChunkState::Missing) {
            report.resub_inputs.extend(inputs.iter().cloned());
        }
        report.states.insert(chunk, state);
    }
    Ok(report)
}

/// Print the per-sample status summary; returns the number of non-final
/// chunks.
pub fn print_report(name: &str, report: &ChunkReport) -> usize {
    let mut table = console::Table::new(&["sample", "done", "pending", "running", "failed", "missing"]);
    table.row(&[
        name.to_string(),
        report.count(ChunkState::Done).to_string(),
        report.count(ChunkState::Pending).to_string(),
        report.count(ChunkState::Running).to_string(),
        report.count(ChunkState::Failed).to_string(),
        report.count(ChunkState::Missing).to_string(),
    ]);
    table.print();
    report.non_final()
}

/// submit vs resubmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Submit chunks that are missing; never touch failed/running/done.
    Submit,
    /// Also resubmit failed chunks.
    Resubmit,
}

/// Outcome of one sample submission.
#[derive(Debug)]
pub struct Submission {
    /// The sidecar written (or reused) for this submission.
    pub cfg: JobConfig,
    /// Chunks handed to the scheduler.
    pub nsubmitted: usize,
    /// Chunks already done.
    pub ndone: usize,
    /// Scheduler job id, if anything was submitted.
    pub jobid: Option<u64>,
}

fn task_line(cfg: &JobConfig, settings: &JobSettings, chunk: u32, inputs: &[InputFile]) -> String {
    let mut line = format!(
        "run -y {} -c {} -M {} -d {} --copydir {} -t {}_{chunk}",
        cfg.era,
        cfg.channel,
        cfg.module,
        cfg.dtype,
        cfg.output,
        tagify(&cfg.tag),
    );
    if cfg.prefetch {
        line.push_str(" -p");
    }
    if let Some(cut) = &cfg.cut {
        line.push_str(&format!(" --preselect '{cut}'"));
    }
    if let Some(json) = &cfg.json {
        line.push_str(&format!(" --json {json}"));
    }
    for opt in settings.options.encode() {
        line.push_str(&format!(" -E {opt}"));
    }
    let files: Vec<String> = inputs.iter().map(|f| f.encode()).collect();
    line.push_str(&format!(" -i {}", files.join(" ")));
    line
}

fn write_job_script(jobdir: &Path, batch: &dyn BatchSystem) -> Result<PathBuf> {
    let pico = std::env::current_exe()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "pico".to_string());
    let (name, content) = if batch.system() == "HTCondor" {
        (
            "submit_HTCondor.sub",
            format!(
                "universe   = vanilla\n\
                 executable = {pico}\n\
                 arguments  = \"$(arg)\"\n\
                 output     = log/job.$(ClusterId).$(ProcId).out\n\
                 error      = log/job.$(ClusterId).$(ProcId).out\n\
                 log        = log/job.$(ClusterId).$(ProcId).log\n\
                 getenv     = true\n\
                 initialdir = {dir}\n",
                dir = jobdir.display()
            ),
        )
    } else {
        (
            "submit_array.sh",
            format!(
                "#!/bin/sh\n\
                 # one task per line of the task list\n\
                 TASKLIST=\"$1\"\n\
                 TASKID=\"${{SLURM_ARRAY_TASK_ID:-${{SGE_TASK_ID:-1}}}}\"\n\
                 ARGS=$(sed -n \"${{TASKID}}p\" \"$TASKLIST\")\n\
                 eval \"set -- $ARGS\"\n\
                 exec {pico} \"$@\"\n"
            ),
        )
    };
    let path = jobdir.join(name);
    std::fs::write(&path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms)?;
    }
    Ok(path)
}

/// Submit (or resubmit) one sample.
///
/// Chunk state is consulted first; only `missing` chunks (plus `failed` on
/// resubmit) are handed to the scheduler, so repeating a submission with no
/// external change submits nothing.
pub fn submit_sample(
    sample: &mut Sample,
    settings: &JobSettings,
    catalogue: &dyn Catalogue,
    batch: &dyn BatchSystem,
    mode: SubmitMode,
) -> Result<Submission> {
    sample.validate()?;
    let postfix = settings.postfix();
    let jobdir = PathBuf::from(settings.expand(&settings.jobdir_pat, sample));
    let cfgdir = jobdir.join("config");
    let logdir = jobdir.join("log");
    let outdir = settings.expand(&settings.outdir_pat, sample);
    std::fs::create_dir_all(&cfgdir)?;
    std::fs::create_dir_all(&logdir)?;

    let previous = latest_config(&cfgdir, &postfix)?;
    let (mut cfg, new_chunks, ndone) = match previous {
        None => prepare_fresh(sample, settings, catalogue, &jobdir, &cfgdir, &logdir, &outdir)?,
        Some(prev) => {
            let report = check_chunks(&prev, Some(batch), true)?;
            let ndone = report.count(ChunkState::Done);
            let mut retry = report.in_state(ChunkState::Missing);
            if mode == SubmitMode::Resubmit {
                retry.extend(report.in_state(ChunkState::Failed));
            }
            if retry.is_empty() {
                console::say(format!(
                    "{}: nothing to submit ({ndone}/{} done)",
                    sample.name,
                    prev.chunkdict.len()
                ));
                return Ok(Submission { cfg: prev, nsubmitted: 0, ndone, jobid: None });
            }
            prepare_retry(sample, settings, prev, &retry, &cfgdir)?
                .map(|(cfg, chunks)| (cfg, chunks, ndone))
                .ok_or_else(|| Error::Sanity(format!("no inputs to retry for '{}'", sample.name)))?
        }
    };

    // Task list: one canonical producer command line per new chunk.
    let mut lines = Vec::with_capacity(new_chunks.len());
    cfg.chunks.clear();
    for &chunk in &new_chunks {
        let inputs = cfg.chunkdict[&chunk].clone();
        lines.push(task_line(&cfg, settings, chunk, &inputs));
        cfg.chunks.push(chunk);
    }
    std::fs::write(&cfg.joblist, lines.join("\n") + "\n")?;

    let script = write_job_script(&jobdir, batch)?;
    let request = SubmitRequest {
        script,
        tasklist: Some(PathBuf::from(&cfg.joblist)),
        name: format!("{}{}_{}", sample.name, postfix, settings.era),
        queue: settings.queue.clone(),
        time: settings.time.clone(),
        array: Some(new_chunks.len() as u64),
        logdir: Some(logdir),
        options: settings.batchopts.clone(),
        dry: settings.dry,
    };
    let jobid = batch.submit(&request)?;
    let jobid = if settings.dry { 0 } else { jobid };
    if !settings.dry {
        if jobid > 0 {
            cfg.jobids.push(jobid);
        }
        cfg.save()?;
    }
    console::say(format!(
        "{}: submitted {} chunk(s), {ndone} done (try {})",
        sample.name,
        new_chunks.len(),
        cfg.subtry
    ));
    Ok(Submission { cfg, nsubmitted: new_chunks.len(), ndone, jobid: (jobid > 0).then_some(jobid) })
}

type PreparedChunks = (JobConfig, Vec<u32>, usize);

fn prepare_fresh(
    sample: &mut Sample,
    settings: &JobSettings,
    catalogue: &dyn Catalogue,
    jobdir: &Path,
    cfgdir: &Path,
    logdir: &Path,
    outdir: &str,
) -> Result<PreparedChunks> {
    // Priority: user flag > sample override > none.
    let maxevts =
        if settings.maxevts > 0 { settings.maxevts } else { sample.maxevts.unwrap_or(0) };
    let nfilesperjob = if settings.nfilesperjob > 0 {
        settings.nfilesperjob
    } else {
        sample.nfilesperjob.unwrap_or(1)
    };

    let files: Vec<InputFile> =
        sample.get_files(catalogue, false)?.into_iter().map(InputFile::whole).collect();

    let (nevents, fchunks) = if maxevts > 0 {
        let counts = probe_counts(&files, &sample.file_nevents(), settings.ncores)?;
        for (url, n) in &counts {
            sample.set_file_nevents(url, *n);
        }
        if let Some(cache) = sample.filelist_path.clone() {
            // amortize future splits
            let _ = sample.write_filelist(cache);
        }
        chunkify_by_evts(&files, maxevts, &counts)?
    } else {
        let known = sample.file_nevents();
        let total = files.iter().map(|f| known.get(&f.url).copied().unwrap_or(0)).sum();
        let fchunks = if settings.nchunks > 0 {
            crate::chunks::partition(&files, settings.nchunks as usize)
        } else {
            chunkify(&files, nfilesperjob as usize)
        };
        (total, fchunks)
    };

    let mut chunkdict = BTreeMap::new();
    for (i, chunk) in fchunks.into_iter().enumerate() {
        chunkdict.insert(i as u32, chunk);
    }
    let new_chunks: Vec<u32> = chunkdict.keys().copied().collect();

    let postfix = settings.postfix();
    let subtry = 1;
    let cfg = JobConfig {
        time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        group: sample.group.clone(),
        name: sample.name.clone(),
        paths: sample.paths.clone(),
        subtry,
        channel: settings.channel.clone(),
        era: settings.era.clone(),
        tag: settings.tag.clone(),
        dtype: sample.kind,
        module: settings.module.clone(),
        options: settings
            .options
            .encode()
            .into_iter()
            .filter_map(|kv| kv.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
            .collect(),
        nevents,
        nfilesperjob,
        maxevts,
        prefetch: settings.prefetch,
        chunkdict,
        chunks: Vec::new(),
        output: outdir.to_string(),
        postfix: postfix.clone(),
        jobdir: jobdir.to_string_lossy().into_owned(),
        cfgdir: cfgdir.to_string_lossy().into_owned(),
        logdir: logdir.to_string_lossy().into_owned(),
        joblist: cfgdir.join(format!("jobarglist{postfix}_try{subtry}.txt")).to_string_lossy().into_owned(),
        cfgname: cfgdir.join(format!("jobconfig{postfix}_try{subtry}.json")).to_string_lossy().into_owned(),
        json: (sample.kind == DataKind::Data).then(|| settings.json.clone()).flatten(),
        cut: settings.preselect.clone(),
        jobids: Vec::new(),
        filenevts: sample.file_nevents(),
    };
    let ndone = 0;
    Ok((cfg, new_chunks, ndone))
}

fn prepare_retry(
    _sample: &Sample,
    settings: &JobSettings,
    prev: JobConfig,
    retry: &[u32],
    cfgdir: &Path,
) -> Result<Option<(JobConfig, Vec<u32>)>> {
    let mut inputs: Vec<InputFile> = Vec::new();
    let mut cfg = prev;
    for chunk in retry {
        if let Some(files) = cfg.chunkdict.remove(chunk) {
            inputs.extend(files);
        }
    }
    if inputs.is_empty() {
        return Ok(None);
    }

    // Reuse the previous splitting settings unless overridden.
    let maxevts = if settings.maxevts > 0 { settings.maxevts } else { cfg.maxevts };
    let nfilesperjob =
        if settings.nfilesperjob > 0 { settings.nfilesperjob } else { cfg.nfilesperjob };
    let fchunks = if maxevts > 0 {
        let counts = probe_counts(&inputs, &cfg.filenevts, settings.ncores)?;
        cfg.filenevts.extend(counts.clone());
        chunkify_by_evts(&inputs, maxevts, &counts)?.1
    } else {
        chunkify(&inputs, nfilesperjob.max(1) as usize)
    };

    let mut new_chunks = Vec::with_capacity(fchunks.len());
    for chunk in fchunks {
        let id = cfg.next_chunk_id();
        cfg.chunkdict.insert(id, chunk);
        new_chunks.push(id);
    }

    cfg.subtry += 1;
    cfg.maxevts = maxevts;
    cfg.nfilesperjob = nfilesperjob;
    cfg.time = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let postfix = cfg.postfix.clone();
    cfg.joblist = cfgdir
        .join(format!("jobarglist{postfix}_try{}.txt", cfg.subtry))
        .to_string_lossy()
        .into_owned();
    cfg.cfgname = cfgdir
        .join(format!("jobconfig{postfix}_try{}.json", cfg.subtry))
        .to_string_lossy()
        .into_owned();
    Ok(Some((cfg, new_chunks)))
}

/// Merge the chunk outputs of a fully done sample into one file under the
/// pico directory. Returns `false` (and keeps all chunk outputs) when any
/// chunk is not final and `force` is off.
pub fn hadd_sample(
    cfg: &JobConfig,
    picodir: &str,
    batch: Option<&dyn BatchSystem>,
    clean: bool,
    force: bool,
    dry: bool,
) -> Result<bool> {
    let report = check_chunks(cfg, batch, true)?;
    if report.non_final() > 0 && !force {
        console::warn(format!(
            "cannot merge '{}': {} chunk(s) need resubmission",
            cfg.name,
            report.non_final()
        ));
        return Ok(false);
    }

    let sources: Vec<String> = report
        .in_state(ChunkState::Done)
        .into_iter()
        .map(|chunk| format!("{}/{}", cfg.output.trim_end_matches('/'), cfg.chunk_outfname(chunk)))
        .collect();
    if sources.is_empty() {
        return Err(Error::Merge(format!("no done chunks to merge for '{}'", cfg.name)));
    }

    let outfile = format!("{}{}.json", cfg.name, cfg.postfix);
    let storage = storage_for(picodir)?;
    if dry {
        console::say(format!("dry: hadd {} file(s) -> {picodir}/{outfile}", sources.len()));
        return Ok(true);
    }
    storage.ensure_dir("$PATH")?;
    let via_tmp = !storage.mounted();
    storage.hadd(&sources, &outfile, via_tmp)?;

    // Verify the merged cutflow when the result is locally readable.
    let merged_path = storage.expand(&outfile);
    let local = merged_path.strip_prefix(storage.file_url()).unwrap_or(&merged_path);
    if Path::new(local).is_file() {
        let merged = pico_nano::NanoFile::open(local)?;
        let cutflow = merged
            .hist(pico_producer::CUTFLOW)
            .map_err(|_| Error::Merge(format!("merged file of '{}' has no cutflow", cfg.name)))?;
        pico_producer::check_cutflow(cutflow)?;
        let pass = cutflow.bin_content(pico_producer::bookkeeper::bins::PASS);
        let written = merged.tree(pico_nano::EVENT_TREE).map(|t| t.nevents()).unwrap_or(0);
        if (pass - written as f64).abs() > 0.5 {
            console::warn(format!(
                "merged '{}': cutflow pass={pass} but output tree has {written} events",
                cfg.name
            ));
        }
        if cfg.nevents > 0 && report.nproc != cfg.nevents {
            console::warn(format!(
                "merged '{}': processed {} events of {} expected",
                cfg.name, report.nproc, cfg.nevents
            ));
        }
    }

    if clean {
        let out_storage = storage_for(&cfg.output)?;
        for src in &sources {
            out_storage.rm(src)?;
        }
    }
    console::say(format!("merged '{}' ({} chunks) -> {outfile}", cfg.name, sources.len()));
    Ok(true)
}

//! submit / resubmit / status / hadd / clean sweeps.
//!
//! Sweeps iterate the cartesian product era × channel × sample in sorted
//! order so artefact paths are reproducible across runs.

use pico_batch::{JobSettings, SubmitMode, batch_for, check_chunks, latest_config, print_report};
use pico_core::{Result, console, repkey, tagify};
use pico_producer::ModuleOptions;
use pico_sample::{DasClient, Sample};
use pico_storage::storage_for;

use crate::config::Config;
use crate::{JobArgs, SelectArgs};

fn sorted(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items.dedup();
    items
}

fn settings_for(
    config: &Config,
    args: &JobArgs,
    era: &str,
    channel: &str,
    module: &str,
) -> Result<JobSettings> {
    Ok(JobSettings {
        era: era.to_string(),
        channel: channel.to_string(),
        tag: args.select.tag.clone(),
        module: module.to_string(),
        options: ModuleOptions::parse(&args.opts)?,
        jobdir_pat: config.jobdir.clone(),
        outdir_pat: config.outdir.clone(),
        picodir_pat: config.picodir.clone(),
        nfilesperjob: if args.filesperjob > 0 { args.filesperjob } else { config.nfilesperjob },
        nchunks: args.nchunks,
        maxevts: if args.maxevts > 0 { args.maxevts } else { config.maxevtsperjob },
        queue: args.queue.clone().or_else(|| {
            (!config.queue.is_empty()).then(|| config.queue.clone())
        }),
        time: args.time.clone(),
        batchopts: args.batchopts.clone().or_else(|| {
            (!config.batchopts.is_empty()).then(|| config.batchopts.clone())
        }),
        prefetch: args.prefetch,
        preselect: args.preselect.clone(),
        json: config.jsons.get(era).cloned(),
        ncores: config.ncores,
        dry: args.dry,
    })
}

/// Submit or resubmit all selected samples.
pub fn submit(config: &Config, args: &JobArgs, mode: SubmitMode) -> Result<()> {
    let batch = batch_for(&config.batch)?;
    let catalogue = DasClient::new();
    for era in sorted(args.select.eras.clone()) {
        for channel in sorted(args.select.channels.clone()) {
            console::header(format!("{era}, {channel}"));
            let module = config.channel_module(&channel)?.to_string();
            let samples = super::select_samples(config, &args.select, &era, &channel)?;
            if samples.is_empty() {
                console::warn(format!("no samples selected for {era}/{channel}"));
                continue;
            }
            let settings = settings_for(config, args, &era, &channel, &module)?;
            for mut sample in samples {
                console::say(&sample.name);
                pico_batch::submit_sample(&mut sample, &settings, &catalogue, batch.as_ref(), mode)?;
            }
        }
    }
    Ok(())
}

fn job_cfg_for(config: &Config, select: &SelectArgs, sample: &Sample, channel: &str) -> Result<Option<pico_batch::JobConfig>> {
    let tag = tagify(&select.tag);
    let jobdir = repkey(&sample.expand(&config.jobdir), &[("CHANNEL", channel), ("TAG", &tag)]);
    let cfgdir = std::path::Path::new(&jobdir).join("config");
    let postfix = format!("_{channel}{tag}");
    latest_config(&cfgdir, &postfix)
}

/// Print the chunk status of all selected samples; returns the number of
/// non-final chunks.
pub fn status(config: &Config, select: &SelectArgs) -> Result<usize> {
    let batch = batch_for(&config.batch)?;
    let mut nonfinal = 0;
    for era in sorted(select.eras.clone()) {
        for channel in sorted(select.channels.clone()) {
            console::header(format!("{era}, {channel}"));
            for sample in super::select_samples(config, select, &era, &channel)? {
                match job_cfg_for(config, select, &sample, &channel)? {
                    Some(cfg) => {
                        let report = check_chunks(&cfg, Some(batch.as_ref()), true)?;
                        nonfinal += print_report(&sample.name, &report);
                    }
                    None => console::warn(format!("no job config for '{}'", sample.name)),
                }
            }
        }
    }
    Ok(nonfinal)
}

/// Merge finished samples; returns the number of samples left unmerged.
pub fn hadd(
    config: &Config,
    select: &SelectArgs,
    clean: bool,
    force: bool,
    dry: bool,
) -> Result<usize> {
    let batch = batch_for(&config.batch)?;
    let tag = tagify(&select.tag);
    let mut unmerged = 0;
    for era in sorted(select.eras.clone()) {
        for channel in sorted(select.channels.clone()) {
            console::header(format!("{era}, {channel}"));
            for sample in super::select_samples(config, select, &era, &channel)? {
                let Some(cfg) = job_cfg_for(config, select, &sample, &channel)? else {
                    console::warn(format!("no job config for '{}'", sample.name));
                    unmerged += 1;
                    continue;
                };
                let picodir =
                    repkey(&sample.expand(&config.picodir), &[("CHANNEL", &channel), ("TAG", &tag)]);
                if !pico_batch::hadd_sample(&cfg, &picodir, Some(batch.as_ref()), clean, force, dry)? {
                    unmerged += 1;
                }
            }
        }
    }
    Ok(unmerged)
}

/// Remove the job artefacts (and optionally chunk outputs) of the selected
/// samples.
pub fn clean(config: &Config, select: &SelectArgs, outputs: bool) -> Result<()> {
    for era in sorted(select.eras.clone()) {
        for channel in sorted(select.channels.clone()) {
            for sample in super::select_samples(config, select, &era, &channel)? {
                let Some(cfg) = job_cfg_for(config, select, &sample, &channel)? else {
                    continue;
                };
                if outputs {
                    let storage = storage_for(&cfg.output)?;
                    for chunk in cfg.chunkdict.keys() {
                        let path = format!(
                            "{}/{}",
                            cfg.output.trim_end_matches('/'),
                            cfg.chunk_outfname(*chunk)
                        );
                        if storage.exists(&path) {
                            storage.rm(&path)?;
                        }
                    }
                }
                if std::path::Path::new(&cfg.jobdir).is_dir() {
                    std::fs::remove_dir_all(&cfg.jobdir)?;
                    console::say(format!("removed {}", cfg.jobdir));
                }
            }
        }
    }
    Ok(())
}

//! Local run of a single chunk.
//!
//! This is also the worker entry point: batch task-list lines are exactly
//! these arguments.

use std::path::PathBuf;

use clap::Args;
use pico_core::{DataKind, Error, InputFile, Result, console, tagify};
use pico_producer::{ModuleOptions, ModuleRegistry, ProcessorConfig};
use pico_sample::DasClient;

use crate::config::Config;

/// Arguments of `pico run`.
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Era
    #[arg(short = 'y', long = "era")]
    pub era: String,

    /// Channel
    #[arg(short = 'c', long = "channel")]
    pub channel: String,

    /// Analysis module (defaults to the channel's configured module)
    #[arg(short = 'M', long = "module")]
    pub module: Option<String>,

    /// Data type (data, mc, embed); detected from the sample when omitted
    #[arg(short = 'd', long = "dtype")]
    pub dtype: Option<String>,

    /// Input files (`URL` or `URL:first:count`); when omitted the first
    /// files of the matching sample are used
    #[arg(short = 'i', long = "infiles", num_args = 1..)]
    pub infiles: Vec<String>,

    /// Sample pattern for local test runs without explicit inputs
    #[arg(short = 's', long = "sample")]
    pub sample: Option<String>,

    /// Number of files for sample-based test runs
    #[arg(long = "nfiles", default_value_t = 1)]
    pub nfiles: usize,

    /// Local output directory
    #[arg(short = 'o', long = "outdir", default_value = "output")]
    pub outdir: PathBuf,

    /// Copy the output to this storage URL afterwards
    #[arg(long)]
    pub copydir: Option<String>,

    /// Tag suffix for the output name
    #[arg(short = 't', long = "tag", default_value = "")]
    pub tag: String,

    /// Maximum number of events to process
    #[arg(short = 'm', long = "maxevts")]
    pub maxevts: Option<u64>,

    /// Pre-selection cut
    #[arg(long)]
    pub preselect: Option<String>,

    /// Certification JSON (data)
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Prefetch inputs to local scratch
    #[arg(short = 'p', long)]
    pub prefetch: bool,

    /// Module options as key=value
    #[arg(short = 'E', long = "opt")]
    pub opts: Vec<String>,
}

/// Run one chunk locally.
pub fn run(config: &Config, args: &RunArgs) -> Result<()> {
    let module = match &args.module {
        Some(module) => module.clone(),
        None => config.channel_module(&args.channel)?.to_string(),
    };
    let registry = ModuleRegistry::builtin();
    if !registry.contains(&module) {
        return Err(Error::Config(format!("unknown analysis module '{module}'")));
    }

    let (infiles, kind, tag) = if !args.infiles.is_empty() {
        let kind = match &args.dtype {
            Some(d) => DataKind::parse(d)?,
            None => DataKind::Mc,
        };
        let infiles: Vec<InputFile> = args.infiles.iter().map(|f| InputFile::parse(f)).collect();
        (infiles, kind, tagify(&args.tag))
    } else {
        // Resolve the first files of the matching sample for a test run.
        let pattern = args.sample.clone().ok_or_else(|| {
            Error::Config("run needs either --infiles or --sample".to_string())
        })?;
        let select = crate::SelectArgs {
            eras: vec![args.era.clone()],
            channels: vec![args.channel.clone()],
            samples: vec![pattern.clone()],
            vetoes: Vec::new(),
            dtypes: Vec::new(),
            tag: args.tag.clone(),
        };
        let mut samples = super::select_samples(config, &select, &args.era, &args.channel)?;
        let sample = samples
            .first_mut()
            .ok_or_else(|| Error::Config(format!("no sample matches '{pattern}'")))?;
        let catalogue = DasClient::new();
        let files = sample.get_files(&catalogue, false)?;
        let infiles: Vec<InputFile> =
            files.into_iter().take(args.nfiles.max(1)).map(InputFile::whole).collect();
        let tag = format!("_{}_{}{}", args.era, sample.name, tagify(&args.tag));
        (infiles, sample.kind, tag)
    };

    let pcfg = ProcessorConfig {
        module,
        options: ModuleOptions::parse(&args.opts)?,
        channel: args.channel.clone(),
        era: args.era.clone(),
        kind,
        infiles,
        outdir: args.outdir.clone(),
        copydir: args.copydir.clone(),
        tag,
        maxevts: args.maxevts,
        preselect: args.preselect.clone(),
        json: args.json.clone(),
        prefetch: args.prefetch,
        retries: 2,
    };
    let report = pico_producer::run(&pcfg, &registry)?;
    console::say(format!(
        "wrote {} event(s) to {}",
        report.written,
        report.outfile.display()
    ));
    Ok(())
}

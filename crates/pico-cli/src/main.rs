//! The `pico` driver: produce, monitor and merge analysis tuples.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod commands;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "pico")]
#[command(about = "Produce, monitor and merge tau-analysis pico tuples")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// Project base directory holding the configuration
    #[arg(long, global = true, default_value = ".")]
    basedir: PathBuf,

    /// Increase user-facing verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Sample selection shared by all sweeping sub-commands.
#[derive(Args, Clone, Debug)]
struct SelectArgs {
    /// Eras to process
    #[arg(short = 'y', long = "era", required = true, num_args = 1..)]
    eras: Vec<String>,

    /// Channels to process
    #[arg(short = 'c', long = "channel", required = true, num_args = 1..)]
    channels: Vec<String>,

    /// Only samples matching these glob patterns
    #[arg(short = 's', long = "sample")]
    samples: Vec<String>,

    /// Exclude samples matching these glob patterns
    #[arg(short = 'x', long = "veto")]
    vetoes: Vec<String>,

    /// Only these data types (data, mc, embed)
    #[arg(long = "dtype")]
    dtypes: Vec<String>,

    /// Tag suffix for job and output names
    #[arg(short = 't', long = "tag", default_value = "")]
    tag: String,
}

/// Splitting and scheduler flags of (re)submission.
#[derive(Args, Clone, Debug)]
struct JobArgs {
    #[command(flatten)]
    select: SelectArgs,

    /// Maximum events per job (event-based splitting)
    #[arg(short = 'm', long = "maxevts", default_value_t = 0)]
    maxevts: u64,

    /// Files per job
    #[arg(short = 'f', long = "filesperjob", default_value_t = 0)]
    filesperjob: u64,

    /// Split into exactly this many chunks
    #[arg(short = 'n', long = "nchunks", default_value_t = 0)]
    nchunks: u64,

    /// Module options as key=value
    #[arg(short = 'E', long = "opt")]
    opts: Vec<String>,

    /// Scheduler queue / partition / job flavor
    #[arg(long)]
    queue: Option<String>,

    /// Wall-time request
    #[arg(long)]
    time: Option<String>,

    /// Extra scheduler options
    #[arg(long)]
    batchopts: Option<String>,

    /// Prefetch input files to local scratch on the worker
    #[arg(short = 'p', long)]
    prefetch: bool,

    /// Pre-selection cut applied before the analysis module
    #[arg(long)]
    preselect: Option<String>,

    /// Prepare everything but submit nothing
    #[arg(long)]
    dry: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit missing jobs for the selected samples
    Submit(JobArgs),

    /// Resubmit failed and missing jobs
    Resubmit(JobArgs),

    /// Show per-sample chunk status
    Status {
        #[command(flatten)]
        select: SelectArgs,
    },

    /// Merge the chunk outputs of finished samples
    Hadd {
        #[command(flatten)]
        select: SelectArgs,

        /// Remove per-chunk outputs after a successful merge
        #[arg(long)]
        clean: bool,

        /// Merge even when chunks are missing
        #[arg(long)]
        force: bool,

        /// Print what would be merged without doing it
        #[arg(long)]
        dry: bool,
    },

    /// Remove job artefacts of the selected samples
    Clean {
        #[command(flatten)]
        select: SelectArgs,

        /// Also remove per-chunk outputs
        #[arg(long)]
        outputs: bool,
    },

    /// Run one chunk locally
    Run(commands::run::RunArgs),

    /// Print the configured eras, channels and samples
    List {
        /// Eras to list samples for
        #[arg(short = 'y', long = "era")]
        eras: Vec<String>,
    },

    /// Resolve and print sample file lists or event counts
    Get {
        /// What to get: files or nevents
        what: String,

        #[command(flatten)]
        select: SelectArgs,

        /// Re-query the catalogue instead of using caches
        #[arg(long)]
        refresh: bool,
    },

    /// Write resolved file lists (with event counts) to the cache path
    Write {
        #[command(flatten)]
        select: SelectArgs,

        /// Also count events per file
        #[arg(long)]
        nevts: bool,
    },

    /// Link a channel to an analysis module
    Channel {
        /// Channel name
        name: String,
        /// Module identifier
        module: String,
    },

    /// Link an era to a sample-list file
    Era {
        /// Era name
        name: String,
        /// Sample-list path
        samplelist: String,
    },

    /// Set a configuration key
    Set {
        /// Key to set
        key: String,
        /// New value
        value: String,
    },
}

fn dispatch(cli: Cli) -> Result<u8, pico_core::Error> {
    let mut config = Config::load(&cli.basedir)?;
    if cli.verbose >= 1 {
        pico_core::console::say(format!(
            "basedir {}, batch {}",
            cli.basedir.display(),
            config.batch
        ));
    }
    match cli.command {
        Commands::Submit(args) => {
            commands::jobs::submit(&config, &args, pico_batch::SubmitMode::Submit)?;
            Ok(0)
        }
        Commands::Resubmit(args) => {
            commands::jobs::submit(&config, &args, pico_batch::SubmitMode::Resubmit)?;
            Ok(0)
        }
        Commands::Status { select } => {
            let nonfinal = commands::jobs::status(&config, &select)?;
            Ok(if nonfinal > 0 { 1 } else { 0 })
        }
        Commands::Hadd { select, clean, force, dry } => {
            let unmerged = commands::jobs::hadd(&config, &select, clean, force, dry)?;
            Ok(if unmerged > 0 { 1 } else { 0 })
        }
        Commands::Clean { select, outputs } => {
            commands::jobs::clean(&config, &select, outputs)?;
            Ok(0)
        }
        Commands::Run(args) => {
            commands::run::run(&config, &args)?;
            Ok(0)
        }
        Commands::List { eras } => {
            commands::samples::list(&config, &eras)?;
            Ok(0)
        }
        Commands::Get { what, select, refresh } => {
            commands::samples::get(&config, &what, &select, refresh)?;
            Ok(0)
        }
        Commands::Write { select, nevts } => {
            commands::samples::write(&config, &select, nevts)?;
            Ok(0)
        }
        Commands::Channel { name, module } => {
            commands::admin::link_channel(&mut config, &cli.basedir, &name, &module)?;
            Ok(0)
        }
        Commands::Era { name, samplelist } => {
            commands::admin::link_era(&mut config, &cli.basedir, &name, &samplelist)?;
            Ok(0)
        }
        Commands::Set { key, value } => {
            commands::admin::set(&mut config, &cli.basedir, &key, &value)?;
            Ok(0)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.to_string())),
        )
        .init();

    match dispatch(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            pico_core::console::error(err.to_string());
            ExitCode::from(pico_core::exit_code(&err) as u8)
        }
    }
}

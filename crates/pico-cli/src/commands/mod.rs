//! Sub-command implementations.

pub mod admin;
pub mod jobs;
pub mod run;
pub mod samples;

use pico_core::{DataKind, Result};
use pico_sample::{Sample, SampleFilter, load_samples};

use crate::SelectArgs;
use crate::config::Config;

/// Load the samples of one era/channel, applying the command-line filters.
/// Multi-path samples are split for skimming channels so that one task maps
/// to one catalogue dataset.
pub fn select_samples(config: &Config, select: &SelectArgs, era: &str, channel: &str) -> Result<Vec<Sample>> {
    let kinds = select
        .dtypes
        .iter()
        .map(|d| DataKind::parse(d))
        .collect::<Result<Vec<_>>>()?;
    let filter = SampleFilter {
        patterns: select.samples.clone(),
        vetoes: select.vetoes.clone(),
        kinds,
        channel: Some(channel.to_string()),
        split: channel.contains("skim"),
    };
    let mut samples =
        load_samples(config.era_samples(era)?, era, &filter, Some(&config.filelistdir))?;
    samples.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(samples)
}

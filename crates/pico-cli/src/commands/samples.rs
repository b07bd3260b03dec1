//! list / get / write: sample inspection and file-list caching.

use pico_batch::probe_counts;
use pico_core::{Error, InputFile, Result, console, repkey};
use pico_sample::DasClient;

use crate::SelectArgs;
use crate::config::Config;

/// Print the configured eras, channels and (optionally) era sample lists.
pub fn list(config: &Config, eras: &[String]) -> Result<()> {
    console::header("configuration");
    let mut table = console::Table::new(&["era", "sample list"]);
    for (era, path) in &config.eras {
        table.row(&[era.clone(), path.clone()]);
    }
    table.print();
    let mut table = console::Table::new(&["channel", "module"]);
    for (channel, module) in &config.channels {
        table.row(&[channel.clone(), module.clone()]);
    }
    table.print();
    console::say(format!("batch: {}", config.batch));

    for era in eras {
        console::header(format!("samples for {era}"));
        let filter = pico_sample::SampleFilter::default();
        let samples =
            pico_sample::load_samples(config.era_samples(era)?, era, &filter, None)?;
        let mut table = console::Table::new(&["group", "name", "dtype", "paths"]);
        for sample in samples {
            table.row(&[
                sample.group.clone(),
                sample.name.clone(),
                sample.kind.to_string(),
                sample.paths.join(", "),
            ]);
        }
        table.print();
    }
    Ok(())
}

/// Resolve and print file lists or event counts.
pub fn get(config: &Config, what: &str, select: &SelectArgs, refresh: bool) -> Result<()> {
    let catalogue = DasClient::new();
    for era in &select.eras {
        for channel in &select.channels {
            for mut sample in super::select_samples(config, select, era, channel)? {
                console::header(&sample.name);
                match what {
                    "files" => {
                        for file in sample.get_files(&catalogue, refresh)? {
                            console::say(file);
                        }
                    }
                    "nevents" => {
                        let n = sample.get_nevents(&catalogue, refresh)?;
                        console::say(format!("{n} events"));
                    }
                    other => {
                        return Err(Error::Config(format!(
                            "unknown target '{other}' (choose files, nevents)"
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Resolve file lists (optionally with per-file event counts) and persist
/// them to the configured cache location.
pub fn write(config: &Config, select: &SelectArgs, nevts: bool) -> Result<()> {
    let catalogue = DasClient::new();
    for era in &select.eras {
        for channel in &select.channels {
            for mut sample in super::select_samples(config, select, era, channel)? {
                let files = sample.get_files(&catalogue, false)?;
                if nevts {
                    let inputs: Vec<InputFile> =
                        files.iter().map(|f| InputFile::whole(f.clone())).collect();
                    let counts = probe_counts(&inputs, &sample.file_nevents(), config.ncores)?;
                    for (url, n) in counts {
                        sample.set_file_nevents(&url, n);
                    }
                }
                let path = repkey(
                    &sample.expand(&config.filelistdir),
                    &[("CHANNEL", channel.as_str())],
                );
                sample.write_filelist(&path)?;
                console::say(format!("wrote {} file(s) to {path}", files.len()));
            }
        }
    }
    Ok(())
}

//! Declarative era sample lists.
//!
//! Each era names a JSON file with one entry per sample. Loading applies the
//! command-line filters (name patterns, vetoes, data types), restricts to
//! the requested channel and enforces unique short names.

use std::path::{Path, PathBuf};

use pico_core::{DataKind, Error, Result, repkey};
use serde::Deserialize;

use crate::filelist::FileList;
use crate::sample::{Sample, SplitRule};

/// Explicit files: either a literal URL list or the path of a file-list
/// cache in the standard text format.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FilesEntry {
    /// Path to a file-list text file.
    ListFile(String),
    /// Literal list of URLs.
    Urls(Vec<String>),
}

/// One sample entry of an era configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleEntry {
    /// Process group.
    pub group: String,
    /// Short sample name.
    pub name: String,
    /// Catalogue paths.
    pub paths: Vec<String>,
    /// Explicit data type; auto-detected when absent.
    #[serde(default)]
    pub dtype: Option<DataKind>,
    /// Cross-section in pb.
    #[serde(default)]
    pub xsec: Option<f64>,
    /// Explicit file list or file-list cache path.
    #[serde(default)]
    pub files: Option<FilesEntry>,
    /// Storage directory pattern overriding the catalogue.
    #[serde(default)]
    pub store: Option<String>,
    /// Redirector prefix.
    #[serde(default)]
    pub url: Option<String>,
    /// Channel whitelist.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Weight expression.
    #[serde(default)]
    pub weight: Option<String>,
    /// Extra per-sample weight.
    #[serde(default)]
    pub extraweight: Option<String>,
    /// Split rules.
    #[serde(default)]
    pub split: Vec<SplitRule>,
    /// Files-per-job override.
    #[serde(default)]
    pub nfilesperjob: Option<u64>,
    /// Max-events-per-job override.
    #[serde(default)]
    pub maxevts: Option<u64>,
    /// Blacklisted file URLs.
    #[serde(default)]
    pub blacklist: Vec<String>,
}

/// Filters applied while loading an era configuration.
#[derive(Debug, Clone, Default)]
pub struct SampleFilter {
    /// Keep only samples matching one of these name patterns.
    pub patterns: Vec<String>,
    /// Drop samples matching one of these patterns.
    pub vetoes: Vec<String>,
    /// Keep only these data kinds (empty = all).
    pub kinds: Vec<DataKind>,
    /// Restrict to this channel.
    pub channel: Option<String>,
    /// Split multi-path samples into independent siblings.
    pub split: bool,
}

fn entry_to_sample(entry: SampleEntry, era: &str, filelistdir: Option<&str>) -> Result<Sample> {
    let mut sample = Sample::new(entry.group, entry.name, entry.paths)?;
    if let Some(kind) = entry.dtype {
        sample = sample.with_kind(kind);
    }
    sample.era = era.to_string();
    sample.xsec = entry.xsec;
    sample.weight = entry.weight;
    sample.extraweight = entry.extraweight;
    sample.channels = entry.channels;
    sample.split_rules = entry.split;
    sample.nfilesperjob = entry.nfilesperjob;
    sample.maxevts = entry.maxevts;
    sample.blacklist = entry.blacklist;
    sample.store_pattern = entry.store;
    sample.url = entry.url;
    if let Some(dir) = filelistdir {
        let path = repkey(dir, &[("ERA", era), ("SAMPLE", &sample.name), ("GROUP", &sample.group)]);
        sample.filelist_path = Some(PathBuf::from(path));
    }
    match entry.files {
        Some(FilesEntry::Urls(urls)) => {
            sample = sample.with_files(FileList::from_urls(urls));
        }
        Some(FilesEntry::ListFile(path)) => {
            let path = repkey(&path, &[("ERA", era), ("SAMPLE", &sample.name), ("GROUP", &sample.group)]);
            let list = FileList::load(&path)?.ok_or_else(|| {
                Error::Config(format!("file list '{path}' of sample '{}' not found", sample.name))
            })?;
            sample = sample.with_files(list);
        }
        None => {}
    }
    Ok(sample)
}

/// Load the samples of one era configuration file, applying the filters.
pub fn load_samples(
    path: impl AsRef<Path>,
    era: &str,
    filter: &SampleFilter,
    filelistdir: Option<&str>,
) -> Result<Vec<Sample>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read sample configuration {}: {e}", path.display()))
    })?;
    let entries: Vec<SampleEntry> = serde_json::from_str(&text).map_err(|e| {
        Error::Config(format!("malformed sample configuration {}: {e}", path.display()))
    })?;

    let mut samples = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for entry in entries {
        let sample = entry_to_sample(entry, era, filelistdir)?;
        if !seen.insert(sample.name.clone()) {
            return Err(Error::Sanity(format!(
                "duplicate sample name '{}' in {}",
                sample.name,
                path.display()
            )));
        }
        if !sample.matches(&filter.patterns) {
            continue;
        }
        if !filter.vetoes.is_empty() && sample.matches(&filter.vetoes) {
            continue;
        }
        if !filter.kinds.is_empty() && !filter.kinds.contains(&sample.kind) {
            continue;
        }
        if let Some(channel) = &filter.channel
            && !sample.in_channel(channel)
        {
            continue;
        }
        sample.validate()?;
        if filter.split && sample.paths.len() >= 2 {
            samples.extend(sample.split());
        } else {
            samples.push(sample);
        }
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ERA_JSON: &str = r#"[
      {
        "group": "DY",
        "name": "DYJetsToLL_M-50",
        "paths": ["/DYJetsToLL_M-50_madgraphMLM-pythia8/RunIISummer20UL2018/NANOAODSIM"],
        "xsec": 6077.22,
        "weight": "genweight",
        "extraweight": "zptweight",
        "split": [
          {"name": "ZTT", "title": "Z -> tautau", "cut": "genmatch_2==5"},
          {"name": "ZL", "title": "Z -> ll", "cut": "genmatch_2>0 && genmatch_2<5"}
        ]
      },
      {
        "group": "TT",
        "name": "TTTo2L2Nu",
        "paths": ["/TTTo2L2Nu_powheg-pythia8/RunIISummer20UL2018/NANOAODSIM"],
        "xsec": 88.29
      },
      {
        "group": "Data",
        "name": "SingleMuon_Run2018D",
        "paths": ["/SingleMuon/Run2018D-UL2018-v1/NANOAOD"],
        "channels": ["mutau", "mumu"]
      }
    ]"#;

    fn write_cfg(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("samples_UL2018.json");
        std::fs::write(&path, ERA_JSON).unwrap();
        path
    }

    #[test]
    fn loads_and_filters_by_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cfg(dir.path());
        let filter = SampleFilter { channel: Some("etau".to_string()), ..Default::default() };
        let samples = load_samples(&path, "UL2018", &filter, None).unwrap();
        // Data sample is restricted to mutau/mumu.
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.kind == DataKind::Mc));

        let filter = SampleFilter { channel: Some("mutau".to_string()), ..Default::default() };
        let samples = load_samples(&path, "UL2018", &filter, None).unwrap();
        assert_eq!(samples.len(), 3);
        let dy = &samples[0];
        assert_eq!(dy.split_rules.len(), 2);
        assert_eq!(dy.extraweight.as_deref(), Some("zptweight"));
    }

    #[test]
    fn pattern_and_kind_filters() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cfg(dir.path());
        let filter = SampleFilter { patterns: vec!["DY*".to_string()], ..Default::default() };
        let samples = load_samples(&path, "UL2018", &filter, None).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "DYJetsToLL_M-50");

        let filter = SampleFilter { kinds: vec![DataKind::Data], ..Default::default() };
        let samples = load_samples(&path, "UL2018", &filter, None).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].group, "Data");
    }

    #[test]
    fn duplicate_names_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"[
              {"group": "DY", "name": "DY", "xsec": 1.0,
               "paths": ["/DY_pythia8/RunA/NANOAODSIM"]},
              {"group": "DY", "name": "DY", "xsec": 1.0,
               "paths": ["/DY_pythia8/RunB/NANOAODSIM"]}
            ]"#,
        )
        .unwrap();
        let err = load_samples(&path, "UL2018", &SampleFilter::default(), None).unwrap_err();
        assert!(matches!(err, Error::Sanity(_)));
    }

    #[test]
    fn filelist_dir_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cfg(dir.path());
        let samples = load_samples(
            &path,
            "UL2018",
            &SampleFilter { patterns: vec!["TT*".to_string()], ..Default::default() },
            Some("samples/files/$ERA/$SAMPLE.txt"),
        )
        .unwrap();
        assert_eq!(
            samples[0].filelist_path.as_deref(),
            Some(std::path::Path::new("samples/files/UL2018/TTTo2L2Nu.txt"))
        );
    }
}

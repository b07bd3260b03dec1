//! The production-side sample: a physics process described by catalogue
//! paths, with lazily resolved and cached file lists.

use std::collections::BTreeMap;
use std::path::PathBuf;

use pico_core::{DataKind, Error, Result, match_any, repkey};
use pico_storage::storage_for;

use crate::catalogue::Catalogue;
use crate::filelist::FileList;

/// A virtual sub-sample sharing the parent's files with an extra selection
/// (e.g. splitting Drell-Yan by the generator match of the tau candidate).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SplitRule {
    /// Sub-sample name, e.g. `ZTT`.
    pub name: String,
    /// Human-readable title, e.g. `"Z -> tautau"`.
    pub title: String,
    /// Extra selection, e.g. `genmatch_2==5`.
    pub cut: String,
}

/// One physics process of an era/channel configuration.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Process group (`DY`, `TT`, `Data`, ...), used to group final output.
    pub group: String,
    /// Short sample name, unique within an era configuration.
    pub name: String,
    /// Catalogue paths (`/SAMPLE/CAMPAIGN/FORMAT`); several paths mean an
    /// extension sample to be split for production.
    pub paths: Vec<String>,
    /// data / mc / embedded.
    pub kind: DataKind,
    /// Era label, for `$ERA` expansion.
    pub era: String,
    /// Channels this sample applies to; empty = all channels.
    pub channels: Vec<String>,
    /// Cross-section in pb (simulation only).
    pub xsec: Option<f64>,
    /// Per-event weight expression (simulation only).
    pub weight: Option<String>,
    /// Per-sample multiplicative correction (e.g. Z-pT reweighting).
    pub extraweight: Option<String>,
    /// Rules to split this sample into virtual siblings at draw time.
    pub split_rules: Vec<SplitRule>,
    /// Catalogue instance tag.
    pub instance: String,
    /// File URLs excluded from the resolved list.
    pub blacklist: Vec<String>,
    /// Storage directory pattern overriding the catalogue listing.
    pub store_pattern: Option<String>,
    /// Redirector prefix for catalogue entries without a transport.
    pub url: Option<String>,
    /// Per-sample files-per-job override.
    pub nfilesperjob: Option<u64>,
    /// Per-sample max-events-per-job override.
    pub maxevts: Option<u64>,
    /// Path of the on-disk file-list cache for this sample.
    pub filelist_path: Option<PathBuf>,
    /// Submission try this sample was restored at (from a job config).
    pub subtry: u32,
    files: Option<FileList>,
    refreshable: bool,
    nevents: Option<u64>,
    sumw: Option<f64>,
}

impl Sample {
    /// A new sample; the kind is auto-detected from the first path unless
    /// set explicitly afterwards.
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        paths: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        if paths.is_empty() {
            return Err(Error::Config(format!("sample '{name}' needs at least one catalogue path")));
        }
        for path in &paths {
            if !path.starts_with('/') || path.matches('/').count() < 3 {
                return Err(Error::Config(format!(
                    "sample '{name}' path '{path}' is not of the form /SAMPLE/CAMPAIGN/FORMAT"
                )));
            }
        }
        let kind = DataKind::from_path(&paths[0]).ok_or_else(|| {
            Error::Config(format!("cannot detect data type of sample '{name}' from '{}'", paths[0]))
        })?;
        let instance =
            if paths[0].ends_with("USER") { "prod/phys03" } else { "prod/global" }.to_string();
        Ok(Sample {
            group: group.into(),
            name,
            paths,
            kind,
            era: String::new(),
            channels: Vec::new(),
            xsec: None,
            weight: None,
            extraweight: None,
            split_rules: Vec::new(),
            instance,
            blacklist: Vec::new(),
            store_pattern: None,
            url: None,
            nfilesperjob: None,
            maxevts: None,
            filelist_path: None,
            subtry: 0,
            files: None,
            refreshable: true,
            nevents: None,
            sumw: None,
        })
    }

    /// Override the auto-detected kind.
    pub fn with_kind(mut self, kind: DataKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set an explicit file list; explicit lists are never refreshed from
    /// the catalogue.
    pub fn with_files(mut self, files: FileList) -> Self {
        self.files = Some(files);
        self.refreshable = false;
        self
    }

    /// Sanity checks applied before any job is prepared.
    pub fn validate(&self) -> Result<()> {
        if self.kind == DataKind::Mc && self.xsec.is_none() {
            return Err(Error::Sanity(format!("MC sample '{}' has no cross-section", self.name)));
        }
        if self.kind == DataKind::Data && self.extraweight.is_some() {
            return Err(Error::Sanity(format!(
                "data sample '{}' must not carry an extra weight",
                self.name
            )));
        }
        if self.kind == DataKind::Data && self.channels.is_empty() {
            return Err(Error::Sanity(format!(
                "data sample '{}' must be restricted to channels",
                self.name
            )));
        }
        Ok(())
    }

    /// Whether this sample applies to a channel.
    pub fn in_channel(&self, channel: &str) -> bool {
        self.channels.is_empty() || self.channels.iter().any(|c| c == channel)
    }

    /// Glob-style name match used for command-line sample selection.
    pub fn matches(&self, patterns: &[String]) -> bool {
        match_any(&self.name, patterns)
    }

    /// Split a multi-path sample into independent single-path siblings with
    /// stable names (`name`, `name_ext1`, ...).
    pub fn split(&self) -> Vec<Sample> {
        self.paths
            .iter()
            .enumerate()
            .map(|(i, path)| {
                let mut sub = self.clone();
                sub.paths = vec![path.clone()];
                sub.files = None;
                sub.refreshable = true;
                sub.nevents = None;
                if i > 0 {
                    sub.name = format!("{}_ext{i}", self.name);
                }
                sub
            })
            .collect()
    }

    /// Expand a path pattern with this sample's keys.
    pub fn expand(&self, pattern: &str) -> String {
        let das = self.paths[0].trim_matches('/').to_string();
        repkey(
            pattern,
            &[
                ("ERA", &self.era),
                ("GROUP", &self.group),
                ("SAMPLE", &self.name),
                ("DAS", &das),
            ],
        )
    }

    /// Resolve the file list.
    ///
    /// Priority: explicit list > in-memory cache > on-disk cache (unless
    /// `refresh`) > storage-override listing > catalogue query. The resolved
    /// list is sorted for reproducible chunking, filtered by the blacklist,
    /// and prefixed with the redirector when it lacks a transport.
    pub fn get_files(&mut self, catalogue: &dyn Catalogue, refresh: bool) -> Result<Vec<String>> {
        if let Some(list) = &self.files
            && (!refresh || !self.refreshable)
        {
            return Ok(list.files.clone());
        }
        if !refresh
            && let Some(path) = &self.filelist_path
            && let Some(cached) = FileList::load(path)?
        {
            tracing::debug!(sample = %self.name, cache = %path.display(), "file list from cache");
            self.files = Some(cached.clone());
            return Ok(cached.files);
        }

        let mut files = Vec::new();
        for path in &self.paths {
            let mut found = if let Some(pattern) = &self.store_pattern {
                let dir = repkey(&self.expand(pattern), &[("PATH", path)]).replace("//", "/");
                let storage = storage_for(&dir)?;
                storage.list_files(&dir, Some("*.json"))?
            } else {
                catalogue.files(path, &self.instance)?
            };
            found.retain(|f| !self.blacklist.iter().any(|b| f.ends_with(b) || b.ends_with(f.as_str())));
            if let Some(url) = &self.url {
                // Catalogue entries come as bare `/store/...` paths.
                for f in &mut found {
                    if f.starts_with("/store/") {
                        *f = format!("{url}{f}");
                    }
                }
            }
            files.extend(found);
        }
        files.sort();
        files.dedup();
        if files.is_empty() {
            return Err(Error::Catalogue(format!("no files resolved for sample '{}'", self.name)));
        }
        self.files = Some(FileList::from_urls(files.clone()));
        Ok(files)
    }

    /// The resolved list, if any.
    pub fn files(&self) -> Option<&FileList> {
        self.files.as_ref()
    }

    /// Record a per-file event count (authoritative for chunk splitting).
    pub fn set_file_nevents(&mut self, url: &str, n: u64) {
        if let Some(list) = &mut self.files {
            list.nevents.insert(url.to_string(), n);
        }
    }

    /// Per-file event counts known so far.
    pub fn file_nevents(&self) -> BTreeMap<String, u64> {
        self.files.as_ref().map(|l| l.nevents.clone()).unwrap_or_default()
    }

    /// Total event count: cached value, else the sum of complete per-file
    /// counts, else a catalogue summary query.
    pub fn get_nevents(&mut self, catalogue: &dyn Catalogue, refresh: bool) -> Result<u64> {
        if let Some(n) = self.nevents
            && !refresh
        {
            return Ok(n);
        }
        if let Some(list) = &self.files
            && let Some(total) = list.total()
        {
            self.nevents = Some(total);
            return Ok(total);
        }
        let mut total = 0;
        for path in &self.paths {
            total += catalogue.nevents(path, &self.instance)?;
        }
        self.nevents = Some(total);
        Ok(total)
    }

    /// Cache the total event count directly (e.g. from job bookkeeping).
    pub fn set_nevents(&mut self, n: u64) {
        self.nevents = Some(n);
    }

    /// Cached sum of generator weights (simulation).
    pub fn sumweights(&self) -> Option<f64> {
        self.sumw
    }

    /// Cache the sum of generator weights.
    pub fn set_sumweights(&mut self, sumw: f64) {
        self.sumw = Some(sumw);
    }

    /// Persist the resolved file list (with counts and total) to `path`.
    pub fn write_filelist(&self, path: impl Into<PathBuf>) -> Result<()> {
        let list = self
            .files
            .as_ref()
            .ok_or_else(|| Error::Config(format!("sample '{}' has no resolved file list", self.name)))?;
        list.save(path.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::Catalogue;

    struct FakeCatalogue {
        files: Vec<String>,
    }

    impl Catalogue for FakeCatalogue {
        fn files(&self, _dataset: &str, _instance: &str) -> Result<Vec<String>> {
            Ok(self.files.clone())
        }
        fn nevents(&self, _dataset: &str, _instance: &str) -> Result<u64> {
            Ok(4242)
        }
    }

    fn dy() -> Sample {
        Sample::new(
            "DY",
            "DYJetsToLL_M-50",
            vec!["/DYJetsToLL_M-50_madgraphMLM-pythia8/RunIISummer20UL2018/NANOAODSIM".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn kind_detection_and_validation() {
        let mut sample = dy();
        assert_eq!(sample.kind, DataKind::Mc);
        assert!(sample.validate().is_err()); // no xsec
        sample.xsec = Some(6077.22);
        assert!(sample.validate().is_ok());
    }

    #[test]
    fn data_with_extraweight_is_insane() {
        let mut sample = Sample::new(
            "Data",
            "SingleMuon_Run2018D",
            vec!["/SingleMuon/Run2018D-UL2018-v1/NANOAOD".to_string()],
        )
        .unwrap();
        sample.channels = vec!["mutau".to_string()];
        assert!(sample.validate().is_ok());
        sample.extraweight = Some("zptweight".to_string());
        assert!(sample.validate().is_err());
    }

    #[test]
    fn get_files_sorts_and_caches() {
        let cat = FakeCatalogue {
            files: vec!["/store/b.json".to_string(), "/store/a.json".to_string()],
        };
        let mut sample = dy();
        let files = sample.get_files(&cat, false).unwrap();
        assert_eq!(files, vec!["/store/a.json".to_string(), "/store/b.json".to_string()]);
        // Second call comes from memory even with an erroring catalogue.
        struct Broken;
        impl Catalogue for Broken {
            fn files(&self, d: &str, _: &str) -> Result<Vec<String>> {
                Err(Error::Catalogue(d.to_string()))
            }
            fn nevents(&self, d: &str, _: &str) -> Result<u64> {
                Err(Error::Catalogue(d.to_string()))
            }
        }
        assert_eq!(sample.get_files(&Broken, false).unwrap().len(), 2);
    }

    #[test]
    fn disk_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("UL2018/DYJetsToLL_M-50.txt");
        let cat = FakeCatalogue { files: vec!["/store/a.json".to_string()] };

        let mut sample = dy();
        sample.filelist_path = Some(cache.clone());
        sample.get_files(&cat, false).unwrap();
        sample.set_file_nevents("/store/a.json", 144447);
        sample.write_filelist(&cache).unwrap();

        let mut restored = dy();
        restored.filelist_path = Some(cache);
        struct Broken;
        impl Catalogue for Broken {
            fn files(&self, d: &str, _: &str) -> Result<Vec<String>> {
                Err(Error::Catalogue(d.to_string()))
            }
            fn nevents(&self, d: &str, _: &str) -> Result<u64> {
                Err(Error::Catalogue(d.to_string()))
            }
        }
        let files = restored.get_files(&Broken, false).unwrap();
        assert_eq!(files, vec!["/store/a.json".to_string()]);
        assert_eq!(restored.file_nevents().get("/store/a.json"), Some(&144447));
        assert_eq!(restored.get_nevents(&Broken, false).unwrap(), 144447);
    }

    #[test]
    fn split_multi_path() {
        let mut sample = dy();
        sample.paths.push(
            "/DYJetsToLL_M-50_madgraphMLM-pythia8/RunIISummer20UL2018_ext1/NANOAODSIM".to_string(),
        );
        let parts = sample.split();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "DYJetsToLL_M-50");
        assert_eq!(parts[1].name, "DYJetsToLL_M-50_ext1");
        assert_eq!(parts[1].paths.len(), 1);
    }

    #[test]
    fn name_matching() {
        let sample = dy();
        assert!(sample.matches(&["DY*".to_string()]));
        assert!(sample.matches(&[]));
        assert!(!sample.matches(&["TT".to_string()]));
    }
}

//! The per-submission job-config sidecar.
//!
//! One JSON document per `(sample, channel, era, try)` records everything a
//! resubmission needs: the chunk dictionary, the output location, module
//! options and the scheduler job ids. Sidecars are written next to the task
//! list under the job directory and never overwritten across tries.

use std::collections::BTreeMap;
use std::path::Path;

use pico_core::{DataKind, Error, InputFile, Result};
use serde::{Deserialize, Serialize};

/// Chunk-id keyed maps round-trip through JSON with string keys; re-coerce
/// them to integers on load.
mod intkey_map {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S, V>(
        map: &BTreeMap<u32, V>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        serializer.collect_map(map.iter().map(|(k, v)| (k.to_string(), v)))
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> std::result::Result<BTreeMap<u32, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        let raw: BTreeMap<String, V> = BTreeMap::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(k, v)| {
                k.parse::<u32>()
                    .map(|k| (k, v))
                    .map_err(|_| serde::de::Error::custom(format!("non-integer chunk id '{k}'")))
            })
            .collect()
    }
}

/// The sidecar record of one (re)submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Submission timestamp.
    pub time: String,
    /// Sample group.
    pub group: String,
    /// Sample name.
    pub name: String,
    /// Catalogue paths.
    pub paths: Vec<String>,
    /// Submission try number (1-based).
    #[serde(rename = "try")]
    pub subtry: u32,
    /// Channel.
    pub channel: String,
    /// Era.
    pub era: String,
    /// User tag.
    pub tag: String,
    /// Sample kind.
    pub dtype: DataKind,
    /// Analysis-module identifier.
    pub module: String,
    /// Module options (`key` → spelled-out value).
    pub options: BTreeMap<String, String>,
    /// Total events of the sample at submission time (0 if unknown).
    pub nevents: u64,
    /// Files-per-job setting used.
    pub nfilesperjob: u64,
    /// Max-events-per-job setting used (0 = file-based splitting).
    pub maxevts: u64,
    /// Whether inputs are prefetched to scratch.
    pub prefetch: bool,
    /// Chunk id → input files (with event windows).
    #[serde(with = "intkey_map")]
    pub chunkdict: BTreeMap<u32, Vec<InputFile>>,
    /// Chunk ids in task-list order (task id N runs `chunks[N-1]`).
    pub chunks: Vec<u32>,
    /// Output directory URL the chunks write to.
    pub output: String,
    /// File-name postfix `_<channel><tag>`.
    pub postfix: String,
    /// Job directory (configs and logs).
    pub jobdir: String,
    /// Sidecar directory.
    pub cfgdir: String,
    /// Scheduler log directory.
    pub logdir: String,
    /// Task-list path.
    pub joblist: String,
    /// This sidecar's own path.
    pub cfgname: String,
    /// Certification JSON for data, if any.
    pub json: Option<String>,
    /// Pre-selection cut, if any.
    pub cut: Option<String>,
    /// Scheduler job ids of every (re)submission so far.
    pub jobids: Vec<u64>,
    /// Per-file event counts known at submission time.
    pub filenevts: BTreeMap<String, u64>,
}

impl JobConfig {
    /// Write the sidecar to its `cfgname` path.
    pub fn save(&self) -> Result<()> {
        let path = Path::new(&self.cfgname);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Load a sidecar.
    pub fn load(path: impl AsRef<Path>) -> Result<JobConfig> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read job config {}: {e}", path.display())))?;
        let mut cfg: JobConfig = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("malformed job config {}: {e}", path.display())))?;
        cfg.cfgname = path.to_string_lossy().into_owned();
        Ok(cfg)
    }

    /// Output file name of one chunk.
    pub fn chunk_outfname(&self, chunk: u32) -> String {
        format!("pico{}_{chunk}.json", self.postfix)
    }

    /// Expected number of events processed by one chunk, from the recorded
    /// per-file counts; `None` when a count is unknown.
    pub fn chunk_expected_events(&self, chunk: u32) -> Option<u64> {
        let inputs = self.chunkdict.get(&chunk)?;
        let mut total = 0;
        for input in inputs {
            match input.range {
                Some((first, count)) => {
                    let cap = self.filenevts.get(&input.url).copied();
                    total += match cap {
                        Some(n) => count.min(n.saturating_sub(first)),
                        None => count,
                    };
                }
                None => total += *self.filenevts.get(&input.url)?,
            }
        }
        Some(total)
    }

    /// First unused chunk id.
    pub fn next_chunk_id(&self) -> u32 {
        let mut id = 0;
        while self.chunkdict.contains_key(&id) {
            id += 1;
        }
        id
    }
}

/// Find the sidecar with the highest try number for a given `cfgdir` and
/// postfix.
pub fn latest_config(cfgdir: &Path, postfix: &str) -> Result<Option<JobConfig>> {
    if !cfgdir.is_dir() {
        return Ok(None);
    }
    let prefix = format!("jobconfig{postfix}_try");
    let mut best: Option<(u32, std::path::PathBuf)> = None;
    for entry in std::fs::read_dir(cfgdir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(rest) = name.strip_prefix(&prefix)
            && let Some(try_str) = rest.strip_suffix(".json")
            && let Ok(subtry) = try_str.parse::<u32>()
            && best.as_ref().is_none_or(|(t, _)| subtry > *t)
        {
            best = Some((subtry, entry.path()));
        }
    }
    match best {
        Some((_, path)) => Ok(Some(JobConfig::load(path)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_cfg(cfgname: String) -> JobConfig {
        let mut chunkdict = BTreeMap::new();
        chunkdict.insert(0, vec![InputFile::whole("/store/a.json")]);
        chunkdict.insert(1, vec![InputFile::ranged("/store/b.json", 0, 500)]);
        chunkdict.insert(2, vec![InputFile::ranged("/store/b.json", 500, 500)]);
        JobConfig {
            time: "2024-05-01 12:00:00".to_string(),
            group: "DY".to_string(),
            name: "DYJetsToLL_M-50".to_string(),
            paths: vec!["/DYJetsToLL/Run/NANOAODSIM".to_string()],
            subtry: 1,
            channel: "mutau".to_string(),
            era: "UL2018".to_string(),
            tag: String::new(),
            dtype: DataKind::Mc,
            module: "MuTau".to_string(),
            options: BTreeMap::new(),
            nevents: 1300,
            nfilesperjob: 1,
            maxevts: 500,
            prefetch: false,
            chunkdict,
            chunks: vec![0, 1, 2],
            output: "/tmp/out".to_string(),
            postfix: "_mutau".to_string(),
            jobdir: "/tmp/job".to_string(),
            cfgdir: "/tmp/job/config".to_string(),
            logdir: "/tmp/job/log".to_string(),
            joblist: "/tmp/job/config/jobarglist_mutau_try1.txt".to_string(),
            cfgname,
            json: None,
            cut: None,
            jobids: vec![],
            filenevts: [("/store/a.json".to_string(), 300), ("/store/b.json".to_string(), 1000)]
                .into(),
        }
    }

    #[test]
    fn sidecar_roundtrip_coerces_chunk_ids() {
        let dir = tempfile::tempdir().unwrap();
        let cfgname = dir.path().join("jobconfig_mutau_try1.json");
        let cfg = demo_cfg(cfgname.to_string_lossy().into_owned());
        cfg.save().unwrap();

        // JSON stores chunk ids as strings.
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&cfgname).unwrap()).unwrap();
        assert!(raw["chunkdict"].get("1").is_some());
        assert_eq!(raw["try"], 1);

        let back = JobConfig::load(&cfgname).unwrap();
        assert_eq!(back.chunkdict.len(), 3);
        assert_eq!(back.chunkdict[&1][0].range, Some((0, 500)));
        assert_eq!(back.subtry, 1);
    }

    #[test]
    fn expected_events_per_chunk() {
        let cfg = demo_cfg("unused".to_string());
        assert_eq!(cfg.chunk_expected_events(0), Some(300));
        assert_eq!(cfg.chunk_expected_events(1), Some(500));
        assert_eq!(cfg.chunk_expected_events(2), Some(500));
        assert_eq!(cfg.chunk_expected_events(99), None);
    }

    #[test]
    fn next_chunk_id_skips_existing() {
        let mut cfg = demo_cfg("unused".to_string());
        assert_eq!(cfg.next_chunk_id(), 3);
        cfg.chunkdict.remove(&1);
        assert_eq!(cfg.next_chunk_id(), 1);
    }

    #[test]
    fn latest_config_picks_highest_try() {
        let dir = tempfile::tempdir().unwrap();
        for subtry in [1u32, 3, 2] {
            let mut cfg = demo_cfg(
                dir.path()
                    .join(format!("jobconfig_mutau_try{subtry}.json"))
                    .to_string_lossy()
                    .into_owned(),
            );
            cfg.subtry = subtry;
            cfg.save().unwrap();
        }
        let latest = latest_config(dir.path(), "_mutau").unwrap().unwrap();
        assert_eq!(latest.subtry, 3);
        assert!(latest_config(dir.path(), "_etau").unwrap().is_none());
    }
}

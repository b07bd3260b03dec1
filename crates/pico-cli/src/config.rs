//! The per-user driver configuration.
//!
//! Lives at `config/config.json` under the project tree and is created with
//! defaults on first use. Path patterns support `$ERA`, `$CHANNEL`,
//! `$SAMPLE`, `$GROUP`, `$DAS` and `$TAG` substitution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pico_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Era → sample-list JSON path.
    pub eras: BTreeMap<String, String>,
    /// Channel → analysis-module identifier.
    pub channels: BTreeMap<String, String>,
    /// Job directory pattern (configs and logs).
    pub jobdir: String,
    /// Chunk output directory pattern.
    pub outdir: String,
    /// Merged ("pico") output directory pattern.
    pub picodir: String,
    /// File-list cache pattern.
    pub filelistdir: String,
    /// Batch system (HTCondor, SLURM, SGE).
    pub batch: String,
    /// Scheduler queue / partition / flavor.
    pub queue: String,
    /// Extra scheduler options.
    pub batchopts: String,
    /// Default files per job.
    pub nfilesperjob: u64,
    /// Default maximum events per job (0 = file-based splitting).
    pub maxevtsperjob: u64,
    /// Worker-pool width for probing and validation.
    pub ncores: usize,
    /// Era → certification JSON for data.
    pub jsons: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            eras: BTreeMap::new(),
            channels: [("mutau".to_string(), "MuTau".to_string()), ("skim".to_string(), "Skim".to_string())]
                .into(),
            jobdir: "output/$ERA/$CHANNEL/$SAMPLE".to_string(),
            outdir: "output/$ERA/$CHANNEL/$SAMPLE".to_string(),
            picodir: "analysis/$ERA/$GROUP".to_string(),
            filelistdir: "samples/files/$ERA/$SAMPLE.txt".to_string(),
            batch: "HTCondor".to_string(),
            queue: String::new(),
            batchopts: String::new(),
            nfilesperjob: 1,
            maxevtsperjob: 0,
            ncores: 4,
            jsons: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Configuration file path under `basedir`.
    pub fn path(basedir: &Path) -> PathBuf {
        basedir.join("config").join("config.json")
    }

    /// Load the configuration, creating it with defaults on first use.
    pub fn load(basedir: &Path) -> Result<Config> {
        let path = Self::path(basedir);
        if !path.is_file() {
            let config = Config::default();
            config.save(basedir)?;
            pico_core::console::warn(format!(
                "created default configuration at {}",
                path.display()
            ));
            return Ok(config);
        }
        let text = std::fs::read_to_string(&path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("malformed configuration {}: {e}", path.display())))
    }

    /// Save the configuration.
    pub fn save(&self, basedir: &Path) -> Result<()> {
        let path = Self::path(basedir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Sample-list path of an era.
    pub fn era_samples(&self, era: &str) -> Result<&str> {
        self.eras.get(era).map(|s| s.as_str()).ok_or_else(|| {
            Error::Config(format!(
                "era '{era}' not in configuration (available: {})",
                self.eras.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Module identifier of a channel.
    pub fn channel_module(&self, channel: &str) -> Result<&str> {
        self.channels.get(channel).map(|s| s.as_str()).ok_or_else(|| {
            Error::Config(format!(
                "channel '{channel}' not in configuration (available: {})",
                self.channels.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Set a top-level key by name (the `set` sub-command).
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "jobdir" => self.jobdir = value.to_string(),
            "outdir" => self.outdir = value.to_string(),
            "picodir" => self.picodir = value.to_string(),
            "filelistdir" => self.filelistdir = value.to_string(),
            "batch" => self.batch = value.to_string(),
            "queue" => self.queue = value.to_string(),
            "batchopts" => self.batchopts = value.to_string(),
            "nfilesperjob" => {
                self.nfilesperjob = value
                    .parse()
                    .map_err(|_| Error::Config(format!("nfilesperjob must be an integer: {value}")))?
            }
            "maxevtsperjob" => {
                self.maxevtsperjob = value
                    .parse()
                    .map_err(|_| Error::Config(format!("maxevtsperjob must be an integer: {value}")))?
            }
            "ncores" => {
                self.ncores = value
                    .parse()
                    .map_err(|_| Error::Config(format!("ncores must be an integer: {value}")))?
            }
            other => return Err(Error::Config(format!("unknown configuration key '{other}'"))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_use_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.batch, "HTCondor");
        assert!(Config::path(dir.path()).is_file());
        // second load reads it back
        let again = Config::load(dir.path()).unwrap();
        assert_eq!(again.nfilesperjob, 1);
    }

    #[test]
    fn unknown_era_is_config_error() {
        let config = Config::default();
        assert!(matches!(config.era_samples("UL2018"), Err(Error::Config(_))));
        assert!(config.channel_module("mutau").is_ok());
    }

    #[test]
    fn set_key_parses_numbers() {
        let mut config = Config::default();
        config.set_key("maxevtsperjob", "500000").unwrap();
        assert_eq!(config.maxevtsperjob, 500_000);
        assert!(config.set_key("ncores", "lots").is_err());
        assert!(config.set_key("nonsense", "1").is_err());
    }
}

//! PSI T3 dCache storage (`/pnfs/psi.ch/...`).

use std::path::PathBuf;

use pico_core::{Error, Result, match_glob};

use crate::command;
use crate::system::{StorageSystem, fs_cp, fs_exists, fs_ls, guard_rm_root};

const DOOR: &str = "root://t3dcachedb03.psi.ch";
const GSIFTP: &str = "gsiftp://t3se01.psi.ch";

/// dCache storage element at the PSI Tier-3. The namespace is usually
/// mounted read-only; writes always go through the grid transports.
pub struct Dcache {
    base: String,
    mounted: bool,
}

impl Dcache {
    /// Storage rooted at a `/pnfs/psi.ch/...` path.
    pub fn new(path: impl Into<String>) -> Self {
        let base = path.into().trim_end_matches('/').to_string();
        let mounted = fs_exists(&crate::system::parent_root(&base));
        Dcache { base, mounted }
    }
}

impl StorageSystem for Dcache {
    fn base(&self) -> &str {
        &self.base
    }

    fn file_url(&self) -> &str {
        "root://t3dcachedb03.psi.ch/"
    }

    fn mounted(&self) -> bool {
        self.mounted
    }

    fn tmpdir(&self) -> PathBuf {
        let user = std::env::var("USER").unwrap_or_else(|_| "pico".to_string());
        let scratch = PathBuf::from("/scratch").join(user);
        if scratch.parent().is_some_and(|p| p.exists()) { scratch } else { std::env::temp_dir() }
    }

    fn exists(&self, path: &str) -> bool {
        let path = self.expand(path);
        if self.mounted {
            fs_exists(&path)
        } else {
            command::succeeds(&format!("xrdfs {DOOR} stat {path}"))
        }
    }

    fn ls(&self, path: &str, filter: Option<&str>) -> Result<Vec<String>> {
        let path = self.expand(path);
        if self.mounted {
            return fs_ls(&path, filter);
        }
        let out = command::run(&format!("xrdfs {DOOR} ls {path}"))?;
        let mut names: Vec<String> = out
            .lines()
            .filter_map(|l| l.trim().rsplit('/').next())
            .map(|l| l.to_string())
            .filter(|l| !l.is_empty())
            .filter(|l| filter.is_none_or(|pat| match_glob(l, pat)))
            .collect();
        names.sort();
        Ok(names)
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let path = self.expand(path);
        command::run(&format!("LD_LIBRARY_PATH='' PYTHONPATH='' gfal-mkdir -p {GSIFTP}/{path}"))
            .map(|_| ())
    }

    fn cp(&self, source: &str, target: &str) -> Result<()> {
        let source = self.expand(source);
        let target = self.expand(target);
        if self.mounted && !target.starts_with("/pnfs/") {
            // reads are fine through the mounted namespace
            return fs_cp(&source, &target);
        }
        let url = |p: &str| {
            if p.starts_with("/pnfs/") { format!("{DOOR}/{p}") } else { p.to_string() }
        };
        command::run(&format!("xrdcp -f {} {}", url(&source), url(&target))).map(|_| ())
    }

    fn rm(&self, path: &str) -> Result<()> {
        let path = self.expand(path);
        guard_rm_root(&self.base, &path)?;
        command::run(&format!("uberftp -rm -r {GSIFTP}/{path}")).map(|_| ())
    }

    fn hadd(&self, sources: &[String], target: &str, via_tmp: bool) -> Result<()> {
        // dCache cannot be written through the mounted namespace.
        if !via_tmp && target.starts_with("/pnfs/") {
            return Err(Error::storage(
                format!("hadd {target}"),
                "dCache target requires via_tmp merge".to_string(),
            ));
        }
        crate::system::default_hadd(self, sources, target, via_tmp)
    }
}

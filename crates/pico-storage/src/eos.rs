//! CERN EOS storage (`/eos/...`).

use std::path::PathBuf;

use pico_core::{Error, Result, match_glob};

use crate::command;
use crate::system::{StorageSystem, fs_cp, fs_exists, fs_ls, fs_mkdir, fs_rm, guard_rm_root};

const MGM_URL: &str = "root://eosuser.cern.ch";

/// EOS storage element. Mounted on lxplus-like hosts; elsewhere operations
/// go through the `eos` command and `xrdcp`.
pub struct Eos {
    base: String,
    mounted: bool,
}

impl Eos {
    /// Storage rooted at an `/eos/...` path.
    pub fn new(path: impl Into<String>) -> Self {
        let base = path.into().trim_end_matches('/').to_string();
        let mounted = fs_exists(&crate::system::parent_root(&base));
        Eos { base, mounted }
    }

    fn eos_cmd(&self, args: &str) -> String {
        format!("EOS_MGM_URL={MGM_URL} eos {args}")
    }
}

impl StorageSystem for Eos {
    fn base(&self) -> &str {
        &self.base
    }

    fn file_url(&self) -> &str {
        if self.mounted { "" } else { "root://eosuser.cern.ch/" }
    }

    fn mounted(&self) -> bool {
        self.mounted
    }

    fn tmpdir(&self) -> PathBuf {
        std::env::temp_dir()
    }

    fn exists(&self, path: &str) -> bool {
        let path = self.expand(path);
        if self.mounted {
            fs_exists(&path)
        } else {
            command::succeeds(&self.eos_cmd(&format!("ls {path}")))
        }
    }

    fn ls(&self, path: &str, filter: Option<&str>) -> Result<Vec<String>> {
        let path = self.expand(path);
        if self.mounted {
            return fs_ls(&path, filter);
        }
        let out = command::run(&self.eos_cmd(&format!("ls {path}")))?;
        let mut names: Vec<String> = out
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .filter(|l| filter.is_none_or(|pat| match_glob(l, pat)))
            .collect();
        names.sort();
        Ok(names)
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let path = self.expand(path);
        if self.mounted {
            fs_mkdir(&path)
        } else {
            command::run(&self.eos_cmd(&format!("mkdir -p {path}"))).map(|_| ())
        }
    }

    fn cp(&self, source: &str, target: &str) -> Result<()> {
        let source = self.expand(source);
        let target = self.expand(target);
        if self.mounted {
            return fs_cp(&source, &target);
        }
        let url = |p: &str| {
            if p.starts_with("/eos/") { format!("root://eoscms.cern.ch/{p}") } else { p.to_string() }
        };
        command::run(&format!("xrdcp -f {} {}", url(&source), url(&target))).map(|_| ())
    }

    fn rm(&self, path: &str) -> Result<()> {
        let path = self.expand(path);
        guard_rm_root(&self.base, &path)?;
        if self.mounted {
            fs_rm(&path)
        } else {
            command::run(&self.eos_cmd(&format!("rm -r {path}"))).map(|_| ())
        }
    }

    fn hadd(&self, sources: &[String], target: &str, via_tmp: bool) -> Result<()> {
        // Writing through the transport only works when mounted.
        if !self.mounted && !via_tmp {
            return Err(Error::storage(
                format!("hadd {target}"),
                "EOS is not mounted; merge requires via_tmp".to_string(),
            ));
        }
        crate::system::default_hadd(self, sources, target, via_tmp)
    }
}

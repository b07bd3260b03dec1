//! Generic grid xrootd storage (`root://host//path`).

use pico_core::{Error, Result, match_glob};

use crate::command;
use crate::system::StorageSystem;

/// Remote xrootd endpoint; never mounted.
pub struct Xrootd {
    base: String,
    host: String,
    root_path: String,
}

impl Xrootd {
    /// Storage rooted at a `root://host//path` URL.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let base = url.into().trim_end_matches('/').to_string();
        let rest = base
            .strip_prefix("root://")
            .ok_or_else(|| Error::Config(format!("not an xrootd URL: {base}")))?;
        let (host, path) = rest
            .split_once('/')
            .ok_or_else(|| Error::Config(format!("xrootd URL without a path: {base}")))?;
        Ok(Xrootd {
            base: base.clone(),
            host: host.to_string(),
            root_path: format!("/{}", path.trim_start_matches('/')),
        })
    }

    /// Strip the scheme+host, keeping the remote path.
    fn remote_path(&self, path: &str) -> String {
        if let Some(rest) = path.strip_prefix("root://") {
            match rest.split_once('/') {
                Some((_, p)) => format!("/{}", p.trim_start_matches('/')),
                None => "/".to_string(),
            }
        } else if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", self.root_path.trim_end_matches('/'), path)
        }
    }
}

impl StorageSystem for Xrootd {
    fn base(&self) -> &str {
        &self.base
    }

    fn file_url(&self) -> &str {
        ""
    }

    fn mounted(&self) -> bool {
        false
    }

    fn expand(&self, path: &str) -> String {
        let path = path.replace("$PATH", &self.base);
        if path.starts_with("root://") {
            path
        } else if path.starts_with('/') {
            format!("root://{}/{}", self.host, path)
        } else {
            format!("{}/{}", self.base.trim_end_matches('/'), path)
        }
    }

    fn exists(&self, path: &str) -> bool {
        let p = self.remote_path(&self.expand(path));
        command::succeeds(&format!("xrdfs {} stat {}", self.host, p))
    }

    fn ls(&self, path: &str, filter: Option<&str>) -> Result<Vec<String>> {
        let p = self.remote_path(&self.expand(path));
        let out = command::run(&format!("xrdfs {} ls {}", self.host, p))?;
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

    fn list_files(&self, path: &str, filter: Option<&str>) -> Result<Vec<String>> {
        let dir = self.remote_path(&self.expand(path));
        let names = self.ls(path, filter)?;
        Ok(names
            .into_iter()
            .map(|n| format!("root://{}/{}/{}", self.host, dir.trim_end_matches('/'), n))
            .collect())
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let p = self.remote_path(&self.expand(path));
        command::run(&format!("xrdfs {} mkdir -p {}", self.host, p)).map(|_| ())
    }

    fn cp(&self, source: &str, target: &str) -> Result<()> {
        command::run(&format!("xrdcp -f {} {}", self.expand(source), self.expand(target)))
            .map(|_| ())
    }

    fn rm(&self, path: &str) -> Result<()> {
        let p = self.remote_path(&self.expand(path));
        crate::system::guard_rm_root(&self.root_path, &p)?;
        command::run(&format!("xrdfs {} rm {}", self.host, p)).map(|_| ())
    }

    fn hadd(&self, sources: &[String], target: &str, via_tmp: bool) -> Result<()> {
        if !via_tmp {
            return Err(Error::storage(
                format!("hadd {target}"),
                "xrootd target requires via_tmp merge".to_string(),
            ));
        }
        crate::system::default_hadd(self, sources, target, via_tmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_parsing() {
        let s = Xrootd::new("root://t3dcachedb03.psi.ch//pnfs/psi.ch/cms/store").unwrap();
        assert_eq!(s.host, "t3dcachedb03.psi.ch");
        assert_eq!(s.root_path, "/pnfs/psi.ch/cms/store");
        assert_eq!(
            s.expand("user/nano_1.json"),
            "root://t3dcachedb03.psi.ch//pnfs/psi.ch/cms/store/user/nano_1.json"
        );
        assert_eq!(s.remote_path(&s.expand("user/nano_1.json")), "/pnfs/psi.ch/cms/store/user/nano_1.json");
    }

    #[test]
    fn rejects_non_xrootd() {
        assert!(Xrootd::new("/eos/user/t/tau").is_err());
    }
}

//! Local filesystem storage.

use std::path::PathBuf;

use pico_core::Result;

use crate::system::{StorageSystem, fs_cp, fs_exists, fs_ls, fs_mkdir, fs_rm, guard_rm_root};

/// Plain local disk; also the behavior every mounted storage reduces to.
pub struct Local {
    base: String,
}

impl Local {
    /// Storage rooted at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Local { base: path.into().trim_end_matches('/').to_string() }
    }
}

impl StorageSystem for Local {
    fn base(&self) -> &str {
        &self.base
    }

    fn mounted(&self) -> bool {
        true
    }

    fn exists(&self, path: &str) -> bool {
        fs_exists(&self.expand(path))
    }

    fn ls(&self, path: &str, filter: Option<&str>) -> Result<Vec<String>> {
        fs_ls(&self.expand(path), filter)
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        fs_mkdir(&self.expand(path))
    }

    fn cp(&self, source: &str, target: &str) -> Result<()> {
        fs_cp(&self.expand(source), &self.expand(target))
    }

    fn rm(&self, path: &str) -> Result<()> {
        let path = self.expand(path);
        guard_rm_root(&self.base, &path)?;
        fs_rm(&path)
    }

    fn tmpdir(&self) -> PathBuf {
        std::env::temp_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().into_owned();
        let store = Local::new(&base);

        store.mkdir("sub").unwrap();
        assert!(store.exists("sub"));

        std::fs::write(dir.path().join("sub/a.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"x").unwrap();
        let files = store.list_files("sub", Some("*.json")).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("sub/a.json"));

        store.cp("sub/a.json", "sub/c.json").unwrap();
        assert!(store.exists("sub/c.json"));

        store.rm("sub").unwrap();
        assert!(!store.exists("sub"));
    }

    #[test]
    fn expand_relative_paths() {
        let store = Local::new("/data/pico");
        assert_eq!(store.expand("out"), "/data/pico/out");
        assert_eq!(store.expand("$PATH/out"), "/data/pico/out");
        assert_eq!(store.expand("/abs/path"), "/abs/path");
    }
}

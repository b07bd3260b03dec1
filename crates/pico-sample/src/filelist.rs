//! On-disk file-list cache.
//!
//! Format: one URL per line with an optional trailing `:<nevents>`, `#`
//! comment lines, and a final `# total: N` line recording the sum. Writers
//! replace the file atomically so concurrent readers never see a torn list.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use pico_core::{Error, InputFile, Result};

/// A resolved file list with optional per-file event counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileList {
    /// File URLs, in listing order.
    pub files: Vec<String>,
    /// Event counts for the files that have been counted.
    pub nevents: BTreeMap<String, u64>,
}

impl FileList {
    /// Wrap a bare URL list.
    pub fn from_urls(files: Vec<String>) -> Self {
        FileList { files, nevents: BTreeMap::new() }
    }

    /// Total event count, if every file has been counted.
    pub fn total(&self) -> Option<u64> {
        self.files.iter().map(|f| self.nevents.get(f).copied()).sum()
    }

    /// Parse the cache format.
    pub fn parse(text: &str) -> Self {
        let mut list = FileList::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            // `URL[:nevents]`: numeric suffixes in the URL itself (ports,
            // event windows) have more than one trailing colon field, so a
            // single split from the right is safe here.
            let parsed = InputFile::parse(line);
            if parsed.range.is_some() {
                // Not a window: the cache stores `URL:count` only.
                list.files.push(line.to_string());
                continue;
            }
            match line.rsplit_once(':') {
                Some((url, count))
                    if !url.is_empty()
                        && !count.is_empty()
                        && count.bytes().all(|b| b.is_ascii_digit()) =>
                {
                    list.files.push(url.to_string());
                    list.nevents.insert(url.to_string(), count.parse().unwrap_or(0));
                }
                _ => list.files.push(line.to_string()),
            }
        }
        list
    }

    /// Load from disk; `Ok(None)` when the cache does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<FileList>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Some(FileList::parse(&text)))
    }

    /// Write atomically (write-temp-then-rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        {
            let mut out = std::fs::File::create(&tmp)?;
            for file in &self.files {
                match self.nevents.get(file) {
                    Some(n) => writeln!(out, "{file}:{n}")?,
                    None => writeln!(out, "{file}")?,
                }
            }
            if let Some(total) = self.total() {
                writeln!(out, "# total: {total}")?;
            }
            out.flush()?;
        }
        std::fs::rename(&tmp, path)
            .map_err(|e| Error::Io(std::io::Error::other(format!("renaming {}: {e}", path.display()))))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_counts() {
        let mut list = FileList::from_urls(vec![
            "root://x//store/nano_1.json".to_string(),
            "root://x//store/nano_2.json".to_string(),
        ]);
        list.nevents.insert("root://x//store/nano_1.json".to_string(), 1000);
        list.nevents.insert("root://x//store/nano_2.json".to_string(), 2500);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files/DY.txt");
        list.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("nano_1.json:1000"));
        assert!(text.ends_with("# total: 3500\n"));

        let back = FileList::load(&path).unwrap().unwrap();
        assert_eq!(back, list);
        assert_eq!(back.total(), Some(3500));
    }

    #[test]
    fn partial_counts_have_no_total() {
        let text = "a.json:10\nb.json\n";
        let list = FileList::parse(text);
        assert_eq!(list.files.len(), 2);
        assert_eq!(list.total(), None);
    }

    #[test]
    fn comments_are_skipped() {
        let list = FileList::parse("# cached 2024-05-01\na.json:5\n# total: 5\n");
        assert_eq!(list.files, vec!["a.json".to_string()]);
        assert_eq!(list.total(), Some(5));
    }

    #[test]
    fn missing_cache_is_none() {
        assert!(FileList::load("/nonexistent/cache.txt").unwrap().is_none());
    }
}

//! The on-disk tuple container: named trees plus named histograms in one
//! self-describing JSON document.
//!
//! The experiment's native event format is out of scope here; this container
//! carries the same observable surface (an `Events` tree with scalar and
//! jagged branches, bookkeeping histograms) and is what the producer writes
//! and the draw layer reads.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use pico_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::histogram::Hist1D;
use crate::tree::Tree;

/// Conventional name of the event tree.
pub const EVENT_TREE: &str = "Events";

/// One tuple file: trees and histograms by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NanoFile {
    trees: BTreeMap<String, Tree>,
    hists: BTreeMap<String, Hist1D>,
}

impl NanoFile {
    /// Empty container.
    pub fn new() -> Self {
        NanoFile::default()
    }

    /// Read a container from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = std::fs::File::open(path)
            .map_err(|e| Error::EventFile(format!("opening {}: {e}", path.display())))?;
        serde_json::from_reader(std::io::BufReader::new(reader))
            .map_err(|e| Error::EventFile(format!("parsing {}: {e}", path.display())))
    }

    /// Write atomically: serialize to a temporary sibling, then rename over
    /// the target so readers never observe a half-written file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        {
            let f = std::fs::File::create(&tmp)?;
            let mut writer = std::io::BufWriter::new(f);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Tree names.
    pub fn tree_names(&self) -> impl Iterator<Item = &str> {
        self.trees.keys().map(|s| s.as_str())
    }

    /// Access a tree.
    pub fn tree(&self, name: &str) -> Result<&Tree> {
        self.trees.get(name).ok_or_else(|| Error::EventFile(format!("no tree '{name}' in file")))
    }

    /// Access a tree mutably.
    pub fn tree_mut(&mut self, name: &str) -> Result<&mut Tree> {
        self.trees.get_mut(name).ok_or_else(|| Error::EventFile(format!("no tree '{name}' in file")))
    }

    /// Insert or replace a tree.
    pub fn put_tree(&mut self, tree: Tree) {
        self.trees.insert(tree.name.clone(), tree);
    }

    /// Access a histogram.
    pub fn hist(&self, name: &str) -> Result<&Hist1D> {
        self.hists.get(name).ok_or_else(|| Error::EventFile(format!("no histogram '{name}' in file")))
    }

    /// Whether a histogram exists.
    pub fn has_hist(&self, name: &str) -> bool {
        self.hists.contains_key(name)
    }

    /// Insert or replace a histogram.
    pub fn put_hist(&mut self, hist: Hist1D) {
        self.hists.insert(hist.name.clone(), hist);
    }

    /// Merge another file into this one: same-name trees are concatenated,
    /// same-name histograms summed, objects unique to `other` copied over.
    pub fn merge_from(&mut self, other: &NanoFile) -> Result<()> {
        for (name, tree) in &other.trees {
            match self.trees.get_mut(name) {
                Some(mine) => mine.concat(tree)?,
                None => {
                    self.trees.insert(name.clone(), tree.clone());
                }
            }
        }
        for (name, hist) in &other.hists {
            match self.hists.get_mut(name) {
                Some(mine) => mine.add(hist)?,
                None => {
                    self.hists.insert(name.clone(), hist.clone());
                }
            }
        }
        Ok(())
    }
}

/// Hadd: merge `sources` into `target`. Trees concatenate and histograms sum
/// across the inputs, in input order.
pub fn merge_files<P: AsRef<Path>>(sources: &[P], target: impl AsRef<Path>) -> Result<()> {
    if sources.is_empty() {
        return Err(Error::Merge("no input files to merge".into()));
    }
    let mut merged = NanoFile::open(&sources[0])?;
    for src in &sources[1..] {
        let next = NanoFile::open(src)?;
        merged.merge_from(&next).map_err(|e| {
            Error::Merge(format!("merging {}: {e}", src.as_ref().display()))
        })?;
    }
    merged.save(target)
}

/// Number of events in the event tree of a file, used for chunk splitting
/// and output validation. A file without an `Events` tree counts as corrupt.
pub fn count_events(path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    let file = NanoFile::open(path)?;
    let tree = file
        .tree(EVENT_TREE)
        .map_err(|_| Error::Integrity(format!("{} has no '{EVENT_TREE}' tree", path.display())))?;
    Ok(tree.nevents())
}

//! The storage back-end interface and shared filesystem helpers.

use std::path::{Path, PathBuf};

use pico_core::{Error, Result, match_glob};

/// Mount-root of a storage path: the first three path components for an
/// absolute path (`/eos/user/t`, `/pnfs/psi.ch/cms`). `rm` refuses to act on
/// it.
pub fn parent_root(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let n = parts.len().min(3);
    format!("/{}", parts[..n].join("/"))
}

/// Uniform file operations over one storage element.
///
/// One concrete implementation exists per URL scheme; all of them are usable
/// whether or not the storage is mounted locally. `exists` never fails; every
/// other operation raises the storage error kind echoing the failing command.
pub trait StorageSystem: Send + Sync {
    /// Base path of this storage element ( `$PATH` expansion target).
    fn base(&self) -> &str;

    /// URL prefix needed to read files through the remote transport
    /// (empty when files are directly readable).
    fn file_url(&self) -> &str {
        ""
    }

    /// Scratch directory for temporary merge targets and staged inputs.
    fn tmpdir(&self) -> PathBuf {
        std::env::temp_dir()
    }

    /// Whether the storage is reachable through the local filesystem.
    fn mounted(&self) -> bool;

    /// Expand `$PATH` against the base and make relative paths absolute
    /// under it.
    fn expand(&self, path: &str) -> String {
        let path = path.replace("$PATH", self.base());
        if path.starts_with('/') || path.starts_with("root://") || path.starts_with('$') {
            path
        } else {
            format!("{}/{}", self.base().trim_end_matches('/'), path)
        }
    }

    /// Whether a path exists. Never fails.
    fn exists(&self, path: &str) -> bool;

    /// List directory entries (names, not recursive), optionally filtered by
    /// a glob pattern.
    fn ls(&self, path: &str, filter: Option<&str>) -> Result<Vec<String>>;

    /// List files in a directory as absolute URLs, prefixed with the
    /// file-read URL when the transport needs one.
    fn list_files(&self, path: &str, filter: Option<&str>) -> Result<Vec<String>> {
        let dir = self.expand(path);
        let names = self.ls(&dir, filter)?;
        let prefix = self.file_url();
        Ok(names
            .into_iter()
            .map(|name| {
                let full = format!("{}/{}", dir.trim_end_matches('/'), name);
                if prefix.is_empty() || full.starts_with("root://") {
                    full
                } else {
                    format!("{prefix}{full}")
                }
            })
            .collect())
    }

    /// Create a directory recursively; idempotent.
    fn mkdir(&self, path: &str) -> Result<()>;

    /// Copy a file.
    fn cp(&self, source: &str, target: &str) -> Result<()>;

    /// Remove a file or directory tree. Refuses the mount root.
    fn rm(&self, path: &str) -> Result<()>;

    /// Ensure a directory exists.
    fn ensure_dir(&self, path: &str) -> Result<()> {
        let path = self.expand(path);
        if !self.exists(&path) { self.mkdir(&path) } else { Ok(()) }
    }

    /// Merge `sources` into `target` (concatenate same-name trees, sum
    /// same-name histograms).
    ///
    /// Inputs that are not directly readable are staged to scratch first.
    /// With `via_tmp` the merge is performed into a scratch file and the
    /// result copied to the target, for back-ends that cannot write through
    /// their URL.
    fn hadd(&self, sources: &[String], target: &str, via_tmp: bool) -> Result<()> {
        default_hadd(self, sources, target, via_tmp)
    }
}

/// Shared hadd implementation: stage remote inputs, merge locally, copy the
/// result through the back-end when `via_tmp`.
pub fn default_hadd<S: StorageSystem + ?Sized>(
    sys: &S,
    sources: &[String],
    target: &str,
    via_tmp: bool,
) -> Result<()> {
    let target = sys.expand(target);
    let scratch = sys.tmpdir().join(format!("hadd.{}", std::process::id()));
    std::fs::create_dir_all(&scratch)
        .map_err(|e| Error::storage(format!("mkdir {}", scratch.display()), e.to_string()))?;

    // Stage remote inputs.
    let mut staged: Vec<PathBuf> = Vec::with_capacity(sources.len());
    for (i, src) in sources.iter().enumerate() {
        let src = sys.expand(src);
        let local = src.strip_prefix(sys.file_url()).unwrap_or(&src);
        if Path::new(local).is_file() {
            staged.push(PathBuf::from(local));
        } else {
            let stage_to = scratch.join(format!("in_{i}"));
            sys.cp(&src, &stage_to.to_string_lossy())?;
            staged.push(stage_to);
        }
    }

    let htarget = if via_tmp {
        scratch.join(
            Path::new(&target)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "hadd_out".to_string()),
        )
    } else {
        PathBuf::from(&target)
    };

    pico_nano::merge_files(&staged, &htarget)?;

    if via_tmp {
        sys.cp(&htarget.to_string_lossy(), &target)?;
    }
    let _ = std::fs::remove_dir_all(&scratch);
    Ok(())
}

// ── shared filesystem implementations ──────────────────────────
//
// Mounted back-ends (local disk, mounted EOS/dCache) all go through these;
// errors keep the echoed-command convention.

pub(crate) fn fs_exists(path: &str) -> bool {
    Path::new(path).exists()
}

pub(crate) fn fs_ls(path: &str, filter: Option<&str>) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(path)
        .map_err(|e| Error::storage(format!("ls {path}"), e.to_string()))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::storage(format!("ls {path}"), e.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if filter.is_none_or(|pat| match_glob(&name, pat)) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

pub(crate) fn fs_mkdir(path: &str) -> Result<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| Error::storage(format!("mkdir -p {path}"), e.to_string()))
}

pub(crate) fn fs_cp(source: &str, target: &str) -> Result<()> {
    if let Some(parent) = Path::new(target).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::storage(format!("cp {source} {target}"), e.to_string()))?;
    }
    std::fs::copy(source, target)
        .map(|_| ())
        .map_err(|e| Error::storage(format!("cp {source} {target}"), e.to_string()))
}

pub(crate) fn fs_rm(path: &str) -> Result<()> {
    let p = Path::new(path);
    let res = if p.is_dir() { std::fs::remove_dir_all(p) } else { std::fs::remove_file(p) };
    res.map_err(|e| Error::storage(format!("rm -rf {path}"), e.to_string()))
}

pub(crate) fn guard_rm_root(base: &str, path: &str) -> Result<()> {
    let root = parent_root(base);
    let path = path.trim_end_matches('/');
    if path == root || path.is_empty() || path == "/" {
        return Err(Error::storage(
            format!("rm -rf {path}"),
            "refusing to remove storage mount root".to_string(),
        ));
    }
    Ok(())
}

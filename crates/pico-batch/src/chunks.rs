//! Partitioning a sample's file list into job chunks.
//!
//! Two strategies: group whole files (`files_per_job`) or bound the summed
//! event count per chunk (`max_events_per_job`). In the second mode a file
//! larger than the maximum is divided into contiguous `URL:first:count`
//! windows spread as evenly as possible over the minimum number of ranges,
//! and small files are packed first-fit-decreasing. Inputs that already
//! carry a window are never re-split.

use std::collections::BTreeMap;

use pico_core::{InputFile, Result};
use rayon::prelude::*;

/// Group files into chunks of at most `per_job` files, preserving order.
pub fn chunkify(files: &[InputFile], per_job: usize) -> Vec<Vec<InputFile>> {
    let per_job = per_job.max(1);
    files.chunks(per_job).map(|c| c.to_vec()).collect()
}

/// Partition into `nparts` chunks of as even a size as possible, preserving
/// order.
pub fn partition(files: &[InputFile], nparts: usize) -> Vec<Vec<InputFile>> {
    let nparts = nparts.max(1);
    let mut parts = Vec::with_capacity(nparts);
    let mut left = files.len();
    let mut start = 0;
    for i in 0..nparts {
        let take = left.div_ceil(nparts - i);
        parts.push(files[start..start + take].to_vec());
        start += take;
        left -= take;
    }
    parts.retain(|p| !p.is_empty());
    parts
}

/// Divide `nevts` into the minimum number of `<= nmax` windows of near-equal
/// size (sizes differ by at most one event).
fn even_ranges(nevts: u64, nmax: u64) -> Vec<(u64, u64)> {
    if nevts == 0 {
        return Vec::new();
    }
    let nchunks = nevts.div_ceil(nmax);
    let base = nevts / nchunks;
    let rem = nevts % nchunks;
    let mut ranges = Vec::with_capacity(nchunks as usize);
    let mut first = 0;
    for i in 0..nchunks {
        let count = base + u64::from(i < rem);
        ranges.push((first, count));
        first += count;
    }
    ranges
}

/// Group sums of at most `nmax`, first-fit decreasing.
fn partition_by_max(mut counts: Vec<u64>, nmax: u64) -> Vec<Vec<u64>> {
    counts.sort_unstable_by(|a, b| b.cmp(a));
    let mut used = vec![false; counts.len()];
    let mut groups = Vec::new();
    for i in 0..counts.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let mut group = vec![counts[i]];
        let mut total = counts[i];
        for j in i + 1..counts.len() {
            if !used[j] && total + counts[j] <= nmax {
                used[j] = true;
                total += counts[j];
                group.push(counts[j]);
            }
        }
        groups.push(group);
    }
    groups
}

/// Split a file list by events.
///
/// `counts` must hold the event count of every un-windowed file. Returns the
/// total number of events covered and the chunk list. The partition is
/// exhaustive and disjoint: every event of every input is assigned to
/// exactly one chunk, and pre-windowed inputs pass through as their own
/// chunk.
pub fn chunkify_by_evts(
    files: &[InputFile],
    nmax: u64,
    counts: &BTreeMap<String, u64>,
) -> Result<(u64, Vec<Vec<InputFile>>)> {
    let mut chunks: Vec<Vec<InputFile>> = Vec::new();
    let mut total = 0u64;

    // Pre-windowed inputs are never re-split.
    let mut large: Vec<(&str, u64)> = Vec::new();
    let mut small: BTreeMap<u64, Vec<&str>> = BTreeMap::new();
    for file in files {
        if let Some((_, count)) = file.range {
            total += count;
            chunks.push(vec![file.clone()]);
            continue;
        }
        let n = counts.get(&file.url).copied().ok_or_else(|| {
            pico_core::Error::Config(format!("no event count for input file '{}'", file.url))
        })?;
        total += n;
        if n > nmax {
            large.push((&file.url, n));
        } else if n > 0 {
            small.entry(n).or_default().push(&file.url);
        }
        // a zero-event file contributes no chunk
    }

    for (url, nevts) in large {
        for (first, count) in even_ranges(nevts, nmax) {
            chunks.push(vec![InputFile::ranged(url, first, count)]);
        }
    }

    let small_counts: Vec<u64> = small.iter().flat_map(|(&n, urls)| urls.iter().map(move |_| n)).collect();
    for group in partition_by_max(small_counts, nmax) {
        let mut chunk = Vec::with_capacity(group.len());
        for n in group {
            let urls = small.get_mut(&n).unwrap();
            let url = urls.remove(0);
            chunk.push(InputFile::whole(url));
        }
        chunks.push(chunk);
    }

    Ok((total, chunks))
}

/// Probe the event counts of files missing from `known`, at most
/// `max_probes` files concurrently. Already-known counts are reused; counts
/// of windowed inputs are not needed.
pub fn probe_counts(
    files: &[InputFile],
    known: &BTreeMap<String, u64>,
    max_probes: usize,
) -> Result<BTreeMap<String, u64>> {
    let missing: Vec<&str> = files
        .iter()
        .filter(|f| f.range.is_none() && !known.contains_key(&f.url))
        .map(|f| f.url.as_str())
        .collect();
    let mut counts = known.clone();
    if missing.is_empty() {
        return Ok(counts);
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_probes.max(1))
        .build()
        .map_err(|e| pico_core::Error::Config(format!("cannot build probe pool: {e}")))?;
    let probed: Vec<(String, Result<u64>)> = pool.install(|| {
        missing
            .par_iter()
            .map(|&url| (url.to_string(), probe_one(url)))
            .collect()
    });
    for (url, result) in probed {
        counts.insert(url, result?);
    }
    Ok(counts)
}

fn probe_one(url: &str) -> Result<u64> {
    if std::path::Path::new(url).is_file() {
        return pico_nano::count_events(url);
    }
    // Remote file: stage it to scratch to count.
    let scratch = std::env::temp_dir().join(format!("pico_probe.{}", std::process::id()));
    std::fs::create_dir_all(&scratch)?;
    let local = scratch.join(format!("probe_{:x}", fxhash(url)));
    let storage = pico_storage::storage_for(url)?;
    storage.cp(url, &local.to_string_lossy())?;
    let n = pico_nano::count_events(&local);
    let _ = std::fs::remove_file(&local);
    n
}

fn fxhash(s: &str) -> u64 {
    // Small stable hash for scratch file names.
    s.bytes().fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3))
}

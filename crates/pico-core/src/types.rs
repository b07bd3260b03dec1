//! Common data types shared across the framework.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of a physics sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    /// Observed collision data.
    Data,
    /// Simulated process.
    Mc,
    /// Tau-embedded hybrid sample.
    #[serde(rename = "embed")]
    Embedded,
}

impl DataKind {
    /// Recognize the sample kind from a catalogue path.
    ///
    /// Mirrors the catalogue conventions: embedded samples carry `Embed` in
    /// the path, simulation ends in `SIM` or names a generator, and data
    /// paths carry a `Run20xx` era block.
    pub fn from_path(path: &str) -> Option<DataKind> {
        if path.contains("Embed") {
            return Some(DataKind::Embedded);
        }
        if path.ends_with("SIM") || path.contains("pythia") || path.contains("madgraph") {
            return Some(DataKind::Mc);
        }
        let bytes = path.as_bytes();
        for i in 0..bytes.len().saturating_sub(8) {
            if &bytes[i..i + 6] == b"/Run20"
                && bytes[i + 6].is_ascii_digit()
                && bytes[i + 7].is_ascii_digit()
            {
                return Some(DataKind::Data);
            }
        }
        None
    }

    /// Parse from the command-line spelling (`data`, `mc`, `embed`).
    pub fn parse(s: &str) -> Result<DataKind> {
        match s {
            "data" => Ok(DataKind::Data),
            "mc" => Ok(DataKind::Mc),
            "embed" | "embedded" => Ok(DataKind::Embedded),
            _ => Err(Error::Config(format!("unknown data type '{s}' (choose data, mc, embed)"))),
        }
    }

    /// Command-line spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Data => "data",
            DataKind::Mc => "mc",
            DataKind::Embedded => "embed",
        }
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input file of a job chunk: a URL plus an optional contiguous event
/// window, encoded on the wire as `URL:first:count`.
///
/// The window is carried through job configs and task lists so that a large
/// file can be processed by several jobs without overlap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct InputFile {
    /// File URL (local path, `/eos/...`, `/pnfs/...` or `root://...`).
    pub url: String,
    /// Optional `(first_event, max_events)` window.
    pub range: Option<(u64, u64)>,
}

impl InputFile {
    /// A whole-file input.
    pub fn whole(url: impl Into<String>) -> Self {
        InputFile { url: url.into(), range: None }
    }

    /// An event-windowed input.
    pub fn ranged(url: impl Into<String>, first: u64, count: u64) -> Self {
        InputFile { url: url.into(), range: Some((first, count)) }
    }

    /// Parse the `URL:first:count` encoding. URLs may themselves contain
    /// colons (`root://host//store/...`), so the numeric fields are taken
    /// from the right.
    pub fn parse(spec: &str) -> Self {
        let mut tail = spec.rsplitn(3, ':');
        let count = tail.next();
        let first = tail.next();
        let url = tail.next();
        if let (Some(url), Some(first), Some(count)) = (url, first, count)
            && let (Ok(first), Ok(count)) = (first.parse::<u64>(), count.parse::<u64>())
            && !url.is_empty()
        {
            return InputFile { url: url.to_string(), range: Some((first, count)) };
        }
        InputFile { url: spec.to_string(), range: None }
    }

    /// Wire encoding (`URL` or `URL:first:count`).
    pub fn encode(&self) -> String {
        match self.range {
            Some((first, count)) => format!("{}:{}:{}", self.url, first, count),
            None => self.url.clone(),
        }
    }
}

impl From<InputFile> for String {
    fn from(f: InputFile) -> String {
        f.encode()
    }
}

impl TryFrom<String> for InputFile {
    type Error = std::convert::Infallible;
    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Ok(InputFile::parse(&s))
    }
}

impl std::fmt::Display for InputFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Integrated luminosity per era in fb⁻¹, used for simulation normalization.
pub fn era_lumi(era: &str) -> Option<f64> {
    // Values from the LUM POG recommendations for the ultra-legacy campaigns.
    match era.trim_start_matches("UL") {
        "2016_preVFP" => Some(19.52),
        "2016_postVFP" => Some(16.81),
        "2016" => Some(36.33),
        "2017" => Some(41.48),
        "2018" => Some(59.83),
        "2022" => Some(38.01),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_path() {
        assert_eq!(
            DataKind::from_path("/DYJetsToLL_M-50_madgraphMLM-pythia8/RunIISummer20UL2018/NANOAODSIM"),
            Some(DataKind::Mc)
        );
        assert_eq!(
            DataKind::from_path("/SingleMuon/Run2018D-UL2018_MiniAODv2_NanoAODv9-v1/NANOAOD"),
            Some(DataKind::Data)
        );
        assert_eq!(
            DataKind::from_path("/EmbeddingRun2018D/MuTauFinalState-v1/NANOAODSIM"),
            Some(DataKind::Embedded)
        );
        assert_eq!(DataKind::from_path("/not/a/known/format"), None);
    }

    #[test]
    fn input_file_roundtrip() {
        let f = InputFile::parse("root://xrootd.example//store/nano_1.root:540702:540702");
        assert_eq!(f.url, "root://xrootd.example//store/nano_1.root");
        assert_eq!(f.range, Some((540702, 540702)));
        assert_eq!(f.encode(), "root://xrootd.example//store/nano_1.root:540702:540702");

        let g = InputFile::parse("/eos/user/t/tau/nano_2.root");
        assert_eq!(g.range, None);
        assert_eq!(g.encode(), "/eos/user/t/tau/nano_2.root");
    }

    #[test]
    fn input_file_ignores_nonnumeric_tail() {
        let f = InputFile::parse("root://host:1094//store/file.root");
        assert_eq!(f.range, None);
        assert_eq!(f.url, "root://host:1094//store/file.root");
    }

    #[test]
    fn lumi_lookup() {
        assert_eq!(era_lumi("UL2018"), Some(59.83));
        assert_eq!(era_lumi("2017"), Some(41.48));
        assert_eq!(era_lumi("1999"), None);
    }
}

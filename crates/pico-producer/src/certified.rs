//! Certified-run filtering for data.
//!
//! Collision data is filtered against the certification JSON: a map from run
//! number to the luminosity-block ranges declared good. Events outside the
//! map are skipped before any module runs.

use std::collections::BTreeMap;
use std::path::Path;

use pico_core::{Error, Result};

/// The good-run/lumi-section map.
#[derive(Debug, Clone, Default)]
pub struct CertifiedLumis {
    runs: BTreeMap<u32, Vec<(u32, u32)>>,
}

impl CertifiedLumis {
    /// Load the certification JSON (`{"315257": [[1, 88], [91, 92]], ...}`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read certification JSON {}: {e}", path.display())))?;
        Self::parse(&text)
            .map_err(|e| Error::Config(format!("malformed certification JSON {}: {e}", path.display())))
    }

    /// Parse the certification JSON from a string.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: BTreeMap<String, Vec<Vec<u32>>> = serde_json::from_str(text)?;
        let mut runs = BTreeMap::new();
        for (run, ranges) in raw {
            let run: u32 = run
                .parse()
                .map_err(|_| Error::Config(format!("non-numeric run number '{run}'")))?;
            let mut spans = Vec::with_capacity(ranges.len());
            for range in ranges {
                match range.as_slice() {
                    [lo, hi] if lo <= hi => spans.push((*lo, *hi)),
                    other => {
                        return Err(Error::Config(format!(
                            "bad lumi range {other:?} for run {run}"
                        )));
                    }
                }
            }
            spans.sort_unstable();
            runs.insert(run, spans);
        }
        Ok(CertifiedLumis { runs })
    }

    /// Whether `(run, luminosity block)` is certified.
    pub fn contains(&self, run: u32, lumi: u32) -> bool {
        self.runs
            .get(&run)
            .is_some_and(|spans| spans.iter().any(|&(lo, hi)| lo <= lumi && lumi <= hi))
    }

    /// Number of certified runs.
    pub fn nruns(&self) -> usize {
        self.runs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership() {
        let json = r#"{"315257": [[1, 88], [91, 92]], "315259": [[1, 172]]}"#;
        let cert = CertifiedLumis::parse(json).unwrap();
        assert_eq!(cert.nruns(), 2);
        assert!(cert.contains(315257, 1));
        assert!(cert.contains(315257, 88));
        assert!(!cert.contains(315257, 89));
        assert!(cert.contains(315257, 92));
        assert!(!cert.contains(999999, 1));
    }

    #[test]
    fn malformed_is_fatal() {
        assert!(CertifiedLumis::parse("{\"abc\": [[1, 2]]}").is_err());
        assert!(CertifiedLumis::parse("{\"1\": [[5, 2]]}").is_err());
        assert!(CertifiedLumis::parse("not json").is_err());
    }
}

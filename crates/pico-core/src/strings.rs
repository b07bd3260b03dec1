//! String helpers: `$KEY` replacement in path patterns and glob-style
//! matching of sample names.

use glob::Pattern;

/// Replace `$KEY` variables in a path pattern.
///
/// Keys are replaced longest-first so that `$CHANNEL` is not clobbered by a
/// `$CHA` key. Unknown variables are left untouched so that later expansion
/// stages (e.g. the storage layer's `$PATH`) can still resolve them.
pub fn repkey(pattern: &str, keys: &[(&str, &str)]) -> String {
    let mut out = pattern.to_string();
    let mut sorted: Vec<&(&str, &str)> = keys.iter().collect();
    sorted.sort_by_key(|(k, _)| std::cmp::Reverse(k.len()));
    for (key, val) in sorted {
        out = out.replace(&format!("${key}"), val);
    }
    out
}

/// Match a sample name against a user pattern.
///
/// Patterns containing glob metacharacters are matched with an implied
/// trailing `*`; plain patterns match as a name prefix, which lets
/// `-s DYJets` select `DYJetsToLL_M-50` without wildcards.
pub fn match_sample(name: &str, pattern: &str) -> bool {
    let name = name.trim_matches('/');
    if pattern.contains('*') || pattern.contains('?') || (pattern.contains('[') && pattern.contains(']')) {
        Pattern::new(&format!("{pattern}*")).map(|p| p.matches(name)).unwrap_or(false)
    } else {
        name.starts_with(pattern)
    }
}

/// Match against any of the given patterns; an empty list matches everything.
pub fn match_any(name: &str, patterns: &[String]) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| match_sample(name, p))
}

/// Glob match for file names (no prefix semantics).
pub fn match_glob(name: &str, pattern: &str) -> bool {
    Pattern::new(pattern).map(|p| p.matches(name)).unwrap_or(false)
}

/// Normalize a user tag to start with an underscore, as used in file names.
pub fn tagify(tag: &str) -> String {
    if tag.is_empty() || tag.starts_with('_') { tag.to_string() } else { format!("_{tag}") }
}

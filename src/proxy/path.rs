//! Path normalization and request fingerprints.
//!
//! [`clean`] collapses `.`, `..` and repeated separators the way a rooted
//! POSIX path is cleaned. [`rewrite`] then maps a cleaned path under the
//! proxy prefix to the path forwarded upstream. The forwarded path plus
//! the raw query string form the [`Fingerprint`] used as the selection
//! cache key.

use std::fmt;

use crate::config::model::PathRewrite;

/// Lexically clean a request path. The result is always rooted, never has
/// a trailing slash (except for `/` itself), and never climbs above root.
#[must_use]
pub fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut cleaned = String::with_capacity(path.len());
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() {
        cleaned.push('/');
    }
    cleaned
}

/// Compute the upstream path for `path`, or `None` when the cleaned path
/// no longer sits under `prefix` (e.g. `/api/../admin`).
#[must_use]
pub fn rewrite(path: &str, prefix: &str, mode: PathRewrite) -> Option<String> {
    let cleaned = clean(path);
    let rest = cleaned.strip_prefix(prefix)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        // `/apiary` is not under `/api`
        return None;
    }

    let forwarded = match mode {
        PathRewrite::StripPrefix if rest.is_empty() => "/".to_string(),
        PathRewrite::StripPrefix => rest.to_string(),
        PathRewrite::LastSegment if rest.is_empty() => cleaned.clone(),
        PathRewrite::LastSegment => {
            let last = rest.rsplit('/').next().unwrap_or_default();
            format!("/{last}")
        }
    };
    Some(forwarded)
}

/// Selection cache key: `<forwarded path>-<raw query>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn new(path: &str, query: Option<&str>) -> Self {
        Self(format!("{path}-{}", query.unwrap_or_default()))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

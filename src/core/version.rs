//! Version parsing, comparison, and target-version resolution.
//!
//! Module versions are dotted numerics with up to three segments and an
//! optional prerelease suffix (`2.0.1-beta2`). A version expression is
//! either a literal or an auto-step pattern with a trailing wildcard
//! (`2.0.X`) resolved against the highest of the remote registry and the
//! local manifest.

use std::cmp::Ordering;

use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Parse a version string, padding missing segments with zero.
/// Accepts `2`, `2.0`, `2.0.1`, and `2.0.1-beta2`. Returns None for
/// anything with more than three numeric segments or non-numeric parts.
pub fn parse_lenient(value: &str) -> Option<Version> {
    let trimmed = value.trim().trim_start_matches('v');
    if trimmed.is_empty() {
        return None;
    }

    let (numeric, pre) = match trimmed.split_once('-') {
        Some((n, p)) => (n, Some(p)),
        None => (trimmed, None),
    };

    let parts: Vec<u64> = numeric
        .split('.')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<u64>>>()?;
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let segment = |idx: usize| parts.get(idx).copied().unwrap_or(0);
    let pre = match pre {
        Some(p) => Prerelease::new(p).ok()?,
        None => Prerelease::EMPTY,
    };

    Some(Version {
        major: segment(0),
        minor: segment(1),
        patch: segment(2),
        pre,
        build: BuildMetadata::EMPTY,
    })
}

/// Compare two version strings leniently. None when either fails to parse.
/// Numeric parts compare first; equal numerics fall back to the prerelease
/// tag, string-ordinal, with a release outranking its own prereleases.
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    let left = parse_lenient(a)?;
    let right = parse_lenient(b)?;

    let numeric = (left.major, left.minor, left.patch)
        .cmp(&(right.major, right.minor, right.patch));
    if numeric != Ordering::Equal {
        return Some(numeric);
    }

    let left_pre = (!left.pre.is_empty()).then(|| left.pre.as_str());
    let right_pre = (!right.pre.is_empty()).then(|| right.pre.as_str());
    Some(compare_prerelease(left_pre, right_pre))
}

/// Compare prerelease tags by string ordinal; a missing tag sorts after any
/// tag so a release outranks its own prereleases.
pub fn compare_prerelease(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

/// Where the resolved version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    Literal,
    Remote,
    LocalManifest,
    Default,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedVersion {
    pub version: String,
    pub source: VersionSource,
}

fn wildcard_position(expression: &str) -> Option<usize> {
    let parts: Vec<&str> = expression.split('.').collect();
    let last = parts.last()?;
    if last.eq_ignore_ascii_case("x") {
        Some(parts.len() - 1)
    } else {
        None
    }
}

/// True when the expression is an auto-step pattern (`2.0.X`).
pub fn is_auto_step(expression: &str) -> bool {
    wildcard_position(expression.trim()).is_some()
}

/// Resolve a version expression into a concrete version.
///
/// Literal expressions resolve to themselves. Auto-step expressions pick the
/// higher of the remote registry's latest and the local manifest's declared
/// version (ties prefer remote), then increment the wildcard segment.
/// Candidates whose fixed segments do not match the expression prefix are
/// ignored; with no usable candidate the wildcard becomes zero.
pub fn resolve_expression(
    expression: &str,
    remote: Option<&str>,
    local: Option<&str>,
) -> Result<ResolvedVersion> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(Error::config_missing_key(
            "build.versionExpression",
            None,
        ));
    }

    let Some(wildcard_index) = wildcard_position(expression) else {
        if parse_lenient(expression).is_none() {
            return Err(Error::config_invalid_value(
                "build.versionExpression",
                Some(expression.to_string()),
                format!("'{}' is not a valid version or auto-step pattern", expression),
            ));
        }
        return Ok(ResolvedVersion {
            version: expression.to_string(),
            source: VersionSource::Literal,
        });
    };

    if wildcard_index > 2 {
        return Err(Error::config_invalid_value(
            "build.versionExpression",
            Some(expression.to_string()),
            "Auto-step patterns support at most three segments",
        ));
    }

    let prefix: Vec<u64> = expression
        .split('.')
        .take(wildcard_index)
        .map(|p| {
            p.parse::<u64>().map_err(|_| {
                Error::config_invalid_value(
                    "build.versionExpression",
                    Some(expression.to_string()),
                    format!("Segment '{}' before the wildcard must be numeric", p),
                )
            })
        })
        .collect::<Result<Vec<u64>>>()?;

    let prefix_matches = |version: &Version| -> bool {
        let segments = [version.major, version.minor, version.patch];
        prefix
            .iter()
            .enumerate()
            .all(|(idx, expected)| segments[idx] == *expected)
    };

    // Remote is evaluated first; local must be strictly greater to win,
    // so equal candidates prefer the remote value.
    let mut best: Option<(Version, VersionSource)> = None;
    let candidates = [
        (remote, VersionSource::Remote),
        (local, VersionSource::LocalManifest),
    ];
    for (value, source) in candidates {
        let Some(parsed) = value.and_then(parse_lenient) else {
            continue;
        };
        if !prefix_matches(&parsed) {
            continue;
        }
        match &best {
            Some((current, _)) if parsed <= *current => {}
            _ => best = Some((parsed, source)),
        }
    }

    let (stepped_segment, source) = match best {
        Some((version, source)) => {
            let segments = [version.major, version.minor, version.patch];
            (segments[wildcard_index] + 1, source)
        }
        None => (0, VersionSource::Default),
    };

    let mut segments: Vec<String> = prefix.iter().map(u64::to_string).collect();
    segments.push(stepped_segment.to_string());

    Ok(ResolvedVersion {
        version: segments.join("."),
        source,
    })
}

//! Regex extraction helpers shared by export scanning and help extraction.

use regex::Regex;

/// Ensure a pattern runs in multi-line mode.
pub fn ensure_multiline(pattern: &str) -> String {
    if pattern.starts_with("(?m)") {
        pattern.to_string()
    } else {
        format!("(?m){}", pattern)
    }
}

/// Extract the first capture group of the first match.
/// Returns None for invalid patterns or no match.
pub fn extract_first(content: &str, pattern: &str) -> Option<String> {
    let regex = Regex::new(&ensure_multiline(pattern)).ok()?;
    regex
        .captures(content.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extract the first capture group of every match.
/// Returns None for invalid patterns; an empty Vec means no matches.
pub fn extract_all(content: &str, pattern: &str) -> Option<Vec<String>> {
    let regex = Regex::new(&ensure_multiline(pattern)).ok()?;
    Some(
        regex
            .captures_iter(content.trim())
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect(),
    )
}

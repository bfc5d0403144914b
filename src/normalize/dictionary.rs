//! Dictionary correction: rewrite known aliases to their canonical form.

use log::warn;
use regex::{NoExpand, Regex};

use super::DictionaryEntry;

/// Apply dictionary corrections to `text`.
///
/// Each entry expands to one (pattern, replacement) pair per alias; an
/// alias-less entry maps its canonical text to itself. Pairs apply
/// longest-pattern-first so an overlapping longer alias wins. Matching
/// is whole-word, case-insensitive and literal: user-supplied aliases
/// never act as regex syntax.
pub fn correct(text: &str, entries: &[DictionaryEntry]) -> String {
    if text.is_empty() || entries.is_empty() {
        return text.to_string();
    }

    let mut pairs: Vec<(&str, &str)> = Vec::new();
    for entry in entries {
        if entry.aliases.is_empty() {
            pairs.push((entry.canonical.as_str(), entry.canonical.as_str()));
        } else {
            for alias in &entry.aliases {
                pairs.push((alias.as_str(), entry.canonical.as_str()));
            }
        }
    }
    pairs.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));

    let mut result = text.to_string();
    for (pattern, replacement) in pairs {
        if pattern.trim().is_empty() {
            continue;
        }
        let word_pattern = format!(r"(?i)\b{}\b", regex::escape(pattern));
        match Regex::new(&word_pattern) {
            Ok(re) => {
                result = re.replace_all(&result, NoExpand(replacement)).to_string();
            }
            Err(e) => {
                warn!("Skipping unusable dictionary pattern '{}': {}", pattern, e);
            }
        }
    }

    result
}

//! Filler removal and formatting cleanup for raw transcripts.
//!
//! Every transform here is idempotent: running the stage on its own
//! output is a no-op. That keeps the pipeline safe to re-apply when a
//! transcript passes through it more than once.

use once_cell::sync::Lazy;
use regex::Regex;

/// Standalone hesitation sounds stripped from transcripts.
pub const FILLER_WORDS: &[&str] = &["um", "uh", "uhh", "umm", "hmm", "er", "erm"];

static FILLER_RE: Lazy<Regex> = Lazy::new(|| {
    // Whole word, case-insensitive, with an optional trailing comma.
    let alternation = FILLER_WORDS.join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b,?", alternation)).unwrap()
});

static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());
static SPACE_BEFORE_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+,").unwrap());
static DOUBLE_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",{2,}").unwrap());
static COMMA_AFTER_PERIOD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.,").unwrap());
static SENTENCE_START_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\. [a-z]").unwrap());
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w']+").unwrap());

/// Remove filler words and normalize spacing, punctuation and casing.
pub fn normalize(text: &str) -> String {
    let cleaned = FILLER_RE.replace_all(text, " ");
    let cleaned = collapse_repeated_words(&cleaned);
    let cleaned = MULTI_SPACE_RE.replace_all(&cleaned, " ");
    let cleaned = SPACE_BEFORE_COMMA_RE.replace_all(&cleaned, ",");
    let cleaned = DOUBLE_COMMA_RE.replace_all(&cleaned, ",");
    let cleaned = COMMA_AFTER_PERIOD_RE.replace_all(&cleaned, ".");
    let cleaned = capitalize_sentence_starts(&cleaned);
    capitalize_first(cleaned.trim())
}

/// Collapse an immediately repeated word ("the the" -> "the").
///
/// The comparison is case-insensitive and the first occurrence's casing
/// is kept. Words only collapse when nothing but whitespace separates
/// them, so "the, the" is left alone. The regex crate has no
/// backreferences, so this walks word spans directly.
fn collapse_repeated_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut prev_word: Option<String> = None;

    for m in WORD_RE.find_iter(text) {
        let gap = &text[cursor..m.start()];
        let lower = m.as_str().to_lowercase();

        let is_repeat = prev_word.as_deref() == Some(lower.as_str())
            && gap.chars().all(char::is_whitespace);

        if is_repeat {
            // Drop the duplicate along with the whitespace before it.
            cursor = m.end();
            continue;
        }

        out.push_str(gap);
        out.push_str(m.as_str());
        cursor = m.end();
        prev_word = Some(lower);
    }

    out.push_str(&text[cursor..]);
    out
}

/// Re-capitalize a lowercase letter immediately following ". ".
///
/// Matches are rewritten right-to-left so earlier offsets stay valid.
fn capitalize_sentence_starts(text: &str) -> String {
    let starts: Vec<usize> = SENTENCE_START_RE.find_iter(text).map(|m| m.start()).collect();
    let mut result = text.to_string();
    for start in starts.into_iter().rev() {
        // The pattern is ASCII-only, so the letter is a single byte at ". x".
        let idx = start + 2;
        let upper = result[idx..idx + 1].to_uppercase();
        result.replace_range(idx..idx + 1, &upper);
    }
    result
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_lowercase() => {
            first.to_uppercase().collect::<String>() + chars.as_str()
        }
        _ => text.to_string(),
    }
}

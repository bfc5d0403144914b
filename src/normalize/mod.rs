//! Transcript normalization pipeline.
//!
//! A finalized transcript flows through a fixed sequence of pure
//! text-to-text rule stages; each stage sees only the text produced by
//! the previous one:
//!
//! ```text
//! raw transcript
//!   │
//!   ▼
//! filler removal ──▶ fragment repair ──▶ intent correction
//!                        (external)          (external)
//!                                                │
//!                                                ▼
//!            dictionary correction ◀── number conversion
//!   │
//!   ▼
//! normalized transcript
//! ```
//!
//! Fragment repair and intent correction are collaborator stages the
//! pipeline composes but does not define; they plug in through
//! [`TextStage`]. Configuration is supplied fresh on every call — the
//! pipeline holds no state between invocations.

pub mod dictionary;
pub mod filler;
pub mod numbers;

use serde::{Deserialize, Serialize};

/// A deterministic, side-effect-free text-to-text transform.
pub trait TextStage: Send + Sync {
    fn apply(&self, text: &str) -> String;
}

impl<F> TextStage for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn apply(&self, text: &str) -> String {
        self(text)
    }
}

/// One dictionary entry: a canonical spelling plus the aliases that
/// should rewrite to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub canonical: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Per-invocation normalization configuration.
///
/// Six independent switches plus the dictionary entry list. The caller
/// supplies this fresh on each call; nothing is cached internally.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NormalizationConfig {
    /// Master switch; when false the input passes through untouched.
    pub enabled: bool,
    pub filler_removal: bool,
    pub fragment_repair: bool,
    pub intent_correction: bool,
    pub number_conversion: bool,
    pub dictionary_correction: bool,
    #[serde(default)]
    pub dictionary: Vec<DictionaryEntry>,
}

/// Applies enabled rule stages to a finalized transcript, in order.
#[derive(Default)]
pub struct NormalizationPipeline {
    fragment_repair: Option<Box<dyn TextStage>>,
    intent_correction: Option<Box<dyn TextStage>>,
}

impl NormalizationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the external fragment-repair stage.
    pub fn with_fragment_repair(mut self, stage: impl TextStage + 'static) -> Self {
        self.fragment_repair = Some(Box::new(stage));
        self
    }

    /// Install the external intent-correction stage.
    pub fn with_intent_correction(mut self, stage: impl TextStage + 'static) -> Self {
        self.intent_correction = Some(Box::new(stage));
        self
    }

    /// Normalize a finalized transcript.
    ///
    /// Returns the input unchanged when the master switch is off or the
    /// trimmed input is empty. Otherwise applies the enabled stages
    /// strictly in order: filler removal, fragment repair, intent
    /// correction, number conversion, dictionary correction.
    pub fn process(&self, raw: &str, config: &NormalizationConfig) -> String {
        if !config.enabled || raw.trim().is_empty() {
            return raw.to_string();
        }

        let mut text = raw.to_string();

        if config.filler_removal {
            text = filler::normalize(&text);
        }
        if config.fragment_repair {
            if let Some(stage) = &self.fragment_repair {
                text = stage.apply(&text);
            }
        }
        if config.intent_correction {
            if let Some(stage) = &self.intent_correction {
                text = stage.apply(&text);
            }
        }
        if config.number_conversion {
            text = numbers::convert(&text);
        }
        if config.dictionary_correction {
            text = dictionary::correct(&text, &config.dictionary);
        }

        text
    }
}

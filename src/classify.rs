//! Pluggable key classification
//!
//! Mappers count symbols under whatever key the classifier assigns. The
//! pipeline only requires that the keys it routes belong to the declared
//! key set; anything else is handled by the unknown-key policy.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::types::Symbol;
use std::collections::{BTreeMap, HashMap};

/// Maps an input symbol to its partition key
pub trait Classifier: Send + Sync {
    /// `None` means the symbol is not counted at all
    fn classify(&self, symbol: &Symbol) -> Option<String>;
}

/// Uses the symbol itself as the key
///
/// Suited to pre-tagged input such as `["noun", "verb", "noun"]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityClassifier;

impl Classifier for IdentityClassifier {
    fn classify(&self, symbol: &Symbol) -> Option<String> {
        Some(symbol.as_str().to_string())
    }
}

/// Looks words up in a fixed word → key table
#[derive(Debug, Clone, Default)]
pub struct LexiconClassifier {
    words: HashMap<String, String>,
}

impl LexiconClassifier {
    /// Build from `key -> [words]` lists, as found in the `[lexicon]` config table
    ///
    /// Words are matched case-insensitively. A word listed under two keys is
    /// ambiguous and rejected.
    pub fn from_lexicon(lexicon: &BTreeMap<String, Vec<String>>) -> PipelineResult<Self> {
        let mut words = HashMap::new();
        for (key, entries) in lexicon {
            for word in entries {
                let word = word.to_lowercase();
                if let Some(previous) = words.insert(word.clone(), key.clone()) {
                    if previous != *key {
                        return Err(PipelineError::invalid_config(
                            "lexicon",
                            format!("word '{}' is listed under both '{}' and '{}'", word, previous, key),
                        ));
                    }
                }
            }
        }
        Ok(Self { words })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Classifier for LexiconClassifier {
    fn classify(&self, symbol: &Symbol) -> Option<String> {
        self.words.get(&symbol.as_str().to_lowercase()).cloned()
    }
}

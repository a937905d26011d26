//! Data model flowing through the pipeline

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// An opaque categorical input token
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An ordered, finite list of symbols owned by exactly one mapper
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence {
    symbols: Vec<Symbol>,
}

impl Sequence {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self { symbols }
    }

    pub fn from_words<S: AsRef<str>>(words: &[S]) -> Self {
        Self {
            symbols: words.iter().map(|w| Symbol::new(w.as_ref())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
}

impl IntoIterator for Sequence {
    type Item = Symbol;
    type IntoIter = std::vec::IntoIter<Symbol>;

    fn into_iter(self) -> Self::IntoIter {
        self.symbols.into_iter()
    }
}

impl FromIterator<Symbol> for Sequence {
    fn from_iter<I: IntoIterator<Item = Symbol>>(iter: I) -> Self {
        Self {
            symbols: iter.into_iter().collect(),
        }
    }
}

/// A mapper's local per-key count summary
///
/// Emitted once and moved through the stream, so nothing can mutate it after
/// the mapper hands it off.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Aggregate {
    /// Index of the mapper that produced this aggregate
    pub mapper: usize,
    pub counts: BTreeMap<String, u64>,
}

impl Aggregate {
    pub fn new(mapper: usize) -> Self {
        Self {
            mapper,
            counts: BTreeMap::new(),
        }
    }

    pub fn increment(&mut self, key: impl Into<String>) {
        *self.counts.entry(key.into()).or_insert(0) += 1;
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// A single count routed from the shuffler to the reducer owning `key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedValue {
    pub key: String,
    pub value: u64,
}

/// A reducer's final result for one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub key: String,
    /// `sum / count`; NaN when the partition received no values
    pub mean: f64,
    pub count: u64,
    pub sum: u64,
}

impl Summary {
    pub fn from_totals(key: impl Into<String>, sum: u64, count: u64) -> Self {
        Self {
            key: key.into(),
            mean: sum as f64 / count as f64,
            count,
            sum,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// The declared, closed set of partition keys
///
/// Order is significant: it fixes the order of partitions, reducers and the
/// summaries in a run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    keys: Vec<String>,
    index: HashMap<String, usize>,
}

impl KeySet {
    pub fn new<I, S>(keys: I) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Err(PipelineError::invalid_config(
                "keys",
                "at least one partition key is required",
            ));
        }

        let mut index = HashMap::with_capacity(keys.len());
        for (position, key) in keys.iter().enumerate() {
            if key.is_empty() {
                return Err(PipelineError::invalid_config(
                    "keys",
                    "partition keys must not be empty strings",
                ));
            }
            if index.insert(key.clone(), position).is_some() {
                return Err(PipelineError::invalid_config(
                    "keys",
                    format!("duplicate partition key '{}'", key),
                ));
            }
        }

        Ok(Self { keys, index })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

/// What the shuffler does with an aggregate entry outside the key set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownKeyPolicy {
    /// Discard the entry; it is counted in the run report
    #[default]
    Drop,
    /// Fail the whole run
    Reject,
}

/// What a reducer does when its partition closes without any values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyPartitionPolicy {
    /// Emit a summary whose mean is NaN
    #[default]
    Nan,
    /// Emit nothing, only close the output
    Skip,
    /// Fail the whole run
    Fail,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_set_preserves_order() {
        let keys = KeySet::new(["noun", "verb"]).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.position("noun"), Some(0));
        assert_eq!(keys.position("verb"), Some(1));
        assert!(!keys.contains("adjective"));
        assert_eq!(keys.iter().collect::<Vec<_>>(), vec!["noun", "verb"]);
    }

    #[test]
    fn test_key_set_rejects_empty_and_duplicates() {
        assert!(KeySet::new(Vec::<String>::new()).is_err());
        assert!(KeySet::new(["noun", "noun"]).is_err());
        assert!(KeySet::new(["noun", ""]).is_err());
    }

    #[test]
    fn test_summary_mean() {
        let summary = Summary::from_totals("noun", 8, 3);
        assert!((summary.mean - 8.0 / 3.0).abs() < 1e-9);
        assert!(!summary.is_empty());

        let empty = Summary::from_totals("verb", 0, 0);
        assert!(empty.mean.is_nan());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_aggregate_increment() {
        let mut aggregate = Aggregate::new(0);
        aggregate.increment("noun");
        aggregate.increment("noun");
        aggregate.increment("verb");
        assert_eq!(aggregate.get("noun"), 2);
        assert_eq!(aggregate.get("verb"), 1);
        assert_eq!(aggregate.get("adverb"), 0);
        assert_eq!(aggregate.total(), 3);
    }

    #[test]
    fn test_policies_deserialize_lowercase() {
        let policy: EmptyPartitionPolicy = serde_json::from_str("\"skip\"").unwrap();
        assert_eq!(policy, EmptyPartitionPolicy::Skip);
        let policy: UnknownKeyPolicy = serde_json::from_str("\"reject\"").unwrap();
        assert_eq!(policy, UnknownKeyPolicy::Reject);
    }
}

//! Pipeline configuration
//!
//! Loaded from a TOML file, then overridden from `TALLYFLOW_*` environment
//! variables, then validated. Every field has a default so an empty file (or
//! no file at all) yields the reference topology: keys `noun` and `verb`,
//! buffer capacity 1, no deadline.

use crate::classify::{Classifier, IdentityClassifier, LexiconClassifier};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::types::{EmptyPartitionPolicy, KeySet, UnknownKeyPolicy};
use humantime_serde::re::humantime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

pub const ENV_BUFFER_CAPACITY: &str = "TALLYFLOW_BUFFER_CAPACITY";
pub const ENV_DEADLINE: &str = "TALLYFLOW_DEADLINE";
pub const ENV_UNIT: &str = "TALLYFLOW_UNIT";

/// Topology and policy settings for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Ordered partition keys; one reducer per key
    #[serde(default = "default_keys")]
    pub keys: Vec<String>,

    /// Expected number of input sequences (mappers), enforced when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappers: Option<usize>,

    /// Capacity of every stream in the topology
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Label used when rendering summaries ("average noun per <unit>")
    #[serde(default = "default_unit")]
    pub unit: String,

    /// Abort the run if it has not finished within this duration
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Duration>,

    #[serde(default)]
    pub unknown_keys: UnknownKeyPolicy,

    #[serde(default)]
    pub empty_partitions: EmptyPartitionPolicy,

    /// Optional `key -> [words]` table for the lexicon classifier
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lexicon: BTreeMap<String, Vec<String>>,
}

fn default_keys() -> Vec<String> {
    vec!["noun".to_string(), "verb".to_string()]
}

fn default_buffer_capacity() -> usize {
    1
}

fn default_unit() -> String {
    "sentence".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            keys: default_keys(),
            mappers: None,
            buffer_capacity: default_buffer_capacity(),
            unit: default_unit(),
            deadline: None,
            unknown_keys: UnknownKeyPolicy::default(),
            empty_partitions: EmptyPartitionPolicy::default(),
            lexicon: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document without validating it
    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        Self::parse(content, Path::new("<inline>"))
    }

    fn parse(content: &str, origin: &Path) -> PipelineResult<Self> {
        toml::from_str(content).map_err(|source| PipelineError::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Read a TOML file, apply environment overrides and validate
    pub async fn load(path: &Path) -> PipelineResult<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| PipelineError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
        let mut config = Self::parse(&content, path)?;
        debug!(path = %path.display(), "loaded pipeline configuration");

        config.merge_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise start from the defaults
    pub async fn load_or_default(path: Option<&PathBuf>) -> PipelineResult<Self> {
        match path {
            Some(path) => Self::load(path).await,
            None => {
                let mut config = Self::default();
                config.merge_env_vars();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Apply `TALLYFLOW_*` overrides from the process environment
    pub fn merge_env_vars(&mut self) {
        self.merge_env_with(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Unparseable values are ignored with a warning.
    pub fn merge_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_BUFFER_CAPACITY) {
            match value.trim().parse::<usize>() {
                Ok(capacity) => self.buffer_capacity = capacity,
                Err(e) => warn!(var = ENV_BUFFER_CAPACITY, %value, error = %e, "ignoring override"),
            }
        }

        if let Some(value) = lookup(ENV_DEADLINE) {
            match humantime::parse_duration(value.trim()) {
                Ok(deadline) => self.deadline = Some(deadline),
                Err(e) => warn!(var = ENV_DEADLINE, %value, error = %e, "ignoring override"),
            }
        }

        if let Some(unit) = lookup(ENV_UNIT) {
            self.unit = unit;
        }
    }

    /// Check every constraint the pipeline relies on
    pub fn validate(&self) -> PipelineResult<()> {
        let keys = self.key_set()?;

        if self.buffer_capacity == 0 {
            return Err(PipelineError::invalid_config(
                "buffer_capacity",
                "must be at least 1",
            ));
        }

        if self.mappers == Some(0) {
            return Err(PipelineError::invalid_config("mappers", "must be at least 1"));
        }

        if self.deadline == Some(Duration::ZERO) {
            return Err(PipelineError::invalid_config("deadline", "must be non-zero"));
        }

        if let Some(key) = self.lexicon.keys().find(|key| !keys.contains(key)) {
            return Err(PipelineError::invalid_config(
                "lexicon",
                format!("'{}' is not one of the declared keys", key),
            ));
        }

        let mut owners: HashMap<String, &str> = HashMap::new();
        for (key, words) in &self.lexicon {
            for word in words {
                match owners.insert(word.to_lowercase(), key.as_str()) {
                    Some(previous) if previous != key.as_str() => {
                        return Err(PipelineError::invalid_config(
                            "lexicon",
                            format!("word '{}' is listed under both '{}' and '{}'", word, previous, key),
                        ));
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    pub fn key_set(&self) -> PipelineResult<KeySet> {
        KeySet::new(self.keys.iter().cloned())
    }

    /// The lexicon classifier when a lexicon is configured, identity otherwise
    pub fn classifier(&self) -> PipelineResult<Arc<dyn Classifier>> {
        if self.lexicon.is_empty() {
            Ok(Arc::new(IdentityClassifier))
        } else {
            Ok(Arc::new(LexiconClassifier::from_lexicon(&self.lexicon)?))
        }
    }
}

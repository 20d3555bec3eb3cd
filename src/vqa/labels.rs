//! The closed answer vocabulary of a classifier head

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// The subset of a Hugging Face `config.json` needed to name output positions
#[derive(Deserialize)]
struct ModelConfig {
    id2label: HashMap<String, String>,
}

/// Answer labels indexed by output position
#[derive(Debug, Clone, PartialEq)]
pub struct Labels(Vec<String>);

impl Labels {
    pub fn new(labels: Vec<String>) -> Self {
        Labels(labels)
    }

    /// Read `id2label` from a model `config.json`
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_config_json(&raw).with_context(|| format!("invalid {}", path.display()))
    }

    /// Parse `id2label` from the text of a model `config.json`. The ids must
    /// cover `0..n` without gaps.
    pub fn from_config_json(raw: &str) -> Result<Self> {
        let config: ModelConfig = serde_json::from_str(raw)?;
        let n = config.id2label.len();
        if n == 0 {
            return Err(anyhow!("id2label is empty"));
        }

        let mut labels = vec![None; n];
        for (id, label) in config.id2label {
            let idx: usize = id
                .parse()
                .with_context(|| format!("label id `{id}` is not an integer"))?;
            let slot = labels
                .get_mut(idx)
                .ok_or_else(|| anyhow!("label id {idx} is out of range for {n} labels"))?;
            if slot.replace(label).is_some() {
                return Err(anyhow!("label id {idx} appears more than once"));
            }
        }

        // n ids in 0..n with no repeats fill every slot
        Ok(Labels(labels.into_iter().flatten().collect()))
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.iter().any(|l| l == label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

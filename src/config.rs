//! Fit-time configuration, built explicitly and handed to `fit`

use crate::error::PreconditionError;
use crate::linkage::Linkage;
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default number of segments
pub const DEFAULT_K: usize = 6;

/// Default admission ceiling on the training population
pub const DEFAULT_MAX_TRAINING_SIZE: usize = 5000;

/// Population whose tenure range scales distances during `predict`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Training set plus the query record, recomputed per request
    #[default]
    Augmented,
    /// Training set only, fixed at fit time
    Frozen,
}

impl Normalization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Normalization::Augmented => "augmented",
            Normalization::Frozen => "frozen",
        }
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Normalization {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "augmented" => Ok(Normalization::Augmented),
            "frozen" => Ok(Normalization::Frozen),
            other => anyhow::bail!("Unknown normalization {:?}, expected 'augmented' or 'frozen'", other),
        }
    }
}

/// Everything `fit` needs besides the training rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Number of segments in the flat clustering
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub linkage: Linkage,
    /// Fixed "today" that tenure is measured against
    pub reference_date: NaiveDate,
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default = "default_max_training_size")]
    pub max_training_size: usize,
}

fn default_k() -> usize {
    DEFAULT_K
}

fn default_max_training_size() -> usize {
    DEFAULT_MAX_TRAINING_SIZE
}

impl SegmenterConfig {
    pub fn new(reference_date: NaiveDate) -> Self {
        Self {
            k: DEFAULT_K,
            linkage: Linkage::default(),
            reference_date,
            normalization: Normalization::default(),
            max_training_size: DEFAULT_MAX_TRAINING_SIZE,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_linkage(mut self, linkage: Linkage) -> Self {
        self.linkage = linkage;
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn with_max_training_size(mut self, max_training_size: usize) -> Self {
        self.max_training_size = max_training_size;
        self
    }

    /// Read a JSON config file that names its own reference date
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        ConfigFile::read(path)?.resolve(None)
    }

    /// Check that a population of `n` records can be fitted with this config
    pub fn validate(&self, n: usize) -> Result<(), PreconditionError> {
        if n == 0 {
            return Err(PreconditionError::EmptyTrainingSet);
        }
        if n > self.max_training_size {
            return Err(PreconditionError::TrainingSetTooLarge {
                n,
                limit: self.max_training_size,
            });
        }
        if self.k < 1 || self.k > n {
            return Err(PreconditionError::InvalidClusterCount { k: self.k, n });
        }
        Ok(())
    }
}

/// Config file contents before command-line flags are merged in
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConfigFile {
    pub k: Option<usize>,
    pub linkage: Option<Linkage>,
    pub reference_date: Option<NaiveDate>,
    pub normalization: Option<Normalization>,
    pub max_training_size: Option<usize>,
}

impl ConfigFile {
    pub fn read(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Fill unset fields with defaults; `reference_date` overrides the file's date
    pub fn resolve(self, reference_date: Option<NaiveDate>) -> anyhow::Result<SegmenterConfig> {
        let reference_date = reference_date
            .or(self.reference_date)
            .context("A reference date is required: pass --reference-date or set reference_date in the config file")?;
        let mut config = SegmenterConfig::new(reference_date);
        if let Some(k) = self.k {
            config.k = k;
        }
        if let Some(linkage) = self.linkage {
            config.linkage = linkage;
        }
        if let Some(normalization) = self.normalization {
            config.normalization = normalization;
        }
        if let Some(max_training_size) = self.max_training_size {
            config.max_training_size = max_training_size;
        }
        Ok(config)
    }
}

//! Command-line interface definitions and argument parsing

use crate::config::{ConfigFile, Normalization, SegmenterConfig};
use crate::error::SegmentError;
use crate::linkage::Linkage;
use crate::record::{parse_date, RawRecord};
use clap::{Parser, Subcommand};
use std::ops::RangeInclusive;

/// Customer segmentation CLI using Gower distance and hierarchical clustering
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fit a segmentation snapshot from a customer CSV and save it
    Fit(FitArgs),
    /// Assign one customer to a segment using a saved snapshot
    Predict(PredictArgs),
    /// Score a range of segment counts with the silhouette coefficient
    Evaluate(EvaluateArgs),
    /// Print segment statistics of a saved snapshot
    Inspect(InspectArgs),
}

/// Options shared by commands that build a tree from training data
#[derive(clap::Args, Debug, Clone)]
pub struct TrainingArgs {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "data.csv")]
    pub input: String,

    /// Reference date that tenure is measured against (YYYY-MM-DD)
    #[arg(short, long)]
    pub reference_date: Option<String>,

    /// Linkage method: average, single or complete
    #[arg(short, long)]
    pub linkage: Option<String>,

    /// JSON config file; command-line flags take precedence
    #[arg(long)]
    pub config: Option<String>,
}

impl TrainingArgs {
    /// Build the fit configuration from the config file and flags
    pub fn base_config(&self) -> anyhow::Result<SegmenterConfig> {
        let reference_date = self
            .reference_date
            .as_deref()
            .map(|date| parse_date("reference_date", date).map_err(SegmentError::from))
            .transpose()?;
        let file = match self.config {
            Some(ref path) => ConfigFile::read(path)?,
            None => ConfigFile::default(),
        };
        let mut config = file.resolve(reference_date)?;
        if let Some(ref linkage) = self.linkage {
            config.linkage = linkage.parse::<Linkage>().map_err(SegmentError::from)?;
        }
        Ok(config)
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub training: TrainingArgs,

    /// Number of segments
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,

    /// Tenure scaling at prediction time: augmented or frozen
    #[arg(short, long)]
    pub normalization: Option<String>,

    /// Output path for the snapshot
    #[arg(short, long, default_value = "cluster_pipeline.json")]
    pub output: String,

    /// Optional output path for the segment size chart
    #[arg(short, long)]
    pub plot: Option<String>,
}

impl FitArgs {
    pub fn config(&self) -> anyhow::Result<SegmenterConfig> {
        let mut config = self.training.base_config()?;
        if let Some(k) = self.clusters {
            config.k = k;
        }
        if let Some(ref normalization) = self.normalization {
            config.normalization = normalization.parse::<Normalization>()?;
        }
        Ok(config)
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct PredictArgs {
    /// Path to a saved snapshot
    #[arg(short, long, default_value = "cluster_pipeline.json")]
    pub model: String,

    /// Customer as a JSON object, e.g. '{"tier":"Gold","gender":"Female","location":"Singapore","join_date":"2023-06-12"}'
    #[arg(long, conflicts_with_all = ["tier", "gender", "location", "join_date"])]
    pub record: Option<String>,

    #[arg(long)]
    pub tier: Option<String>,

    #[arg(long)]
    pub gender: Option<String>,

    #[arg(long)]
    pub location: Option<String>,

    #[arg(long)]
    pub join_date: Option<String>,
}

impl PredictArgs {
    /// Customer record from `--record` or the individual field flags.
    /// Missing fields are left for validation to report.
    pub fn raw_record(&self) -> anyhow::Result<RawRecord> {
        match self.record {
            Some(ref json) => serde_json::from_str(json)
                .map_err(|e| anyhow::anyhow!("Invalid --record JSON: {}", e)),
            None => Ok(RawRecord {
                tier: self.tier.clone(),
                gender: self.gender.clone(),
                location: self.location.clone(),
                join_date: self.join_date.clone(),
            }),
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub training: TrainingArgs,

    /// Smallest segment count to score
    #[arg(long, default_value = "2")]
    pub k_min: usize,

    /// Largest segment count to score
    #[arg(long, default_value = "10")]
    pub k_max: usize,
}

impl EvaluateArgs {
    pub fn k_range(&self) -> anyhow::Result<RangeInclusive<usize>> {
        if self.k_min == 0 || self.k_min > self.k_max {
            anyhow::bail!("k range must satisfy 1 <= k-min <= k-max");
        }
        Ok(self.k_min..=self.k_max)
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct InspectArgs {
    /// Path to a saved snapshot
    #[arg(short, long, default_value = "cluster_pipeline.json")]
    pub model: String,

    /// Optional output path for the segment size chart
    #[arg(short, long)]
    pub plot: Option<String>,
}

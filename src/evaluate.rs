//! Clustering quality on a precomputed Gower matrix

use crate::config::SegmenterConfig;
use crate::cut::cut;
use crate::distance::{gower_matrix, DistanceMatrix};
use crate::error::{PreconditionError, Result};
use crate::linkage::build;
use crate::model::TrainingSet;
use crate::record::RawRecord;
use serde::Serialize;
use std::ops::RangeInclusive;

/// Quality of one candidate segment count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KScore {
    pub k: usize,
    pub silhouette: f64,
    pub cluster_sizes: Vec<usize>,
}

/// Mean silhouette coefficient for labels `1..=k` over a precomputed matrix.
///
/// Members of singleton groups score 0, and so does a single-group labelling.
pub fn silhouette(matrix: &DistanceMatrix, labels: &[usize]) -> f64 {
    let n = labels.len().min(matrix.len());
    let k = labels.iter().copied().max().unwrap_or(0);
    if n < 2 || k < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..n {
        let mut sums = vec![0.0; k + 1];
        let mut counts = vec![0usize; k + 1];
        for j in 0..n {
            if i != j {
                sums[labels[j]] += matrix.get(i, j);
                counts[labels[j]] += 1;
            }
        }

        let own = labels[i];
        if counts[own] == 0 {
            continue;
        }
        let a_i = sums[own] / counts[own] as f64;
        let b_i = (1..=k)
            .filter(|&label| label != own && counts[label] > 0)
            .map(|label| sums[label] / counts[label] as f64)
            .fold(f64::INFINITY, f64::min);

        if b_i.is_finite() && a_i.max(b_i) > 0.0 {
            total += (b_i - a_i) / a_i.max(b_i);
        }
    }
    total / n as f64
}

/// Fit one tree and score every `k` in `ks` by cutting it repeatedly
pub fn evaluate_k_range(
    rows: &[RawRecord],
    config: &SegmenterConfig,
    ks: RangeInclusive<usize>,
) -> Result<Vec<KScore>> {
    let training = TrainingSet::from_raw(rows)?;
    let n = training.len();
    let (k_min, k_max) = (*ks.start(), *ks.end());
    config.clone().with_k(k_max).validate(n)?;
    if k_min < 1 || k_min > k_max {
        return Err(PreconditionError::InvalidClusterCount { k: k_min, n }.into());
    }

    let population = training.observations(config.reference_date);
    let matrix = gower_matrix(&population)?;
    let tree = build(&matrix.condensed(), n, config.linkage)?;

    ks.map(|k| -> Result<KScore> {
        let flat = cut(&tree, k)?;
        let score = KScore {
            k,
            silhouette: silhouette(&matrix, flat.labels()),
            cluster_sizes: flat.sizes(),
        };
        log::info!("k={} silhouette={:.4} sizes={:?}", k, score.silhouette, score.cluster_sizes);
        Ok(score)
    })
    .collect()
}

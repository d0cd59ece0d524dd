//! Gower dissimilarity over mixed categorical and numeric attributes

use crate::error::{ComputationError, Result, SegmentError};
use crate::record::Observation;
use ndarray::{Array2, ArrayView1};

/// Number of attributes averaged into one distance
const ATTRIBUTES: f64 = 4.0;

/// Tenure range used to scale the numeric contribution.
///
/// The range belongs to a population: the same pair of records scores
/// differently inside populations with different tenure spreads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GowerScale {
    min: i64,
    max: i64,
}

impl GowerScale {
    /// Scale over every observation in `population`
    pub fn fit(population: &[Observation<'_>]) -> Self {
        let mut tenures = population.iter().map(|o| o.tenure_days);
        match tenures.next() {
            Some(first) => tenures.fold(Self { min: first, max: first }, |scale, t| Self {
                min: scale.min.min(t),
                max: scale.max.max(t),
            }),
            None => Self { min: 0, max: 0 },
        }
    }

    /// Scale of this population with one more observation added
    pub fn including(self, observation: &Observation<'_>) -> Self {
        Self {
            min: self.min.min(observation.tenure_days),
            max: self.max.max(observation.tenure_days),
        }
    }

    pub fn range(&self) -> u64 {
        self.max.abs_diff(self.min)
    }

    /// Mean of the three simple-matching contributions and the range-scaled
    /// tenure difference. A zero range contributes nothing.
    ///
    /// Within `[0, 1]` whenever both tenures lie inside the scale; a query
    /// outside a frozen scale can score above 1.
    pub fn distance(&self, a: &Observation<'_>, b: &Observation<'_>) -> f64 {
        let categorical = [
            (a.tier, b.tier),
            (a.gender, b.gender),
            (a.location, b.location),
        ]
        .iter()
        .filter(|(x, y)| x != y)
        .count() as f64;

        let numeric = match self.range() {
            0 => 0.0,
            range => a.tenure_days.abs_diff(b.tenure_days) as f64 / range as f64,
        };

        (categorical + numeric) / ATTRIBUTES
    }
}

/// Dense symmetric dissimilarity matrix with a zero diagonal
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    data: Array2<f64>,
}

impl DistanceMatrix {
    /// Rebuild the dense form from an upper-triangular condensed vector
    pub fn from_condensed(condensed: &[f64], n: usize) -> Option<Self> {
        if condensed.len() != n * n.saturating_sub(1) / 2 {
            return None;
        }
        let mut data = Array2::zeros((n, n));
        for i in 0..n {
            for j in (i + 1)..n {
                let d = condensed[condensed_index(n, i, j)];
                data[[i, j]] = d;
                data[[j, i]] = d;
            }
        }
        Some(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[[i, j]]
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.data.row(i)
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.data
    }

    /// Upper triangle, row-major, diagonal excluded
    pub fn condensed(&self) -> Vec<f64> {
        let n = self.len();
        let mut condensed = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            condensed.extend(self.data.row(i).iter().skip(i + 1));
        }
        condensed
    }
}

/// Position of pair `(i, j)`, `i < j`, inside a condensed vector over `n` points
pub fn condensed_index(n: usize, i: usize, j: usize) -> usize {
    debug_assert!(i < j && j < n);
    n * i - i * (i + 1) / 2 + (j - i - 1)
}

/// Pairwise Gower distances over `population`, scaled by its own tenure range
pub fn gower_matrix(population: &[Observation<'_>]) -> Result<DistanceMatrix> {
    let m = population.len();
    let scale = GowerScale::fit(population);
    log::debug!("gower matrix over {} records, tenure range {}", m, scale.range());

    let mut data = Array2::zeros((m, m));
    for i in 0..m {
        for j in (i + 1)..m {
            let d = scale.distance(&population[i], &population[j]);
            if !d.is_finite() {
                return Err(ComputationError::NonFiniteDistance { i, j }.into());
            }
            data[[i, j]] = d;
            data[[j, i]] = d;
        }
    }
    Ok(DistanceMatrix { data })
}

/// Distances from one query to every member of `population` under `scale`.
///
/// Equal to the query's row of the full matrix over `population ∪ {query}`
/// when `scale` covers that augmented population, at O(m) cost.
pub fn gower_row(
    query: &Observation<'_>,
    population: &[Observation<'_>],
    scale: &GowerScale,
) -> Result<Vec<f64>> {
    let query_index = population.len();
    population
        .iter()
        .enumerate()
        .map(|(j, member)| {
            let d = scale.distance(query, member);
            if d.is_finite() {
                Ok(d)
            } else {
                Err(SegmentError::from(ComputationError::NonFiniteDistance {
                    i: query_index,
                    j,
                }))
            }
        })
        .collect()
}

//! Agglomerative merge tree over a precomputed distance matrix

use crate::distance::DistanceMatrix;
use crate::error::{ComputationError, PreconditionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Float slack allowed when checking that merge heights never decrease
pub const MONOTONIC_TOLERANCE: f64 = 1e-12;

/// Rule for the distance between two clusters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Closest cross-cluster pair
    Single,
    /// Farthest cross-cluster pair
    Complete,
    /// Mean over all cross-cluster pairs
    #[default]
    Average,
}

impl Linkage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Linkage::Single => "single",
            Linkage::Complete => "complete",
            Linkage::Average => "average",
        }
    }

    /// Combine the original distances between two member lists
    fn between(&self, matrix: &DistanceMatrix, a: &[usize], b: &[usize]) -> f64 {
        let pairs = a.iter().flat_map(|&i| b.iter().map(move |&j| matrix.get(i, j)));
        match self {
            Linkage::Single => pairs.fold(f64::INFINITY, f64::min),
            Linkage::Complete => pairs.fold(f64::NEG_INFINITY, f64::max),
            Linkage::Average => pairs.sum::<f64>() / (a.len() * b.len()) as f64,
        }
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Linkage {
    type Err = PreconditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Linkage::Single),
            "complete" => Ok(Linkage::Complete),
            "average" => Ok(Linkage::Average),
            _ => Err(PreconditionError::UnsupportedLinkage {
                method: s.to_string(),
            }),
        }
    }
}

/// One fusion of two clusters.
///
/// Identifiers below the leaf count are leaves; merge `i` creates cluster
/// `leaves + i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    pub size: usize,
}

/// Dendrogram stored as an index-addressed table of merges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeTree {
    leaves: usize,
    merges: Vec<Merge>,
}

impl MergeTree {
    pub fn leaves(&self) -> usize {
        self.leaves
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Merge distances in merge order
    pub fn heights(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.distance).collect()
    }

    /// Structural check used when a tree comes from outside this process
    pub fn validate(&self) -> Result<(), String> {
        if self.leaves == 0 {
            return Err("tree has no leaves".to_string());
        }
        if self.merges.len() != self.leaves - 1 {
            return Err(format!(
                "tree over {} leaves has {} merges, expected {}",
                self.leaves,
                self.merges.len(),
                self.leaves - 1
            ));
        }

        let mut sizes = vec![1usize; self.leaves];
        let mut consumed = vec![false; 2 * self.leaves - 1];
        let mut previous = 0.0;

        for (index, merge) in self.merges.iter().enumerate() {
            let created = self.leaves + index;
            if merge.left >= merge.right || merge.right >= created {
                return Err(format!(
                    "merge {} joins ({}, {}) before they exist",
                    index, merge.left, merge.right
                ));
            }
            for child in [merge.left, merge.right] {
                if consumed[child] {
                    return Err(format!("cluster {} is merged twice", child));
                }
                consumed[child] = true;
            }
            if sizes[merge.left] + sizes[merge.right] != merge.size {
                return Err(format!("merge {} has inconsistent size {}", index, merge.size));
            }
            if !merge.distance.is_finite() || merge.distance < 0.0 {
                return Err(format!("merge {} has invalid height {}", index, merge.distance));
            }
            if merge.distance + MONOTONIC_TOLERANCE < previous {
                return Err(format!("merge {} lowers the dendrogram", index));
            }
            previous = merge.distance;
            sizes.push(merge.size);
        }
        Ok(())
    }

    fn check_monotonic(&self) -> Result<()> {
        for (index, pair) in self.merges.windows(2).enumerate() {
            let (previous, current) = (pair[0].distance, pair[1].distance);
            if current + MONOTONIC_TOLERANCE < previous {
                return Err(ComputationError::NonMonotonicMerge {
                    index: index + 1,
                    previous,
                    current,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// A live cluster during construction
struct Cluster {
    id: usize,
    members: Vec<usize>,
}

/// Build the merge tree for `n` points from their condensed distance vector.
///
/// Each new cluster's distance to every other cluster is recomputed from the
/// original pairwise distances. Equal-height candidates resolve to the
/// smallest `(lower id, higher id)` pair.
pub fn build(condensed: &[f64], n: usize, linkage: Linkage) -> Result<MergeTree> {
    if n == 0 {
        return Err(PreconditionError::EmptyTrainingSet.into());
    }
    let expected = n * (n - 1) / 2;
    let matrix = DistanceMatrix::from_condensed(condensed, n).ok_or(
        ComputationError::ShapeMismatch {
            expected,
            found: condensed.len(),
        },
    )?;
    if let Some(position) = condensed.iter().position(|d| !d.is_finite()) {
        let (i, j) = condensed_pair(n, position);
        return Err(ComputationError::NonFiniteDistance { i, j }.into());
    }

    let mut slots: Vec<Option<Cluster>> = (0..n)
        .map(|i| Some(Cluster { id: i, members: vec![i] }))
        .collect();
    let mut between = matrix.as_array().clone();
    let mut merges = Vec::with_capacity(n - 1);

    for step in 0..n.saturating_sub(1) {
        let mut best: Option<(f64, usize, usize, usize, usize)> = None;
        for a in 0..n {
            let Some(ca) = &slots[a] else { continue };
            for b in (a + 1)..n {
                let Some(cb) = &slots[b] else { continue };
                let d = between[[a, b]];
                let ids = (ca.id.min(cb.id), ca.id.max(cb.id));
                let better = match best {
                    None => true,
                    Some((bd, lo, hi, _, _)) => d < bd || (d == bd && ids < (lo, hi)),
                };
                if better {
                    best = Some((d, ids.0, ids.1, a, b));
                }
            }
        }
        let Some((distance, left, right, a, b)) = best else {
            break;
        };

        let absorbed = slots[b].take().map(|c| c.members).unwrap_or_default();
        let Some(kept) = slots[a].as_mut() else {
            break;
        };
        kept.id = n + step;
        kept.members.extend(absorbed);
        let size = kept.members.len();
        merges.push(Merge {
            left,
            right,
            distance,
            size,
        });
        log::debug!("merge {step}: ({left}, {right}) at {distance:.6}, size {size}");

        if let Some(kept) = &slots[a] {
            for (c, other) in slots.iter().enumerate() {
                if let Some(other) = other {
                    if c != a {
                        let d = linkage.between(&matrix, &kept.members, &other.members);
                        between[[a, c]] = d;
                        between[[c, a]] = d;
                    }
                }
            }
        }
    }

    let tree = MergeTree { leaves: n, merges };
    tree.check_monotonic()?;
    Ok(tree)
}

/// Inverse of the condensed index, for error reporting
fn condensed_pair(n: usize, position: usize) -> (usize, usize) {
    let mut remaining = position;
    for i in 0..n {
        let row = n - i - 1;
        if remaining < row {
            return (i, i + 1 + remaining);
        }
        remaining -= row;
    }
    (0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::gower_matrix;
    use crate::record::Observation;

    fn obs(tier: &'static str, tenure_days: i64) -> Observation<'static> {
        Observation {
            tier,
            gender: "Female",
            location: "Singapore",
            tenure_days,
        }
    }

    #[test]
    fn test_scenario_tree() {
        let pop = [obs("Gold", 10), obs("Gold", 12), obs("Silver", 400), obs("Silver", 420)];
        let matrix = gower_matrix(&pop).unwrap();
        let tree = build(&matrix.condensed(), 4, Linkage::Average).unwrap();

        let pairs: Vec<(usize, usize)> = tree.merges().iter().map(|m| (m.left, m.right)).collect();
        assert_eq!(pairs, vec![(0, 1), (2, 3), (4, 5)]);
        assert_eq!(tree.merges()[2].size, 4);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_average_uses_all_cross_pairs() {
        let condensed = [0.1, 0.5, 0.4];
        let tree = build(&condensed, 3, Linkage::Average).unwrap();
        assert_eq!((tree.merges()[0].left, tree.merges()[0].right), (0, 1));
        assert!((tree.merges()[1].distance - 0.45).abs() < 1e-12);

        let single = build(&condensed, 3, Linkage::Single).unwrap();
        assert!((single.merges()[1].distance - 0.4).abs() < 1e-12);

        let complete = build(&condensed, 3, Linkage::Complete).unwrap();
        assert!((complete.merges()[1].distance - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_ties_prefer_lowest_identifiers() {
        let condensed = vec![0.0; 6];
        let tree = build(&condensed, 4, Linkage::Average).unwrap();
        let pairs: Vec<(usize, usize)> = tree.merges().iter().map(|m| (m.left, m.right)).collect();
        assert_eq!(pairs, vec![(0, 1), (2, 3), (4, 5)]);
    }

    #[test]
    fn test_heights_non_decreasing() {
        let tiers = ["Gold", "Silver", "Platinum"];
        let pop: Vec<Observation<'static>> = (0..24)
            .map(|i| obs(tiers[i % 3], ((i * 37) % 101) as i64))
            .collect();
        let matrix = gower_matrix(&pop).unwrap();
        let tree = build(&matrix.condensed(), pop.len(), Linkage::Average).unwrap();

        assert_eq!(tree.merges().len(), pop.len() - 1);
        for pair in tree.heights().windows(2) {
            assert!(pair[1] + MONOTONIC_TOLERANCE >= pair[0]);
        }
        assert_eq!(tree.merges().last().unwrap().size, pop.len());
    }

    #[test]
    fn test_single_leaf_tree() {
        let tree = build(&[], 1, Linkage::Average).unwrap();
        assert_eq!(tree.leaves(), 1);
        assert!(tree.merges().is_empty());
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(build(&[], 0, Linkage::Average).is_err());
        assert!(matches!(
            build(&[0.1, 0.2], 3, Linkage::Average),
            Err(crate::SegmentError::Computation(ComputationError::ShapeMismatch { .. }))
        ));
        assert!(matches!(
            build(&[0.1, f64::NAN, 0.2], 3, Linkage::Average),
            Err(crate::SegmentError::Computation(ComputationError::NonFiniteDistance { i: 0, j: 2 }))
        ));
    }

    #[test]
    fn test_parse_linkage() {
        assert_eq!("Average".parse::<Linkage>().unwrap(), Linkage::Average);
        assert_eq!(" single ".parse::<Linkage>().unwrap(), Linkage::Single);
        assert!(matches!(
            "ward".parse::<Linkage>(),
            Err(PreconditionError::UnsupportedLinkage { .. })
        ));
    }

    #[test]
    fn test_validate_detects_corruption() {
        let condensed = vec![0.0; 6];
        let tree = build(&condensed, 4, Linkage::Average).unwrap();

        let mut reused = tree.clone();
        reused.merges[1].left = 0;
        reused.merges[1].right = 1;
        assert!(reused.validate().is_err());

        let mut truncated = tree.clone();
        truncated.merges.pop();
        assert!(truncated.validate().is_err());

        let mut descending = tree;
        descending.merges[0].distance = 0.5;
        assert!(descending.validate().is_err());
    }
}

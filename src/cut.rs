//! Flat k-way partitions extracted from a merge tree

use crate::error::{PreconditionError, Result};
use crate::linkage::MergeTree;
use serde::Serialize;

/// Partition of the tree's leaves into `k` labelled groups.
///
/// Labels run `1..=k` and are numbered in order of each group's first leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatClustering {
    labels: Vec<usize>,
    k: usize,
}

impl FlatClustering {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label of every leaf, by leaf index
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> Option<usize> {
        self.labels.get(index).copied()
    }

    /// Group sizes; position 0 holds label 1
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &label in &self.labels {
            sizes[label - 1] += 1;
        }
        sizes
    }

    pub fn members(&self, label: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| l == label)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Union-find over leaf indices
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Cut `tree` into exactly `k` groups by undoing its `k - 1` highest merges.
///
/// Among merges of equal height the later one is undone first. `k` outside
/// `1..=n` is rejected, never clamped.
pub fn cut(tree: &MergeTree, k: usize) -> Result<FlatClustering> {
    let n = tree.leaves();
    if k < 1 || k > n {
        return Err(PreconditionError::InvalidClusterCount { k, n }.into());
    }

    let merges = tree.merges();
    let mut order: Vec<usize> = (0..merges.len()).collect();
    order.sort_by(|&a, &b| {
        merges[b]
            .distance
            .total_cmp(&merges[a].distance)
            .then(b.cmp(&a))
    });
    let mut undone = vec![false; merges.len()];
    for &index in order.iter().take(k - 1) {
        undone[index] = true;
    }

    // any leaf stands in for the cluster that contains it
    let mut representative: Vec<usize> = (0..n).collect();
    let mut groups = DisjointSet::new(n);
    for (index, merge) in merges.iter().enumerate() {
        let (left, right) = (representative[merge.left], representative[merge.right]);
        representative.push(left);
        if !undone[index] {
            groups.union(left, right);
        }
    }

    let mut label_of_root = vec![0usize; n];
    let mut next = 0;
    let labels = (0..n)
        .map(|leaf| {
            let root = groups.find(leaf);
            if label_of_root[root] == 0 {
                next += 1;
                label_of_root[root] = next;
            }
            label_of_root[root]
        })
        .collect();

    log::debug!("cut {} leaves into {} groups", n, k);
    Ok(FlatClustering { labels, k })
}

//! Fitted segmentation pipeline: training, flat labels and nearest-neighbour assignment

use crate::config::{Normalization, SegmenterConfig};
use crate::cut::{cut, FlatClustering};
use crate::distance::{gower_matrix, gower_row, GowerScale};
use crate::error::{PersistenceError, PreconditionError, Result, ValidationError};
use crate::linkage::{build, Linkage, MergeTree};
use crate::record::{FeatureRecord, Observation, RawRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Instant;

/// Ordered customers fixed at fit time; positions are the leaf indices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSet {
    records: Vec<FeatureRecord>,
}

impl TrainingSet {
    pub fn new(records: Vec<FeatureRecord>) -> Self {
        Self { records }
    }

    /// Validate every row, reporting the first failure with its row index
    pub fn from_raw(rows: &[RawRecord]) -> Result<Self, ValidationError> {
        rows.iter()
            .enumerate()
            .map(|(row, raw)| {
                raw.validate().map_err(|source| ValidationError::InvalidRecord {
                    row,
                    source: Box::new(source),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&FeatureRecord> {
        self.records.get(index)
    }

    pub fn observations(&self, reference_date: NaiveDate) -> Vec<Observation<'_>> {
        self.records
            .iter()
            .map(|record| record.observe(reference_date))
            .collect()
    }
}

/// Outcome of assigning one record
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Assignment {
    /// Segment label in `1..=k`
    pub label: usize,
    /// Training index of the nearest neighbour
    pub nearest: usize,
    /// Gower distance to that neighbour
    pub distance: f64,
}

/// Descriptive statistics of one segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentProfile {
    pub label: usize,
    pub size: usize,
    pub mean_tenure_days: f64,
    pub dominant_tier: String,
    pub dominant_gender: String,
    pub dominant_location: String,
}

/// Overview of a fitted snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub n: usize,
    pub k: usize,
    pub linkage: Linkage,
    pub normalization: Normalization,
    pub reference_date: NaiveDate,
    pub cluster_sizes: Vec<usize>,
    pub segments: Vec<SegmentProfile>,
}

/// The fitted state: training records, reference date, merge tree and `k`.
///
/// Read-only once built, so any number of threads may call [`predict`]
/// on a shared reference. The flat clustering is derived from the tree on
/// first use and cached.
///
/// [`predict`]: PipelineSnapshot::predict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    training: TrainingSet,
    reference_date: NaiveDate,
    linkage: Linkage,
    tree: MergeTree,
    k: usize,
    #[serde(default)]
    normalization: Normalization,
    #[serde(skip)]
    clustering: OnceLock<FlatClustering>,
}

impl PipelineSnapshot {
    pub fn training(&self) -> &TrainingSet {
        &self.training
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    pub fn tree(&self) -> &MergeTree {
        &self.tree
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    /// Flat clustering of the training set, cut once from the stored tree
    pub fn labels(&self) -> Result<&FlatClustering> {
        if let Some(clustering) = self.clustering.get() {
            return Ok(clustering);
        }
        let clustering = cut(&self.tree, self.k)?;
        Ok(self.clustering.get_or_init(|| clustering))
    }

    /// Segment label for an unvalidated record
    pub fn predict(&self, raw: &RawRecord) -> Result<usize> {
        self.assign(raw).map(|assignment| assignment.label)
    }

    pub fn predict_record(&self, record: &FeatureRecord) -> Result<usize> {
        self.assign_record(record).map(|assignment| assignment.label)
    }

    pub fn assign(&self, raw: &RawRecord) -> Result<Assignment> {
        let record = raw.validate()?;
        self.assign_record(&record)
    }

    /// Label of the nearest training record.
    ///
    /// Tenure is measured against the stored reference date. Under
    /// [`Normalization::Augmented`] the tenure range spans the training set
    /// plus this record; under [`Normalization::Frozen`] it spans the
    /// training set alone. Equal distances resolve to the lowest index.
    pub fn assign_record(&self, record: &FeatureRecord) -> Result<Assignment> {
        if self.training.is_empty() {
            return Err(PreconditionError::EmptyTrainingSet.into());
        }

        let population = self.training.observations(self.reference_date);
        let query = record.observe(self.reference_date);
        let scale = match self.normalization {
            Normalization::Augmented => GowerScale::fit(&population).including(&query),
            Normalization::Frozen => GowerScale::fit(&population),
        };
        let row = gower_row(&query, &population, &scale)?;

        let (nearest, distance) = row.iter().copied().enumerate().fold(
            (0, f64::INFINITY),
            |(best, best_distance), (index, d)| {
                if d < best_distance {
                    (index, d)
                } else {
                    (best, best_distance)
                }
            },
        );

        let label = self.labels()?.label(nearest).ok_or_else(|| PersistenceError::Inconsistent {
            reason: format!("no label for training index {nearest}"),
        })?;

        log::debug!(
            "assigned tenure {} to segment {} via training index {} at {:.6}",
            query.tenure_days,
            label,
            nearest,
            distance
        );
        Ok(Assignment {
            label,
            nearest,
            distance,
        })
    }

    /// Per-segment sizes and attribute profiles
    pub fn summary(&self) -> Result<SnapshotSummary> {
        let clustering = self.labels()?;
        let segments = (1..=self.k)
            .map(|label| self.profile(clustering, label))
            .collect();

        Ok(SnapshotSummary {
            n: self.training.len(),
            k: self.k,
            linkage: self.linkage,
            normalization: self.normalization,
            reference_date: self.reference_date,
            cluster_sizes: clustering.sizes(),
            segments,
        })
    }

    fn profile(&self, clustering: &FlatClustering, label: usize) -> SegmentProfile {
        let members: Vec<&FeatureRecord> = clustering
            .members(label)
            .into_iter()
            .filter_map(|index| self.training.get(index))
            .collect();
        let size = members.len();
        let mean_tenure_days = if size == 0 {
            0.0
        } else {
            members
                .iter()
                .map(|record| record.tenure_days(self.reference_date) as f64)
                .sum::<f64>()
                / size as f64
        };

        SegmentProfile {
            label,
            size,
            mean_tenure_days,
            dominant_tier: mode(members.iter().map(|r| r.tier())),
            dominant_gender: mode(members.iter().map(|r| r.gender())),
            dominant_location: mode(members.iter().map(|r| r.location())),
        }
    }

    /// Invariants a restored snapshot must satisfy
    pub(crate) fn check(&self) -> Result<(), String> {
        let n = self.training.len();
        if n == 0 {
            return Err("training set is empty".to_string());
        }
        self.tree.validate()?;
        if self.tree.leaves() != n {
            return Err(format!(
                "tree has {} leaves but training set has {} records",
                self.tree.leaves(),
                n
            ));
        }
        if self.k < 1 || self.k > n {
            return Err(format!("k={} is outside [1, {}]", self.k, n));
        }
        Ok(())
    }
}

/// Most frequent value; ties go to the value seen first
fn mode<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();
    for value in values {
        match position.get(value) {
            Some(&i) => counts[i].1 += 1,
            None => {
                position.insert(value, counts.len());
                counts.push((value, 1));
            }
        }
    }
    counts
        .iter()
        .fold(None, |best: Option<(&str, usize)>, &(value, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((value, count)),
        })
        .map(|(value, _)| value.to_string())
        .unwrap_or_default()
}

/// Fit a snapshot from unvalidated rows.
///
/// Every row is validated and the config's preconditions checked before
/// any distance is computed.
pub fn fit(rows: &[RawRecord], config: &SegmenterConfig) -> Result<PipelineSnapshot> {
    let training = TrainingSet::from_raw(rows)?;
    fit_training(training, config)
}

/// Fit with the default normalization and admission limit
pub fn fit_with(
    rows: &[RawRecord],
    reference_date: NaiveDate,
    k: usize,
    linkage: Linkage,
) -> Result<PipelineSnapshot> {
    let config = SegmenterConfig::new(reference_date)
        .with_k(k)
        .with_linkage(linkage);
    fit(rows, &config)
}

/// Fit a snapshot from already validated records
pub fn fit_training(training: TrainingSet, config: &SegmenterConfig) -> Result<PipelineSnapshot> {
    config.validate(training.len())?;
    let start = Instant::now();
    let n = training.len();

    let tree = {
        let population = training.observations(config.reference_date);
        let future = population.iter().filter(|o| o.tenure_days < 0).count();
        if future > 0 {
            log::warn!(
                "{} of {} records joined after the reference date {}",
                future,
                n,
                config.reference_date
            );
        }
        let matrix = gower_matrix(&population)?;
        build(&matrix.condensed(), n, config.linkage)?
    };

    let snapshot = PipelineSnapshot {
        training,
        reference_date: config.reference_date,
        linkage: config.linkage,
        tree,
        k: config.k,
        normalization: config.normalization,
        clustering: OnceLock::new(),
    };
    let sizes = snapshot.labels()?.sizes();

    log::info!(
        "fitted {} linkage over {} records into {} segments in {:.2}s",
        config.linkage,
        n,
        config.k,
        start.elapsed().as_secs_f64()
    );
    log::info!("segment sizes: {:?}", sizes);
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SegmentError;
    use chrono::Duration;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 11).unwrap()
    }

    fn row(tier: &str, tenure_days: i64) -> RawRecord {
        let joined = reference() - Duration::days(tenure_days);
        RawRecord::new(tier, "Female", "Singapore", joined.format("%Y-%m-%d").to_string())
    }

    fn scenario() -> Vec<RawRecord> {
        vec![row("Gold", 10), row("Gold", 12), row("Silver", 400), row("Silver", 420)]
    }

    #[test]
    fn test_scenario_fit_and_predict() {
        let snapshot = fit_with(&scenario(), reference(), 2, Linkage::Average).unwrap();
        let labels = snapshot.labels().unwrap();
        assert_eq!(labels.labels(), &[1, 1, 2, 2]);

        let label = snapshot.predict(&row("Gold", 11)).unwrap();
        assert_eq!(label, labels.label(0).unwrap());

        let silver = snapshot.predict(&row("Silver", 410)).unwrap();
        assert_eq!(silver, labels.label(2).unwrap());
    }

    #[test]
    fn test_k_larger_than_population_fails() {
        let err = fit_with(&scenario(), reference(), 5, Linkage::Average).unwrap_err();
        assert!(matches!(
            err,
            SegmentError::Precondition(PreconditionError::InvalidClusterCount { k: 5, n: 4 })
        ));
    }

    #[test]
    fn test_single_segment() {
        let snapshot = fit_with(&scenario(), reference(), 1, Linkage::Average).unwrap();
        for query in [row("Gold", 1), row("Bronze", 9000), row("Silver", -40)] {
            assert_eq!(snapshot.predict(&query).unwrap(), 1);
        }
    }

    #[test]
    fn test_single_training_record() {
        let snapshot = fit_with(&[row("Gold", 30)], reference(), 1, Linkage::Average).unwrap();
        assert_eq!(snapshot.predict(&row("Silver", 900)).unwrap(), 1);
        let assignment = snapshot.assign(&row("Silver", 900)).unwrap();
        assert_eq!(assignment.nearest, 0);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let snapshot = fit_with(&scenario(), reference(), 2, Linkage::Average).unwrap();
        let query = row("Silver", 15);
        assert_eq!(snapshot.assign(&query).unwrap(), snapshot.assign(&query).unwrap());
    }

    #[test]
    fn test_nearest_tie_prefers_lowest_index() {
        let rows = vec![row("Gold", 100), row("Silver", 50), row("Gold", 100)];
        let snapshot = fit_with(&rows, reference(), 3, Linkage::Average).unwrap();
        let assignment = snapshot.assign(&row("Gold", 100)).unwrap();
        assert_eq!(assignment.nearest, 0);
        assert_eq!(assignment.distance, 0.0);
    }

    #[test]
    fn test_validation_precedes_computation() {
        let mut rows = scenario();
        rows[2].location = None;
        let err = fit_with(&rows, reference(), 2, Linkage::Average).unwrap_err();
        assert!(matches!(
            err,
            SegmentError::Validation(ValidationError::InvalidRecord { row: 2, .. })
        ));

        let snapshot = fit_with(&scenario(), reference(), 2, Linkage::Average).unwrap();
        let mut query = row("Gold", 3);
        query.join_date = Some("not a date".to_string());
        assert!(matches!(
            snapshot.predict(&query),
            Err(SegmentError::Validation(ValidationError::InvalidDate { .. }))
        ));
    }

    #[test]
    fn test_empty_training_set_fails() {
        let err = fit_with(&[], reference(), 1, Linkage::Average).unwrap_err();
        assert!(matches!(
            err,
            SegmentError::Precondition(PreconditionError::EmptyTrainingSet)
        ));
    }

    #[test]
    fn test_admission_limit() {
        let config = SegmenterConfig::new(reference()).with_k(2).with_max_training_size(3);
        assert!(matches!(
            fit(&scenario(), &config),
            Err(SegmentError::Precondition(PreconditionError::TrainingSetTooLarge { n: 4, limit: 3 }))
        ));
    }

    #[test]
    fn test_future_join_dates_are_accepted() {
        let rows = vec![row("Gold", -20), row("Gold", 5), row("Silver", 300)];
        let snapshot = fit_with(&rows, reference(), 2, Linkage::Average).unwrap();
        assert_eq!(snapshot.labels().unwrap().labels(), &[1, 1, 2]);
    }

    #[test]
    fn test_normalization_changes_scale_only_for_outliers() {
        let rows = vec![row("Gold", 0), row("Gold", 100), row("Gold", 200)];
        let augmented = fit_with(&rows, reference(), 3, Linkage::Average).unwrap();
        let frozen_config = SegmenterConfig::new(reference())
            .with_k(3)
            .with_normalization(Normalization::Frozen);
        let frozen = fit(&rows, &frozen_config).unwrap();

        // query inside the training range sees the same range either way
        let inside = row("Gold", 40);
        assert_eq!(augmented.assign(&inside).unwrap(), frozen.assign(&inside).unwrap());

        // query beyond the range widens the augmented scale only
        let outside = row("Gold", 400);
        let wide = augmented.assign(&outside).unwrap();
        let fixed = frozen.assign(&outside).unwrap();
        assert_eq!(wide.nearest, 2);
        assert_eq!(fixed.nearest, 2);
        assert!((wide.distance - 0.125).abs() < 1e-12);
        assert!((fixed.distance - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_summary_profiles() {
        let snapshot = fit_with(&scenario(), reference(), 2, Linkage::Average).unwrap();
        let summary = snapshot.summary().unwrap();

        assert_eq!(summary.n, 4);
        assert_eq!(summary.cluster_sizes, vec![2, 2]);
        assert_eq!(summary.segments[0].dominant_tier, "Gold");
        assert_eq!(summary.segments[1].dominant_tier, "Silver");
        assert!((summary.segments[0].mean_tenure_days - 11.0).abs() < 1e-12);
        assert_eq!(summary.segments[1].dominant_location, "Singapore");
    }

    #[test]
    fn test_mode_ties_keep_first_seen() {
        assert_eq!(mode(["b", "a", "a", "b"].into_iter()), "b");
        assert_eq!(mode(["b", "a", "a"].into_iter()), "a");
        assert_eq!(mode(std::iter::empty()), "");
    }

    #[test]
    fn test_snapshot_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PipelineSnapshot>();
    }
}

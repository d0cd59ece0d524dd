//! Integration tests for SegmentForge

use chrono::NaiveDate;
use segmentforge::{
    evaluate_k_range, fit, fit_with, load_training_rows, ErrorKind, Linkage, Normalization,
    PipelineSnapshot, RawRecord, SegmentError, SegmenterConfig, SnapshotRegistry,
};
use std::io::Write;
use std::sync::Arc;
use std::thread;
use tempfile::NamedTempFile;

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 11).unwrap()
}

/// Create a test CSV file in the customer database export layout
fn create_test_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "Customer ID,Loyalty Tier,Gender,Location,Date Joined,Product,Channel"
    )
    .unwrap();

    // recent gold members
    writeln!(file, "1001,Gold,Female,Singapore,2025-06-01,Savings,email").unwrap();
    writeln!(file, "1002,Gold,Female,Singapore,2025-05-30,Savings,twitter").unwrap();
    writeln!(file, "1003,Gold,Male,Singapore,2025-05-25,Card,email").unwrap();

    // long-standing silver members
    writeln!(file, "1004,Silver,Female,Jurong,2024-05-07,Loan,linkedin").unwrap();
    writeln!(file, "1005,Silver,Female,Jurong,2024-04-17,Loan,email").unwrap();
    writeln!(file, "1006,Silver,Male,Jurong,2024-04-01,Card,instagram").unwrap();

    // veteran platinum members
    writeln!(file, "1007,Platinum,Male,Tampines,2019-01-15,Wealth,email").unwrap();
    writeln!(file, "1008,Platinum,Male,Tampines,2018-11-02,Wealth,linkedin").unwrap();

    file
}

fn load(file: &NamedTempFile) -> Vec<RawRecord> {
    load_training_rows(file.path().to_str().unwrap()).unwrap()
}

fn scenario_rows() -> Vec<RawRecord> {
    [("Gold", 10), ("Gold", 12), ("Silver", 400), ("Silver", 420)]
        .iter()
        .map(|&(tier, tenure)| {
            let joined = reference_date() - chrono::Duration::days(tenure);
            RawRecord::new(tier, "Female", "Singapore", joined.to_string())
        })
        .collect()
}

#[test]
fn test_end_to_end_pipeline() {
    let test_file = create_test_csv();
    let rows = load(&test_file);
    assert_eq!(rows.len(), 8);

    let config = SegmenterConfig::new(reference_date()).with_k(3);
    let snapshot = fit(&rows, &config).unwrap();

    // every customer lands in exactly one of the three segments
    let labels = snapshot.labels().unwrap();
    assert_eq!(labels.len(), 8);
    assert!(labels.labels().iter().all(|&l| (1..=3).contains(&l)));
    assert_eq!(labels.sizes().iter().sum::<usize>(), 8);
    assert_eq!(labels.labels(), &[1, 1, 1, 2, 2, 2, 3, 3]);

    let summary = snapshot.summary().unwrap();
    assert_eq!(summary.segments[2].dominant_tier, "Platinum");
}

#[test]
fn test_save_load_predict() {
    let test_file = create_test_csv();
    let snapshot = fit(&load(&test_file), &SegmenterConfig::new(reference_date()).with_k(3)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cluster_pipeline.json");
    snapshot.save(&path).unwrap();
    let restored = PipelineSnapshot::load(&path).unwrap();

    let queries = [
        RawRecord::new("Gold", "Female", "Singapore", "2025-06-05"),
        RawRecord::new("Silver", "Male", "Jurong", "2024-03-01"),
        RawRecord::new("Platinum", "Female", "Tampines", "2017-07-07"),
        RawRecord::new("Bronze", "Other", "Woodlands", "2026-01-01"),
    ];
    for query in &queries {
        assert_eq!(restored.predict(query).unwrap(), snapshot.predict(query).unwrap());
    }
    assert_eq!(restored.predict(&queries[0]).unwrap(), 1);
    assert_eq!(restored.predict(&queries[2]).unwrap(), 3);
}

#[test]
fn test_scenario_assignment() {
    let snapshot = fit_with(&scenario_rows(), reference_date(), 2, Linkage::Average).unwrap();
    assert_eq!(snapshot.labels().unwrap().labels(), &[1, 1, 2, 2]);

    let joined = reference_date() - chrono::Duration::days(11);
    let query = RawRecord::new("Gold", "Female", "Singapore", joined.to_string());
    let label = snapshot.predict(&query).unwrap();
    assert_eq!(label, snapshot.labels().unwrap().label(0).unwrap());
}

#[test]
fn test_error_handling_invalid_clusters() {
    let err = fit_with(&scenario_rows(), reference_date(), 5, Linkage::Average).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let err = fit_with(&scenario_rows(), reference_date(), 0, Linkage::Average).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn test_error_kinds_at_the_boundary() {
    let snapshot = fit_with(&scenario_rows(), reference_date(), 2, Linkage::Average).unwrap();

    let incomplete: RawRecord =
        serde_json::from_str(r#"{"tier": "Gold", "gender": "Female", "location": "Singapore"}"#).unwrap();
    assert_eq!(snapshot.predict(&incomplete).unwrap_err().kind(), ErrorKind::Validation);

    let corrupt = PipelineSnapshot::from_bytes(b"{\"format\": \"segmentforge.snapshot\"").unwrap_err();
    assert_eq!(corrupt.kind(), ErrorKind::Persistence);

    assert!(matches!(
        fit_with(&[], reference_date(), 1, Linkage::Average),
        Err(SegmentError::Precondition(_))
    ));
}

#[test]
fn test_k_one_and_single_record() {
    let snapshot = fit_with(&scenario_rows(), reference_date(), 1, Linkage::Average).unwrap();
    let query = RawRecord::new("Platinum", "Male", "Jurong", "2000-01-01");
    assert_eq!(snapshot.predict(&query).unwrap(), 1);

    let single = fit_with(&scenario_rows()[..1], reference_date(), 1, Linkage::Average).unwrap();
    assert_eq!(single.predict(&query).unwrap(), 1);
}

#[test]
fn test_frozen_normalization_round_trip() {
    let test_file = create_test_csv();
    let config = SegmenterConfig::new(reference_date())
        .with_k(3)
        .with_normalization(Normalization::Frozen);
    let snapshot = fit(&load(&test_file), &config).unwrap();
    let restored = PipelineSnapshot::from_bytes(&snapshot.to_bytes().unwrap()).unwrap();

    assert_eq!(restored.normalization(), Normalization::Frozen);
    let query = RawRecord::new("Silver", "Female", "Jurong", "2010-01-01");
    assert_eq!(restored.assign(&query).unwrap(), snapshot.assign(&query).unwrap());
}

#[test]
fn test_evaluate_k_range() {
    let test_file = create_test_csv();
    let scores = evaluate_k_range(&load(&test_file), &SegmenterConfig::new(reference_date()), 2..=5).unwrap();

    assert_eq!(scores.iter().map(|s| s.k).collect::<Vec<_>>(), vec![2, 3, 4, 5]);
    for score in &scores {
        assert!((-1.0..=1.0).contains(&score.silhouette));
        assert_eq!(score.cluster_sizes.iter().sum::<usize>(), 8);
    }
}

#[test]
fn test_registry_serves_concurrently() {
    let test_file = create_test_csv();
    let snapshot = fit(&load(&test_file), &SegmenterConfig::new(reference_date()).with_k(3)).unwrap();
    let registry = Arc::new(SnapshotRegistry::new(snapshot));
    let query = RawRecord::new("Gold", "Male", "Singapore", "2025-06-10");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let query = query.clone();
            thread::spawn(move || registry.current().predict(&query).unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 1);
    }
}

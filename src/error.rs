//! Error taxonomy for fitting, assignment and persistence
//!
//! Every failure surfaced by the library falls in one of four families so a
//! request layer can map it onto an external status without string matching.

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T, E = SegmentError> = std::result::Result<T, E>;

/// Coarse error family, stable across releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Precondition,
    Persistence,
    Computation,
}

/// Top-level library error
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("computation failed: {0}")]
    Computation(#[from] ComputationError),
}

impl SegmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SegmentError::Validation(_) => ErrorKind::Validation,
            SegmentError::Precondition(_) => ErrorKind::Precondition,
            SegmentError::Persistence(_) => ErrorKind::Persistence,
            SegmentError::Computation(_) => ErrorKind::Computation,
        }
    }
}

/// Malformed or incomplete input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("field `{field}` is not a recognised date: {value:?}")]
    InvalidDate { field: &'static str, value: String },

    #[error("input table has no `{column}` column")]
    MissingColumn { column: &'static str },

    #[error("training row {row}: {source}")]
    InvalidRecord {
        row: usize,
        #[source]
        source: Box<ValidationError>,
    },
}

/// Input is well-formed but the operation cannot run on it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("training population is empty")]
    EmptyTrainingSet,

    #[error("cluster count k={k} is outside [1, {n}]")]
    InvalidClusterCount { k: usize, n: usize },

    #[error("training population of {n} records exceeds the admission limit of {limit}")]
    TrainingSetTooLarge { n: usize, limit: usize },

    #[error("linkage method {method:?} is not supported for a precomputed mixed-type distance")]
    UnsupportedLinkage { method: String },
}

/// A snapshot could not be written or restored
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("snapshot blob is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("snapshot format {found} is incompatible with {expected}")]
    IncompatibleVersion { found: String, expected: String },

    #[error("snapshot decoded but is inconsistent: {reason}")]
    Inconsistent { reason: String },
}

/// Unexpected numeric anomaly
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputationError {
    #[error("distance between records {i} and {j} is not finite")]
    NonFiniteDistance { i: usize, j: usize },

    #[error("condensed distance vector has {found} entries, expected {expected}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("merge {index} at height {current} is lower than the previous merge at {previous}")]
    NonMonotonicMerge {
        index: usize,
        previous: f64,
        current: f64,
    },
}

//! SegmentForge: customer segmentation with Gower distance and agglomerative clustering
//!
//! Training customers are compared on loyalty tier, gender, location and
//! tenure with a mixed-type Gower dissimilarity, grouped into a merge tree
//! and cut into `k` segments. New customers take the segment of their
//! nearest training neighbour, so the tree is never rebuilt per request.

pub mod cli;
pub mod config;
pub mod cut;
pub mod data;
pub mod distance;
pub mod error;
pub mod evaluate;
pub mod linkage;
pub mod model;
pub mod persist;
pub mod record;
pub mod registry;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use config::{ConfigFile, Normalization, SegmenterConfig};
pub use cut::{cut, FlatClustering};
pub use data::load_training_rows;
pub use distance::{gower_matrix, DistanceMatrix, GowerScale};
pub use error::{
    ComputationError, ErrorKind, PersistenceError, PreconditionError, Result, SegmentError,
    ValidationError,
};
pub use evaluate::{evaluate_k_range, silhouette, KScore};
pub use linkage::{Linkage, Merge, MergeTree};
pub use model::{fit, fit_training, fit_with, Assignment, PipelineSnapshot, SnapshotSummary, TrainingSet};
pub use record::{FeatureRecord, Observation, RawRecord};
pub use registry::SnapshotRegistry;
pub use viz::generate_visualization_report;

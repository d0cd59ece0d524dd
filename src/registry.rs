//! Serving handle that swaps whole snapshots in one step

use crate::error::Result;
use crate::model::PipelineSnapshot;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Holds the snapshot currently used for assignment.
///
/// Readers take an `Arc` and predict without holding the lock. Replacement
/// snapshots are built completely before `publish` swaps them in, so an
/// in-flight request keeps the snapshot it started with.
#[derive(Debug)]
pub struct SnapshotRegistry {
    current: RwLock<Arc<PipelineSnapshot>>,
}

impl SnapshotRegistry {
    pub fn new(snapshot: PipelineSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Load the initial snapshot; serving must not start without one
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        PipelineSnapshot::load(path).map(Self::new)
    }

    pub fn current(&self) -> Arc<PipelineSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a fully built snapshot, returning the one it replaces
    pub fn publish(&self, snapshot: PipelineSnapshot) -> Arc<PipelineSnapshot> {
        let next = Arc::new(snapshot);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    /// Load a snapshot off to the side and publish it only if it is valid.
    /// On failure the previous snapshot keeps serving.
    pub fn reload(&self, path: impl AsRef<Path>) -> Result<Arc<PipelineSnapshot>> {
        let snapshot = PipelineSnapshot::load(path)?;
        // prime the cached labels before readers can see it
        snapshot.labels()?;
        Ok(self.publish(snapshot))
    }
}

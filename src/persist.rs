//! Snapshot persistence as one versioned, self-validating JSON blob

use crate::error::{PersistenceError, Result};
use crate::model::PipelineSnapshot;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Tag identifying a snapshot blob
pub const SNAPSHOT_FORMAT: &str = "segmentforge.snapshot";

/// Bumped whenever the stored layout changes incompatibly
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: &'a str,
    version: u32,
    snapshot: &'a PipelineSnapshot,
}

#[derive(Deserialize)]
struct Header {
    format: String,
    version: u32,
}

#[derive(Deserialize)]
struct Envelope {
    snapshot: PipelineSnapshot,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value).map_err(PersistenceError::Encode)?)
}

impl PipelineSnapshot {
    /// Encode the whole snapshot
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let envelope = EnvelopeRef {
            format: SNAPSHOT_FORMAT,
            version: SNAPSHOT_VERSION,
            snapshot: self,
        };
        encode(&envelope)
    }

    /// Decode a snapshot, rejecting foreign, outdated or inconsistent blobs
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header: Header = serde_json::from_slice(bytes).map_err(PersistenceError::Corrupt)?;
        if header.format != SNAPSHOT_FORMAT || header.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::IncompatibleVersion {
                found: format!("{} v{}", header.format, header.version),
                expected: format!("{} v{}", SNAPSHOT_FORMAT, SNAPSHOT_VERSION),
            }
            .into());
        }

        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(PersistenceError::Corrupt)?;
        let snapshot = envelope.snapshot;
        snapshot
            .check()
            .map_err(|reason| PersistenceError::Inconsistent { reason })?;
        Ok(snapshot)
    }

    /// Write to `path` through a sibling temporary file so readers never see
    /// a partial artifact
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let staging = staging_path(path);
        fs::write(&staging, &bytes).map_err(PersistenceError::Io)?;
        fs::rename(&staging, path).map_err(PersistenceError::Io)?;
        log::info!("saved snapshot ({} bytes) to {}", bytes.len(), path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(PersistenceError::Io)?;
        let snapshot = Self::from_bytes(&bytes)?;
        log::info!(
            "loaded snapshot from {}: {} records, k={}",
            path.display(),
            snapshot.training().len(),
            snapshot.k()
        );
        Ok(snapshot)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

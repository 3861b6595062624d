//! Artifact serialization with integrity checks and atomic writes

use crate::error::{ChurnError, Result};
use crate::export::artifact::TrainedArtifact;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Magic bytes at the head of every artifact file
pub const ARTIFACT_MAGIC: [u8; 4] = *b"CHRN";
/// Envelope layout version
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactEnvelope {
    magic: [u8; 4],
    format_version: u32,
    payload: Vec<u8>,
    checksum: u64,
}

/// FNV-1a over the payload
fn checksum(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 14695981039346656037;
    const FNV_PRIME: u64 = 1099511628211;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Writes and reads [`TrainedArtifact`] files.
///
/// Readers never observe a partial file: bytes go to a temp file in the
/// destination directory, are synced, then renamed over the target.
pub struct ArtifactSerializer;

impl ArtifactSerializer {
    pub fn to_bytes(artifact: &TrainedArtifact) -> Result<Vec<u8>> {
        let payload = bincode::serialize(artifact)?;
        let envelope = ArtifactEnvelope {
            magic: ARTIFACT_MAGIC,
            format_version: FORMAT_VERSION,
            checksum: checksum(&payload),
            payload,
        };
        Ok(bincode::serialize(&envelope)?)
    }

    /// Decode and validate envelope, checksum and feature schema
    pub fn from_bytes(bytes: &[u8]) -> Result<TrainedArtifact> {
        if bytes.len() < ARTIFACT_MAGIC.len() || bytes[..ARTIFACT_MAGIC.len()] != ARTIFACT_MAGIC {
            return Err(ChurnError::SerializationError("not a churn model artifact".to_string()));
        }
        let envelope: ArtifactEnvelope = bincode::deserialize(bytes)
            .map_err(|e| ChurnError::SerializationError(format!("corrupt artifact envelope: {}", e)))?;
        if envelope.format_version != FORMAT_VERSION {
            return Err(ChurnError::SerializationError(format!(
                "unsupported artifact format version {} (expected {})",
                envelope.format_version, FORMAT_VERSION
            )));
        }
        if checksum(&envelope.payload) != envelope.checksum {
            return Err(ChurnError::SerializationError("artifact checksum mismatch".to_string()));
        }

        let artifact: TrainedArtifact = bincode::deserialize(&envelope.payload)
            .map_err(|e| ChurnError::SerializationError(format!("corrupt artifact payload: {}", e)))?;
        artifact.schema().verify()?;
        Ok(artifact)
    }

    pub fn save(artifact: &TrainedArtifact, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = Self::to_bytes(artifact)?;

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let mut temp = NamedTempFile::new_in(&parent)?;
        temp.write_all(&bytes)?;
        temp.as_file().sync_all()?;
        debug!(temp = %temp.path().display(), bytes = bytes.len(), "Artifact staged");

        temp.persist(path).map_err(|e| {
            ChurnError::SerializationError(format!("persist artifact to {} failed: {}", path.display(), e.error))
        })?;

        info!(
            path = %path.display(),
            model = artifact.model_name(),
            bytes = bytes.len(),
            "Artifact written"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<TrainedArtifact> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let artifact = Self::from_bytes(&bytes)?;
        debug!(path = %path.display(), model = artifact.model_name(), "Artifact loaded");
        Ok(artifact)
    }
}

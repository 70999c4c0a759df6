//! Durable storage for the active centroid set.
//!
//! The centroid set is one global, versioned artifact: the ordered list of K
//! unit vectors a full clustering run produced. It is written as a single
//! binary blob and atomically replaced, so readers always observe either the
//! previous set or the new one, never a torn mix.
//!
//! # Storage Format
//! - Header (16 bytes): magic, format version, k, dimension (u32 LE each)
//! - Payload: k * dimension f32 values in little-endian format

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::vector::codec::pack_f32_le;
use crate::vector::types::VectorError;

/// Current blob format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the blob header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes identifying a centroid blob.
const MAGIC_BYTES: &[u8; 4] = b"DMCS";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Errors specific to centroid set storage.
#[derive(Error, Debug)]
pub enum CentroidStoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid centroid blob: {0}\nSuggestion: Run a full clustering pass to rewrite it")]
    InvalidFormat(String),

    #[error(
        "Centroid blob version mismatch: expected {expected}, got {actual}\nSuggestion: Run a full clustering pass to migrate the blob"
    )]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),
}

/// File-backed store for the active centroid set.
#[derive(Debug, Clone)]
pub struct CentroidStore {
    path: PathBuf,
}

impl CentroidStore {
    /// Creates a store rooted at the given blob path.
    ///
    /// The file is not touched until the first `save`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the blob path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if an active centroid set exists on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Atomically replaces the active centroid set.
    ///
    /// Writes to a sibling temp file, fsyncs, then renames over the blob
    /// path. Rename within one directory is the atomicity boundary.
    pub fn save(&self, centroids: &[Vec<f32>]) -> Result<(), CentroidStoreError> {
        if centroids.is_empty() {
            return Err(CentroidStoreError::InvalidFormat(
                "refusing to persist an empty centroid set".to_string(),
            ));
        }
        let dimension = centroids[0].len();
        if centroids.iter().any(|c| c.len() != dimension) {
            return Err(VectorError::DimensionMismatch {
                expected: dimension,
                actual: centroids
                    .iter()
                    .map(|c| c.len())
                    .find(|&len| len != dimension)
                    .unwrap_or(dimension),
            }
            .into());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(MAGIC_BYTES)?;
            file.write_all(&STORAGE_VERSION.to_le_bytes())?;
            file.write_all(&(centroids.len() as u32).to_le_bytes())?;
            file.write_all(&(dimension as u32).to_le_bytes())?;
            for centroid in centroids {
                file.write_all(&pack_f32_le(centroid))?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        tracing::debug!(
            k = centroids.len(),
            dimension,
            path = %self.path.display(),
            "persisted centroid set"
        );
        Ok(())
    }

    /// Loads the active centroid set.
    ///
    /// Returns `Ok(None)` when no blob exists yet (the system has never been
    /// clustered); format and version violations are errors.
    pub fn load(&self) -> Result<Option<Vec<Vec<f32>>>, CentroidStoreError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        if bytes.len() < HEADER_SIZE {
            return Err(CentroidStoreError::InvalidFormat(format!(
                "blob of {} bytes is smaller than the header",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC_BYTES {
            return Err(CentroidStoreError::InvalidFormat(
                "bad magic bytes".to_string(),
            ));
        }

        let version = u32::from_le_bytes(bytes[4..8].try_into().expect("header size verified"));
        if version != STORAGE_VERSION {
            return Err(CentroidStoreError::VersionMismatch {
                expected: STORAGE_VERSION,
                actual: version,
            });
        }

        let k = u32::from_le_bytes(bytes[8..12].try_into().expect("header size verified")) as usize;
        let dimension =
            u32::from_le_bytes(bytes[12..16].try_into().expect("header size verified")) as usize;

        let expected_len = HEADER_SIZE + k * dimension * BYTES_PER_F32;
        if bytes.len() != expected_len {
            return Err(CentroidStoreError::InvalidFormat(format!(
                "blob length {} does not match header (k={k}, dim={dimension})",
                bytes.len()
            )));
        }

        let mut centroids = Vec::with_capacity(k);
        let payload = &bytes[HEADER_SIZE..];
        for chunk in payload.chunks_exact(dimension * BYTES_PER_F32) {
            let mut centroid = Vec::with_capacity(dimension);
            for value in chunk.chunks_exact(BYTES_PER_F32) {
                centroid.push(f32::from_le_bytes(
                    value.try_into().expect("chunk size verified"),
                ));
            }
            centroids.push(centroid);
        }

        Ok(Some(centroids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_centroids() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0, 0.0, 0.5],
            vec![0.0, 1.0, 0.0, -0.5],
            vec![0.0, 0.0, 1.0, 0.25],
        ]
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = CentroidStore::new(dir.path().join("centroids.bin"));

        let centroids = sample_centroids();
        store.save(&centroids).unwrap();

        let loaded = store.load().unwrap().expect("blob should exist");
        assert_eq!(loaded, centroids);
    }

    #[test]
    fn test_load_missing_blob_is_none() {
        let dir = TempDir::new().unwrap();
        let store = CentroidStore::new(dir.path().join("missing.bin"));
        assert!(store.load().unwrap().is_none());
        assert!(!store.exists());
    }

    #[test]
    fn test_save_replaces_previous_set() {
        let dir = TempDir::new().unwrap();
        let store = CentroidStore::new(dir.path().join("centroids.bin"));

        store.save(&sample_centroids()).unwrap();
        let replacement = vec![vec![0.5, 0.5], vec![-0.5, 0.5]];
        store.save(&replacement).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, replacement);
    }

    #[test]
    fn test_save_rejects_empty_set() {
        let dir = TempDir::new().unwrap();
        let store = CentroidStore::new(dir.path().join("centroids.bin"));
        assert!(matches!(
            store.save(&[]),
            Err(CentroidStoreError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_save_rejects_ragged_centroids() {
        let dir = TempDir::new().unwrap();
        let store = CentroidStore::new(dir.path().join("centroids.bin"));
        let ragged = vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]];
        assert!(matches!(
            store.save(&ragged),
            Err(CentroidStoreError::Vector(_))
        ));
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("centroids.bin");
        fs::write(&path, b"XXXX0000000000000000").unwrap();

        let store = CentroidStore::new(&path);
        assert!(matches!(
            store.load(),
            Err(CentroidStoreError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_load_rejects_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("centroids.bin");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC_BYTES);
        bytes.extend_from_slice(&99u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        fs::write(&path, bytes).unwrap();

        let store = CentroidStore::new(&path);
        assert!(matches!(
            store.load(),
            Err(CentroidStoreError::VersionMismatch {
                expected: STORAGE_VERSION,
                actual: 99
            })
        ));
    }

    #[test]
    fn test_load_rejects_truncated_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("centroids.bin");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC_BYTES);
        bytes.extend_from_slice(&STORAGE_VERSION.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]); // far short of 2 * 4 * 4 bytes
        fs::write(&path, bytes).unwrap();

        let store = CentroidStore::new(&path);
        assert!(matches!(
            store.load(),
            Err(CentroidStoreError::InvalidFormat(_))
        ));
    }
}

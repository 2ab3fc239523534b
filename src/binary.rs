//! Immutable snapshots of on-disk executables and staging comparisons.

use std::{
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    error::{BinaryError, SwapError},
    swap,
};

/// Snapshot of an executable file: absolute path, content digest, mod-time.
///
/// Digest and timestamp are captured at construction and never mutated; when
/// the engine needs fresher state it takes a new snapshot and drops this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    path: PathBuf,
    digest: [u8; 32],
    modified: SystemTime,
}

impl Binary {
    /// Snapshots the file at `path`.
    ///
    /// The path is made absolute, the file is stat'ed, and a SHA-256 digest
    /// is computed over the entire content. Fails if the file is missing or
    /// unreadable.
    pub fn snapshot(path: &Path) -> Result<Self, BinaryError> {
        let path = std::path::absolute(path).map_err(|source| BinaryError::Resolve {
            path: path.to_path_buf(),
            source,
        })?;

        let metadata = fs::metadata(&path).map_err(|source| BinaryError::Stat {
            path: path.clone(),
            source,
        })?;
        let modified = metadata.modified().map_err(|source| BinaryError::Stat {
            path: path.clone(),
            source,
        })?;

        let digest = digest_file(&path)?;
        debug!("Snapshot of {}: sha256 {}", path.display(), hex::encode(digest));

        Ok(Self {
            path,
            digest,
            modified,
        })
    }

    /// Absolute path of the snapshotted file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name component, used to locate the staging counterpart.
    pub fn name(&self) -> &OsStr {
        self.path.file_name().unwrap_or(self.path.as_os_str())
    }

    /// Hex-encoded content digest, for logs and assertions.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    /// Modification timestamp captured at snapshot time.
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    fn staging_candidate(&self, staging: &Path) -> PathBuf {
        staging.join(self.name())
    }

    /// Whether the running copy is still the latest version.
    ///
    /// The candidate is `staging/<basename>`. A missing candidate, a
    /// candidate with a strictly older mod-time, or one with an identical
    /// digest all mean "latest". An older candidate counts as latest even
    /// when its content differs, so a stale file left in staging cannot
    /// downgrade the running binary. Filesystem errors other than not-found
    /// are surfaced, never folded into the boolean.
    pub fn is_latest(&self, staging: &Path) -> Result<bool, BinaryError> {
        let candidate = self.staging_candidate(staging);
        match Binary::snapshot(&candidate) {
            Err(err) if err.is_not_found() => Ok(true),
            Err(err) => Err(err),
            Ok(stage) => {
                if stage.modified < self.modified {
                    return Ok(true);
                }
                Ok(stage.digest == self.digest)
            }
        }
    }

    /// Overwrites this binary in place from its staging counterpart.
    pub fn switch(&self, staging: &Path) -> Result<(), SwapError> {
        swap::swap_file(&self.staging_candidate(staging), &self.path)
    }
}

fn digest_file(path: &Path) -> Result<[u8; 32], BinaryError> {
    let mut file = fs::File::open(path).map_err(|source| BinaryError::Digest {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|source| BinaryError::Digest {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(hasher.finalize().into())
}

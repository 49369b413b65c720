//! Content digests of build outputs.
//!
//! Ninja's `restat` only compares modification times. These digests decide
//! whether an output really changed, independent of timestamps.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// A lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
  #[error("failed to walk directory {}: {source}", path.display())]
  WalkDir { path: PathBuf, source: walkdir::Error },

  #[error("failed to read {}: {source}", path.display())]
  Read { path: PathBuf, source: std::io::Error },
}

/// Digest of a directory tree: relative paths, file contents and symlink
/// targets, visited in name order. Timestamps and permissions are ignored.
pub fn hash_directory(root: &Path) -> Result<ContentHash, DigestError> {
  let mut hasher = Sha256::new();

  for entry in WalkDir::new(root).sort_by_file_name() {
    let entry = entry.map_err(|e| DigestError::WalkDir {
      path: root.to_path_buf(),
      source: e,
    })?;
    let rel_path = entry
      .path()
      .strip_prefix(root)
      .unwrap_or(entry.path())
      .to_string_lossy()
      .to_string();
    if rel_path.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    let line = if file_type.is_file() {
      format!("F:{rel_path}:{}", hash_file(entry.path())?)
    } else if file_type.is_dir() {
      format!("D:{rel_path}")
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry.path()).map_err(|e| DigestError::Read {
        path: entry.path().to_path_buf(),
        source: e,
      })?;
      format!("L:{rel_path}:{}", hash_bytes(target.to_string_lossy().as_bytes()))
    } else {
      continue;
    };

    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

pub fn hash_file(path: &Path) -> Result<ContentHash, DigestError> {
  let read_error = |e| DigestError::Read {
    path: path.to_path_buf(),
    source: e,
  };
  let mut file = fs::File::open(path).map_err(read_error)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];
  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_error)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}

/// Digests of a set of output paths at one point in time.
///
/// Missing paths are recorded as absent rather than failing, so a snapshot can
/// be taken before the first build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputDigests(BTreeMap<String, Option<ContentHash>>);

impl OutputDigests {
  /// Hash every path in `outputs`; directories are hashed recursively.
  pub fn capture<'a>(outputs: impl IntoIterator<Item = &'a String>) -> Result<Self, DigestError> {
    let mut digests = BTreeMap::new();
    for output in outputs {
      let path = Path::new(output);
      let digest = if path.is_dir() {
        Some(hash_directory(path)?)
      } else if path.exists() {
        Some(hash_file(path)?)
      } else {
        None
      };
      digests.insert(output.clone(), digest);
    }
    Ok(Self(digests))
  }

  pub fn get(&self, output: &str) -> Option<&ContentHash> {
    self.0.get(output).and_then(Option::as_ref)
  }

  /// Whether `output` differs between `self` and `later`. Unknown paths count as changed.
  pub fn changed(&self, later: &OutputDigests, output: &str) -> bool {
    match (self.0.get(output), later.0.get(output)) {
      (Some(Some(before)), Some(Some(after))) => before != after,
      _ => true,
    }
  }
}

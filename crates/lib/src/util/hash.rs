//! Hashing utilities for fingerprints and artifact verification.
//!
//! This module provides:
//! - `Fingerprint`: a truncated 20-character hash identifying a resource
//! - `ContentHash`: a full 64-character hash for content verification
//! - `fingerprint_path()`: stable fingerprint of a resource's canonical path
//! - `hash_file()`: single file hashing
//! - `hash_bytes()`: arbitrary byte hashing

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::OBJ_HASH_PREFIX_LEN;

/// A deterministic fingerprint of a resource.
///
/// The fingerprint is a 20-character truncated SHA-256 of the resource's
/// canonical absolute path, so the same artifact always maps to the same
/// fingerprint regardless of how the path was spelled by the caller.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string, e.g., `"a1b2c3d4e5f6789012ab"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl std::fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A full 64-character SHA256 hash for content verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Compute the fingerprint of a resource from its canonical path.
///
/// # Errors
///
/// Returns an error if the path does not exist or cannot be canonicalized.
pub fn fingerprint_path(path: &Path) -> io::Result<Fingerprint> {
  let canonical = dunce::canonicalize(path)?;
  let full = hash_bytes(canonical.to_string_lossy().as_bytes());
  Ok(Fingerprint(full.0[..OBJ_HASH_PREFIX_LEN].to_string()))
}

/// Compute SHA256 hash of a file's contents.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
  let mut file = fs::File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let n = file.read(&mut buffer)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Compute SHA256 hash of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}

//! Core domain types for Tenderfold.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Result, TenderfoldError};

// ---------------------------------------------------------------------------
// ProjectRoot
// ---------------------------------------------------------------------------

/// A directory identified as a bid-evaluation project root.
///
/// Identity is the normalized absolute path; alias paths (the marker
/// directory itself, or the data directory beneath it) are folded to the
/// root before a `ProjectRoot` is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectRoot(PathBuf);

impl ProjectRoot {
    /// Wrap an already-normalized project root path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// The root directory path.
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl std::fmt::Display for ProjectRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for ProjectRoot {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// SHA-256 digest of a file's full byte content.
///
/// Used only as a dedup equivalence key; recomputed each run, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Hash a file's full contents, streaming in fixed-size chunks.
    pub fn of_file(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| TenderfoldError::io(path, e))?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = file.read(&mut buf).map_err(|e| TenderfoldError::io(path, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Hex-encoded digest string.
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Optional-collaborator availability, resolved once at startup and injected
/// into the assembly driver instead of being read from ambient state.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Whether PDF composition is available.
    pub can_compose: bool,
    /// Whether the external document converter is available.
    pub can_convert: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_compose: true,
            can_convert: false,
        }
    }
}

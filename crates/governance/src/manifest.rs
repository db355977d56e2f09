//! Global append-only conversion manifest with a Merkle-root fingerprint.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use operative_core::{
    canonical::to_canonical_string,
    integrity::{leaf_hash, merkle_proof, merkle_root_hex, sha256_hex, ProofStep},
    Error, Result,
};

/// Length of the short hash returned by `append`.
const SHORT_HASH_LEN: usize = 12;

/// A typical manifest record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub timestamp: String,
    /// What happened (`agent_bound`, ...).
    pub action: String,
    /// What it happened to.
    pub target: String,
    #[serde(default)]
    pub details: Value,
}

impl ManifestEntry {
    pub fn new(action: impl Into<String>, target: impl Into<String>, details: Value) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            action: action.into(),
            target: target.into(),
            details,
        }
    }
}

/// JSON-lines manifest file.
///
/// Writers are serialized through an in-process lock; the file is never
/// rewritten, only appended to.
pub struct ConversionManifest {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConversionManifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a canonical JSON line; returns a short hash of it.
    pub fn append<T: Serialize>(&self, entry: &T) -> Result<String> {
        let line = to_canonical_string(entry)?;
        let short = sha256_hex(line.as_bytes())[..SHORT_HASH_LEN].to_string();

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::internal("manifest lock poisoned"))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::manifest(format!("create {:?}: {}", parent, e)))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::manifest(format!("open {:?}: {}", self.path, e)))?;
        file.write_all(format!("{}\n", line).as_bytes())?;
        file.flush()?;

        tracing::debug!(hash = %short, "Manifest entry appended");
        Ok(short)
    }

    fn lines(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)?;
        Ok(text
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn leaves(&self) -> Result<Vec<[u8; 32]>> {
        Ok(self
            .lines()?
            .iter()
            .map(|l| leaf_hash(l.as_bytes()))
            .collect())
    }

    /// All records in append order.
    pub fn entries(&self) -> Result<Vec<Value>> {
        self.lines()?
            .iter()
            .enumerate()
            .map(|(idx, l)| {
                serde_json::from_str(l)
                    .map_err(|e| Error::manifest(format!("line {}: {}", idx + 1, e)))
            })
            .collect()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lines()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Merkle root over every record's hash.
    pub fn merkle_root(&self) -> Result<String> {
        Ok(merkle_root_hex(&self.leaves()?))
    }

    /// Inclusion proof for the record at `index`.
    pub fn proof(&self, index: usize) -> Result<Option<Vec<ProofStep>>> {
        Ok(merkle_proof(&self.leaves()?, index))
    }
}

//! Dataset storage handles.
//!
//! A database is a set of named datasets, each pointing at the head of a
//! chain of content-addressed commits. The handle abstraction exposes just
//! enough to read a dataset, append to it and delete it along with the history
//! only it can reach.

mod local;
mod memory;
mod remote;

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use local::LocalDatabase;
pub use memory::MemoryDatabase;
pub use remote::RemoteDatabase;

/// Name of the dataset holding a database's local state.
pub const LOCAL_DATASET: &str = "local";

/// Result type alias for dataset operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// Error type for dataset operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// I/O error from a local store.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A commit could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Stored data does not match its address or format.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// Dataset names must be non-empty and file-name safe.
    #[error("invalid dataset name: {0:?}")]
    InvalidDatasetName(String),
    /// The dataset head moved between reading it and committing to it.
    #[error("dataset {0} was updated concurrently")]
    ConcurrentUpdate(String),
    /// A remote database rejected or failed a request.
    #[error("remote database error: {0}")]
    Remote(String),
}

/// Content address of a commit (SHA-256 of its canonical encoding).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Hashes `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut out)
            .map_err(|err| DbError::Corruption(format!("invalid hash {s:?}: {err}")))?;
        Ok(Self(out))
    }
}

impl Serialize for Hash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A named pointer into a database's commit history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    name: String,
    head: Option<Hash>,
}

impl Dataset {
    pub(crate) fn new(name: impl Into<String>, head: Option<Hash>) -> Self {
        Self {
            name: name.into(),
            head,
        }
    }

    /// Dataset name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current head commit, `None` when nothing was committed yet.
    pub fn head(&self) -> Option<Hash> {
        self.head
    }
}

/// A single entry in a dataset's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Previous head of the dataset.
    pub parent: Option<Hash>,
    /// Committed value.
    pub value: Value,
}

impl Commit {
    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub(crate) fn decode(hash: &Hash, bytes: &[u8]) -> Result<Self> {
        if Hash::of(bytes) != *hash {
            return Err(DbError::Corruption(format!("chunk {hash} fails its checksum")));
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Live handle to a database.
pub trait Database: Send + Sync {
    /// Looks up a dataset by name. Unknown datasets come back with no head.
    fn get_dataset(&self, name: &str) -> Result<Dataset>;

    /// Appends `value` on top of the dataset's head and returns the updated dataset.
    fn commit(&self, dataset: &Dataset, value: Value) -> Result<Dataset>;

    /// Removes the dataset and every commit no other dataset can reach.
    fn delete(&self, dataset: &Dataset) -> Result<Dataset>;
}

pub(crate) fn validate_dataset_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidDatasetName(name.to_string()))
    }
}

/// Walks the parent chain from `head`, stopping at commits already in `seen`.
pub(crate) fn collect_history<F>(head: Option<Hash>, seen: &mut HashSet<Hash>, mut load: F) -> Result<()>
where
    F: FnMut(&Hash) -> Result<Option<Commit>>,
{
    let mut cursor = head;
    while let Some(hash) = cursor {
        if !seen.insert(hash) {
            break;
        }
        cursor = match load(&hash)? {
            Some(commit) => commit.parent,
            None => None,
        };
    }
    Ok(())
}

/// Commits reachable from `doomed` but from none of `survivors`.
pub(crate) fn exclusive_history<F>(doomed: Option<Hash>, survivors: &[Hash], mut load: F) -> Result<Vec<Hash>>
where
    F: FnMut(&Hash) -> Result<Option<Commit>>,
{
    let mut kept = HashSet::new();
    for head in survivors {
        collect_history(Some(*head), &mut kept, &mut load)?;
    }
    let mut removed = HashSet::new();
    collect_history(doomed, &mut removed, &mut load)?;
    let mut out: Vec<Hash> = removed.difference(&kept).copied().collect();
    out.sort();
    Ok(out)
}

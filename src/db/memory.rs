use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use serde_json::Value;

use super::{exclusive_history, validate_dataset_name, Commit, Database, Dataset, DbError, Hash, Result};

#[derive(Default)]
struct State {
    chunks: HashMap<Hash, Commit>,
    datasets: BTreeMap<String, Hash>,
}

/// Database held entirely in memory; dropped with the handle.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

impl MemoryDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn commit_count(&self) -> usize {
        self.state.lock().chunks.len()
    }
}

impl Database for MemoryDatabase {
    fn get_dataset(&self, name: &str) -> Result<Dataset> {
        validate_dataset_name(name)?;
        let state = self.state.lock();
        Ok(Dataset::new(name, state.datasets.get(name).copied()))
    }

    fn commit(&self, dataset: &Dataset, value: Value) -> Result<Dataset> {
        validate_dataset_name(dataset.name())?;
        let mut state = self.state.lock();
        if state.datasets.get(dataset.name()).copied() != dataset.head() {
            return Err(DbError::ConcurrentUpdate(dataset.name().to_string()));
        }
        let commit = Commit {
            parent: dataset.head(),
            value,
        };
        let hash = Hash::of(&commit.encode()?);
        state.chunks.entry(hash).or_insert(commit);
        state.datasets.insert(dataset.name().to_string(), hash);
        Ok(Dataset::new(dataset.name(), Some(hash)))
    }

    fn delete(&self, dataset: &Dataset) -> Result<Dataset> {
        validate_dataset_name(dataset.name())?;
        let mut state = self.state.lock();
        let Some(head) = state.datasets.remove(dataset.name()) else {
            return Ok(Dataset::new(dataset.name(), None));
        };
        let survivors: Vec<Hash> = state.datasets.values().copied().collect();
        let doomed = exclusive_history(Some(head), &survivors, |hash| {
            Ok(state.chunks.get(hash).cloned())
        })?;
        for hash in doomed {
            state.chunks.remove(&hash);
        }
        Ok(Dataset::new(dataset.name(), None))
    }
}

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use super::{exclusive_history, validate_dataset_name, Commit, Database, Dataset, DbError, Hash, Result};

const CHUNKS_DIR: &str = "chunks";
const DATASETS_DIR: &str = "datasets";

/// Database stored in a local directory.
///
/// Commits live under `chunks/<hash>`, dataset heads under `datasets/<name>`.
pub struct LocalDatabase {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalDatabase {
    /// Opens the database at `root`, creating the directory layout if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` exists but is not a directory, or if the
    /// layout cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if root.exists() && !root.is_dir() {
            return Err(DbError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            )));
        }
        fs::create_dir_all(root.join(CHUNKS_DIR))?;
        fs::create_dir_all(root.join(DATASETS_DIR))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn chunk_path(&self, hash: &Hash) -> PathBuf {
        self.root.join(CHUNKS_DIR).join(hash.to_hex())
    }

    fn dataset_path(&self, name: &str) -> PathBuf {
        self.root.join(DATASETS_DIR).join(name)
    }

    fn read_head(&self, name: &str) -> Result<Option<Hash>> {
        match fs::read_to_string(self.dataset_path(name)) {
            Ok(raw) => Ok(Some(raw.parse()?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn load_commit(&self, hash: &Hash) -> Result<Option<Commit>> {
        match fs::read(self.chunk_path(hash)) {
            Ok(bytes) => Ok(Some(Commit::decode(hash, &bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn other_heads(&self, except: &str) -> Result<Vec<Hash>> {
        let mut heads = Vec::new();
        for entry in fs::read_dir(self.root.join(DATASETS_DIR))? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name == except || name.starts_with('.') {
                continue;
            }
            if let Some(head) = self.read_head(name)? {
                heads.push(head);
            }
        }
        Ok(heads)
    }
}

impl Database for LocalDatabase {
    fn get_dataset(&self, name: &str) -> Result<Dataset> {
        validate_dataset_name(name)?;
        Ok(Dataset::new(name, self.read_head(name)?))
    }

    fn commit(&self, dataset: &Dataset, value: Value) -> Result<Dataset> {
        validate_dataset_name(dataset.name())?;
        let _guard = self.write_lock.lock();
        if self.read_head(dataset.name())? != dataset.head() {
            return Err(DbError::ConcurrentUpdate(dataset.name().to_string()));
        }
        let commit = Commit {
            parent: dataset.head(),
            value,
        };
        let bytes = commit.encode()?;
        let hash = Hash::of(&bytes);
        let chunk = self.chunk_path(&hash);
        if !chunk.exists() {
            write_atomic(&chunk, &bytes)?;
        }
        write_atomic(&self.dataset_path(dataset.name()), hash.to_hex().as_bytes())?;
        debug!(dataset = dataset.name(), head = %hash, "committed");
        Ok(Dataset::new(dataset.name(), Some(hash)))
    }

    fn delete(&self, dataset: &Dataset) -> Result<Dataset> {
        validate_dataset_name(dataset.name())?;
        let _guard = self.write_lock.lock();
        let head = self.read_head(dataset.name())?;
        let survivors = self.other_heads(dataset.name())?;
        let doomed = exclusive_history(head, &survivors, |hash| self.load_commit(hash))?;

        match fs::remove_file(self.dataset_path(dataset.name())) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        for hash in &doomed {
            match fs::remove_file(self.chunk_path(hash)) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        debug!(
            dataset = dataset.name(),
            removed_commits = doomed.len(),
            "deleted dataset"
        );
        Ok(Dataset::new(dataset.name(), None))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("chunk"));
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

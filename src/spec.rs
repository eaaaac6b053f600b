//! Database location strings and their memoized resolution.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::db::{Database, DbError, LocalDatabase, MemoryDatabase, RemoteDatabase};

const MEMORY_SCHEME: &str = "mem";
const LOCAL_SCHEME: &str = "nbs:";

/// Error type for location resolution.
#[derive(Debug, Error)]
pub enum SpecError {
    /// The location string was empty.
    #[error("database location is empty")]
    Empty,
    /// The location looked like a URL but could not be used as one.
    #[error("invalid database url {0:?}")]
    InvalidUrl(String),
    /// A local location points at something other than a directory.
    #[error("database path {0} is not a directory")]
    NotADirectory(PathBuf),
    /// Opening the database failed.
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Result type alias for location resolution.
pub type Result<T> = std::result::Result<T, SpecError>;

/// Parsed form of a location string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Fresh in-memory database.
    Memory,
    /// Directory on the local filesystem.
    Local(PathBuf),
    /// Database served over HTTP(S).
    Remote(String),
}

impl Location {
    /// Parses a location string without touching the filesystem or network.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SpecError::Empty);
        }
        if trimmed == MEMORY_SCHEME || trimmed == "mem:" {
            return Ok(Self::Memory);
        }
        if let Some(rest) = trimmed
            .strip_prefix("http://")
            .or_else(|| trimmed.strip_prefix("https://"))
        {
            let host = rest.split('/').next().unwrap_or_default();
            if host.is_empty() {
                return Err(SpecError::InvalidUrl(trimmed.to_string()));
            }
            return Ok(Self::Remote(trimmed.to_string()));
        }
        let path = trimmed.strip_prefix(LOCAL_SCHEME).unwrap_or(trimmed);
        if path.is_empty() {
            return Err(SpecError::Empty);
        }
        Ok(Self::Local(PathBuf::from(path)))
    }

    /// Location of a child database named `name` under this one.
    pub fn child(&self, name: &str) -> Self {
        match self {
            Self::Memory => Self::Memory,
            Self::Local(root) => Self::Local(root.join(name)),
            Self::Remote(base) => Self::Remote(format!("{}/{}", base.trim_end_matches('/'), name)),
        }
    }

    fn open(&self) -> Result<Arc<dyn Database>> {
        Ok(match self {
            Self::Memory => Arc::new(MemoryDatabase::new()),
            Self::Local(path) => {
                ensure_directory(path)?;
                Arc::new(LocalDatabase::open(path)?)
            }
            Self::Remote(url) => Arc::new(RemoteDatabase::new(url.clone())),
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str(MEMORY_SCHEME),
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() && !path.is_dir() {
        return Err(SpecError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}

/// A location string resolved into a live database handle.
#[derive(Clone)]
pub struct DatabaseSpec {
    location: Location,
    database: Arc<dyn Database>,
}

impl DatabaseSpec {
    /// Parses `raw` and opens the database it names.
    ///
    /// # Errors
    ///
    /// Returns an error if the location is malformed or the database cannot be
    /// opened.
    pub fn for_database(raw: &str) -> Result<Self> {
        let location = Location::parse(raw)?;
        let database = location.open()?;
        Ok(Self { location, database })
    }

    /// Wraps an already-open handle.
    pub fn from_handle(location: Location, database: Arc<dyn Database>) -> Self {
        Self { location, database }
    }

    /// Where the database lives.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Shared handle to the database.
    pub fn database(&self) -> Arc<dyn Database> {
        Arc::clone(&self.database)
    }

    /// True when both specs share the same underlying handle.
    pub fn same_handle(&self, other: &DatabaseSpec) -> bool {
        Arc::ptr_eq(&self.database, &other.database)
    }
}

impl fmt::Debug for DatabaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSpec")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

type ResolveFn = dyn Fn(&str) -> Result<DatabaseSpec> + Send + Sync;

/// Lazily resolves one location string and caches the successful result.
///
/// Failed resolutions are not cached; the next call tries again.
pub struct SpecCell {
    raw: String,
    resolve: Box<ResolveFn>,
    resolved: Mutex<Option<DatabaseSpec>>,
}

impl SpecCell {
    /// Cell resolving `raw` with [`DatabaseSpec::for_database`].
    pub fn new(raw: impl Into<String>) -> Self {
        Self::with_resolver(raw, DatabaseSpec::for_database)
    }

    /// Cell resolving `raw` with a custom resolver.
    pub fn with_resolver<F>(raw: impl Into<String>, resolve: F) -> Self
    where
        F: Fn(&str) -> Result<DatabaseSpec> + Send + Sync + 'static,
    {
        Self {
            raw: raw.into(),
            resolve: Box::new(resolve),
            resolved: Mutex::new(None),
        }
    }

    /// The unresolved location string.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the cached spec, resolving it first if needed.
    pub fn get_or_resolve(&self) -> Result<DatabaseSpec> {
        let mut slot = self.resolved.lock();
        if let Some(spec) = slot.as_ref() {
            return Ok(spec.clone());
        }
        let spec = (self.resolve)(&self.raw)?;
        debug!(location = %spec.location(), "resolved database spec");
        *slot = Some(spec.clone());
        Ok(spec)
    }

    #[cfg(test)]
    pub(crate) fn is_resolved(&self) -> bool {
        self.resolved.lock().is_some()
    }
}

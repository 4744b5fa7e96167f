//! File Cache Module
//!
//! Durable JSON records, one file per key, that go stale after a fixed age.
//!
//! Every failure here is logged and reported to the caller as a miss. There is
//! no cross-process locking: two processes writing the same key may race.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::FileCacheError;

/// Age after which a record is deleted instead of served.
pub const FILE_CACHE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const RECORD_EXTENSION: &str = "json";

// == File Cache ==
/// File-backed cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    max_age: Duration,
}

impl FileCache {
    /// Creates a file cache in `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_age: FILE_CACHE_MAX_AGE,
        }
    }

    /// Overrides the staleness window.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Path of the record for `key`, or None when the key is not a safe
    /// file name.
    pub fn path_for(&self, key: &str) -> Option<PathBuf> {
        validate_key(key)
            .ok()
            .map(|key| self.dir.join(format!("{}.{}", key, RECORD_EXTENSION)))
    }

    // == Store ==
    /// Serializes `data` to `<dir>/<key>.json`.
    ///
    /// Returns whether the record was written; failures are logged.
    pub fn store<T>(&self, key: &str, data: &T) -> bool
    where
        T: Serialize + ?Sized,
    {
        match self.try_store(key, data) {
            Ok(path) => {
                debug!("Cached '{}' to {}", key, path.display());
                true
            }
            Err(err) => {
                warn!("File cache write for '{}' failed: {}", key, err);
                false
            }
        }
    }

    // == Load ==
    /// Reads the record for `key`.
    ///
    /// Returns None when the record is absent, stale (the file is deleted),
    /// unreadable or not valid JSON for `T`.
    pub fn load<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        match self.try_load(key) {
            Ok(found) => found,
            Err(err) => {
                warn!("File cache read for '{}' failed: {}", key, err);
                None
            }
        }
    }

    // == Remove ==
    /// Deletes the record for `key`. Returns whether a file was removed.
    pub fn remove(&self, key: &str) -> bool {
        let Some(path) = self.path_for(key) else {
            return false;
        };
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => {
                warn!("Failed to remove {}: {}", path.display(), err);
                false
            }
        }
    }

    fn try_store<T>(&self, key: &str, data: &T) -> Result<PathBuf, FileCacheError>
    where
        T: Serialize + ?Sized,
    {
        let key = validate_key(key)?;
        fs::create_dir_all(&self.dir).map_err(|source| FileCacheError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(format!("{}.{}", key, RECORD_EXTENSION));
        write_record(&self.dir, key, &path, data)?;
        Ok(path)
    }

    fn try_load<T>(&self, key: &str) -> Result<Option<T>, FileCacheError>
    where
        T: DeserializeOwned,
    {
        let key = validate_key(key)?;
        let path = self.dir.join(format!("{}.{}", key, RECORD_EXTENSION));

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(FileCacheError::Io { path, source }),
        };

        let modified = metadata
            .modified()
            .map_err(|source| FileCacheError::Io {
                path: path.clone(),
                source,
            })?;

        if is_stale(modified, self.max_age) {
            debug!("File cache record {} is stale, deleting", path.display());
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(FileCacheError::Io { path, source }),
            }
            return Ok(None);
        }

        let file = fs::File::open(&path).map_err(|source| FileCacheError::Io {
            path: path.clone(),
            source,
        })?;
        let data = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| FileCacheError::Json { path, source })?;
        Ok(Some(data))
    }
}

// Writes to a uniquely named temp file in `dir` and renames it over `path`,
// so readers never see a partial record and concurrent writers of one key
// never share a temp file. The temp file is deleted if anything fails.
fn write_record<T>(dir: &Path, key: &str, path: &Path, data: &T) -> Result<(), FileCacheError>
where
    T: Serialize + ?Sized,
{
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| FileCacheError::Io { path, source }
    };

    let tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", key))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io_err(dir))?;
    let tmp_path = tmp.path().to_path_buf();

    let mut writer = BufWriter::new(tmp);
    serde_json::to_writer_pretty(&mut writer, data).map_err(|source| FileCacheError::Json {
        path: tmp_path.clone(),
        source,
    })?;
    let tmp = writer
        .into_inner()
        .map_err(|err| FileCacheError::Io {
            path: tmp_path.clone(),
            source: err.into_error(),
        })?;
    tmp.as_file().sync_all().map_err(io_err(&tmp_path))?;
    tmp.persist(path).map_err(|err| FileCacheError::Io {
        path: path.to_path_buf(),
        source: err.error,
    })?;
    Ok(())
}

// == Key Helpers ==
/// Maps arbitrary text (a URL, a query) to a key accepted by [`FileCache`].
///
/// ASCII alphanumerics, `-` and `_` are kept; runs of anything else become a
/// single `_`.
pub fn file_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            key.push(ch);
        } else if !key.ends_with('_') {
            key.push('_');
        }
    }
    let key = key.trim_matches('_');
    if key.is_empty() {
        "_".to_string()
    } else {
        key.to_string()
    }
}

fn validate_key(key: &str) -> Result<&str, FileCacheError> {
    let unsafe_key = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0'])
        || key.starts_with('.');
    if unsafe_key {
        Err(FileCacheError::InvalidKey(key.to_string()))
    } else {
        Ok(key)
    }
}

// Files modified in the future count as fresh.
fn is_stale(modified: SystemTime, max_age: Duration) -> bool {
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > max_age)
        .unwrap_or(false)
}

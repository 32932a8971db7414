//! Object Storage - whole-object get/put against a bucket/key namespace
//!
//! Two backends ship with the crate:
//! - `LocalObjectStore`: buckets are directories under a root directory
//! - `MemoryObjectStore`: in-process map, used by tests and embedding callers

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

/// Bucket plus object key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub bucket: String,
    pub key: String,
}

impl Location {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Last `/`-separated segment of the key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Storage collaborator. Objects are read and written whole.
pub trait ObjectStore: Send + Sync {
    /// Open the object at `location` for reading
    fn get(&self, location: &Location) -> Result<Box<dyn Read + Send>>;

    /// Create or replace the object at `location`
    fn put(&self, location: &Location, bytes: &[u8]) -> Result<()>;

    /// Upload a local file
    fn put_file(&self, location: &Location, path: &Path) -> Result<()> {
        let bytes = fs::read(path).map_err(|e| {
            PipelineError::Transfer(format!("Failed to read {}: {}", path.display(), e))
        })?;
        self.put(location, &bytes)
    }

    /// Read the whole object into memory
    fn get_bytes(&self, location: &Location) -> Result<Vec<u8>> {
        let mut reader = self.get(location)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|e| {
            PipelineError::Transfer(format!("Failed to read {}: {}", location, e))
        })?;
        Ok(bytes)
    }
}

/// Filesystem-backed store: `<root>/<bucket>/<key>`
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, location: &Location) -> Result<PathBuf> {
        let relative = Path::new(&location.bucket).join(&location.key);
        let escapes = location.bucket.is_empty()
            || location.key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(PipelineError::Transfer(format!("Invalid object location: {}", location)));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalObjectStore {
    fn get(&self, location: &Location) -> Result<Box<dyn Read + Send>> {
        let path = self.object_path(location)?;
        debug!("Opening object {} at {}", location, path.display());
        let file = fs::File::open(&path)
            .map_err(|e| PipelineError::Transfer(format!("Failed to get {}: {}", location, e)))?;
        Ok(Box::new(file))
    }

    fn put(&self, location: &Location, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(location)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PipelineError::Transfer(format!("Failed to put {}: {}", location, e))
            })?;
        }
        fs::write(&path, bytes)
            .map_err(|e| PipelineError::Transfer(format!("Failed to put {}: {}", location, e)))?;
        info!("Uploaded {} bytes to {}", bytes.len(), location);
        Ok(())
    }
}

/// In-memory store. Counts `get` calls so callers can observe fetches.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<Location, Vec<u8>>>,
    gets: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls served so far
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.objects
            .lock()
            .map(|objects| objects.contains_key(location))
            .unwrap_or(false)
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get(&self, location: &Location) -> Result<Box<dyn Read + Send>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let objects = self
            .objects
            .lock()
            .map_err(|_| PipelineError::Transfer("object map lock poisoned".to_string()))?;
        let bytes = objects
            .get(location)
            .cloned()
            .ok_or_else(|| PipelineError::Transfer(format!("No such object: {}", location)))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn put(&self, location: &Location, bytes: &[u8]) -> Result<()> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| PipelineError::Transfer("object map lock poisoned".to_string()))?;
        objects.insert(location.clone(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_location_display_and_file_name() {
        let location = Location::new("sales", "databases/tlq.db");
        assert_eq!(location.to_string(), "s3://sales/databases/tlq.db");
        assert_eq!(location.file_name(), "tlq.db");
        assert_eq!(Location::new("b", "flat.csv").file_name(), "flat.csv");
    }

    #[test]
    fn test_local_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());
        let location = Location::new("bucket", "nested/dir/data.csv");

        store.put(&location, b"a,b\n1,2\n").unwrap();
        assert_eq!(store.get_bytes(&location).unwrap(), b"a,b\n1,2\n");
    }

    #[test]
    fn test_local_store_missing_object_is_transfer_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());
        let err = store.get_bytes(&Location::new("bucket", "missing.csv")).err().unwrap();
        assert!(matches!(err, PipelineError::Transfer(_)));
    }

    #[test]
    fn test_local_store_rejects_escaping_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());
        assert!(store.put(&Location::new("bucket", "../outside"), b"x").is_err());
        assert!(store.put(&Location::new("bucket", "/etc/passwd"), b"x").is_err());
    }

    #[test]
    fn test_memory_store_counts_gets() {
        let store = MemoryObjectStore::new();
        let location = Location::new("b", "k");
        store.put(&location, b"data").unwrap();

        assert_eq!(store.get_bytes(&location).unwrap(), b"data");
        assert!(store.get_bytes(&Location::new("b", "other")).is_err());
        assert_eq!(store.get_count(), 2);
    }
}

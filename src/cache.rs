//! Materialization Cache
//!
//! Makes a remote object available as a local file under the scratch root and
//! keeps reusing it for as long as the process (and its scratch directory)
//! lives. A handle is warm when a non-empty file exists at its deterministic
//! path `<scratch>/<last key segment>`; anything else is a miss and is fetched
//! from the object store. There is no invalidation: a stale non-empty file is
//! always preferred over a new fetch.

use crate::error::{PipelineError, Result};
use crate::storage::{Location, ObjectStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Served from an existing local file
    Warm,
    /// Fetched from the object store
    Cold,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialization {
    pub path: PathBuf,
    pub state: CacheState,
    pub size_bytes: u64,
}

pub struct MaterializationCache {
    store: Arc<dyn ObjectStore>,
    scratch_dir: PathBuf,
    handles: Mutex<HashMap<Location, PathBuf>>,
}

impl MaterializationCache {
    pub fn new(store: Arc<dyn ObjectStore>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            scratch_dir: scratch_dir.into(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Deterministic local path for `location`
    pub fn local_path(&self, location: &Location) -> Result<PathBuf> {
        let name = location.file_name();
        if name.is_empty() || name == "." || name == ".." {
            return Err(PipelineError::Transfer(format!(
                "Cannot derive a local file name from {}",
                location
            )));
        }
        Ok(self.scratch_dir.join(name))
    }

    /// Return a local handle for `location`, fetching it only on a miss.
    ///
    /// The handle map stays locked for the whole call, so two callers in this
    /// process never fetch the same object concurrently.
    pub fn materialize(&self, location: &Location) -> Result<Materialization> {
        let path = self.local_path(location)?;
        let mut handles = self
            .handles
            .lock()
            .map_err(|_| PipelineError::Transfer("cache handle map lock poisoned".to_string()))?;

        if let Some(known) = handles.get(location) {
            if let Some(size_bytes) = non_empty_size(known) {
                debug!("Reusing handle {} for {}", known.display(), location);
                return Ok(Materialization {
                    path: known.clone(),
                    state: CacheState::Warm,
                    size_bytes,
                });
            }
        }

        if let Some(size_bytes) = non_empty_size(&path) {
            info!("Using cached database from {} (warm infrastructure)", path.display());
            info!("Database size: {} bytes", size_bytes);
            handles.insert(location.clone(), path.clone());
            return Ok(Materialization {
                path,
                state: CacheState::Warm,
                size_bytes,
            });
        }

        info!("Cache miss - downloading {} (cold infrastructure)", location);
        let size_bytes = self.fetch(location, &path)?;
        info!("Downloaded {} bytes to {}", size_bytes, path.display());
        handles.insert(location.clone(), path.clone());

        Ok(Materialization {
            path,
            state: CacheState::Cold,
            size_bytes,
        })
    }

    /// Whether `location` currently has a warm handle
    pub fn is_warm(&self, location: &Location) -> bool {
        self.local_path(location)
            .map(|path| non_empty_size(&path).is_some())
            .unwrap_or(false)
    }

    fn fetch(&self, location: &Location, path: &Path) -> Result<u64> {
        fs::create_dir_all(&self.scratch_dir).map_err(|e| {
            PipelineError::Transfer(format!(
                "Failed to create scratch directory {}: {}",
                self.scratch_dir.display(),
                e
            ))
        })?;

        // Written beside the final path and renamed, so an interrupted transfer
        // never leaves a partial file that would later count as warm.
        let mut partial = path.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        let result = self.copy_to(location, &partial).and_then(|bytes| {
            fs::rename(&partial, path).map_err(|e| {
                PipelineError::Transfer(format!("Failed to move {} into place: {}", location, e))
            })?;
            Ok(bytes)
        });

        if result.is_err() {
            if let Err(e) = fs::remove_file(&partial) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove partial download {}: {}", partial.display(), e);
                }
            }
        }
        result
    }

    fn copy_to(&self, location: &Location, target: &Path) -> Result<u64> {
        let mut reader = self.store.get(location)?;
        let mut file = fs::File::create(target).map_err(|e| {
            PipelineError::Transfer(format!("Failed to create {}: {}", target.display(), e))
        })?;
        io::copy(&mut reader, &mut file)
            .map_err(|e| PipelineError::Transfer(format!("Failed to download {}: {}", location, e)))
    }
}

fn non_empty_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file() && meta.len() > 0)
        .map(|meta| meta.len())
}

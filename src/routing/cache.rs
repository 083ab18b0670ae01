//! File-backed cache for discovery results (compiled routes, subscriber names).

use crate::config::AppMode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct DiscoveryCache {
    path: PathBuf,
    mode: AppMode,
}

impl DiscoveryCache {
    pub fn new(path: impl Into<PathBuf>, mode: AppMode) -> Self {
        DiscoveryCache {
            path: path.into(),
            mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// In production an existing artifact is returned as-is. Otherwise (development mode, a
    /// missing file, or an unreadable one) `build` runs and its result is written back. Cache
    /// I/O failures are logged, never fatal.
    pub fn load_or_build<T, E, F>(&self, build: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
    {
        if self.mode.is_production() {
            if let Some(cached) = self.load() {
                tracing::debug!(path = %self.path.display(), "using cached discovery artifact");
                return Ok(cached);
            }
        }
        let built = build()?;
        self.store(&built);
        Ok(built)
    }

    fn load<T: DeserializeOwned>(&self) -> Option<T> {
        let bytes = std::fs::read(&self.path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable cache artifact");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, value: &T) {
        let result = (|| -> std::io::Result<()> {
            if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            let bytes = serde_json::to_vec_pretty(value)?;
            std::fs::write(&self.path, bytes)
        })();
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "could not write cache artifact");
        }
    }
}

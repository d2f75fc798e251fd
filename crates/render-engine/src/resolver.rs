//! Clip reference resolution.
//!
//! Clip references may point at files that were since moved between storage
//! tiers (managed storage, documents, caches, temp). Resolution first tries
//! the reference as a direct path, then looks the file name up in each
//! candidate directory in order. Only existence checks are performed.

use std::path::{Path, PathBuf};

use slotreel_common::config::StorageConfig;
use slotreel_project_model::source_path;

use crate::media::LocalMediaHandle;

/// Failure to find a readable file for a reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("No local file found for {source_ref}")]
    NotFound { source_ref: String },
}

/// Maps clip references to local media handles.
#[derive(Debug, Clone, Default)]
pub struct AssetResolver {
    search_dirs: Vec<PathBuf>,
}

impl AssetResolver {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    pub fn from_storage(storage: &StorageConfig) -> Self {
        Self::new(storage.search_dirs())
    }

    /// Search `dir` before every configured directory.
    pub fn with_leading_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.insert(0, dir.into());
        self
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Resolve a path, `file://` URI, or bare file name to an existing file.
    pub fn resolve(&self, source_ref: &str) -> Result<LocalMediaHandle, ResolveError> {
        let not_found = || ResolveError::NotFound {
            source_ref: source_ref.to_string(),
        };

        let path = source_path(source_ref).ok_or_else(not_found)?;

        if path.is_absolute() && path.is_file() {
            return Ok(LocalMediaHandle::new(path));
        }

        let file_name = path.file_name().map(Path::new);
        for dir in &self.search_dirs {
            if path.is_relative() {
                let candidate = dir.join(&path);
                if candidate.is_file() {
                    return Ok(LocalMediaHandle::new(candidate));
                }
            }
            if let Some(name) = file_name {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    tracing::debug!(
                        source_ref,
                        resolved = %candidate.display(),
                        "Resolved clip by file name"
                    );
                    return Ok(LocalMediaHandle::new(candidate));
                }
            }
        }

        Err(not_found())
    }
}

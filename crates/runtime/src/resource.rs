//! The fetch primitive behind document loading.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("I/O error loading '{uri}': {message}")]
    Io { uri: String, message: String },
}

/// Loads raw bytes for a URI. Providers are shared across transformations
/// and must be thread-safe.
pub trait ResourceProvider: Send + Sync {
    fn load(&self, uri: &str) -> Result<Vec<u8>, ResourceError>;
}

/// A provider backed by an in-memory map; the workhorse for tests and
/// embedders that pre-stage documents.
#[derive(Debug, Default)]
pub struct InMemoryResourceProvider {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, uri: impl Into<String>, bytes: Vec<u8>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(uri.into(), bytes);
        }
    }

    pub fn add_str(&self, uri: impl Into<String>, content: &str) {
        self.add(uri, content.as_bytes().to_vec());
    }
}

impl ResourceProvider for InMemoryResourceProvider {
    fn load(&self, uri: &str) -> Result<Vec<u8>, ResourceError> {
        self.files
            .read()
            .ok()
            .and_then(|files| files.get(uri).cloned())
            .ok_or_else(|| ResourceError::NotFound(uri.to_string()))
    }
}

/// A provider reading from the filesystem, with `file://` URIs accepted.
#[derive(Debug)]
pub struct FileResourceProvider {
    base: Option<PathBuf>,
}

impl FileResourceProvider {
    pub fn new() -> Self {
        Self { base: None }
    }

    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }
}

impl Default for FileResourceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProvider for FileResourceProvider {
    fn load(&self, uri: &str) -> Result<Vec<u8>, ResourceError> {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        let full = match &self.base {
            Some(base) => base.join(path.trim_start_matches('/')),
            None => PathBuf::from(path),
        };
        std::fs::read(&full).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ResourceError::NotFound(uri.to_string())
            } else {
                ResourceError::Io {
                    uri: uri.to_string(),
                    message: e.to_string(),
                }
            }
        })
    }
}

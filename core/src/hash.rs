use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use url::Url;

use crate::crypto::sha256_source;
use crate::error::{Error, Result};

/// Destination for CSP hash sources collected while a response is built.
pub trait HashSink: Send + Sync {
    fn store_hash(&self, hash: &str);
}

/// Derives a CSP hash source from an asset locator.
///
/// `Ok(None)` means no hash can be derived (unknown or foreign resource),
/// which callers treat as "skip", not as a failure.
pub trait LocatorHasher: Send + Sync {
    fn hash_from_locator(&self, locator: &str) -> Result<Option<String>>;
}

/// Request-scoped, deduplicating collection of hash sources, consumed when
/// the `Content-Security-Policy` header is assembled.
#[derive(Debug, Default)]
pub struct HashStore {
    hashes: Mutex<BTreeSet<String>>,
}

impl HashStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored hashes in stable (sorted) order.
    pub fn hashes(&self) -> Vec<String> {
        self.hashes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl HashSink for HashStore {
    fn store_hash(&self, hash: &str) {
        self.hashes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash.to_string());
    }
}

/// Hashes static files served from a local asset root.
///
/// Locators are paths relative to the root (`/js/app.js`, `js/app.js?v=3`) or
/// absolute URLs on the configured origin. Anything else (other hosts,
/// protocol-relative URLs, `..` segments, missing files) yields no hash.
/// Digests are cached per locator for the lifetime of the hasher.
#[derive(Debug)]
pub struct FileHasher {
    root: PathBuf,
    origin: Option<Url>,
    cache: Mutex<HashMap<String, String>>,
}

impl FileHasher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            origin: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Treat absolute URLs on `origin` as local files.
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = Some(origin);
        self
    }

    fn resolve(&self, locator: &str) -> Option<PathBuf> {
        if locator.starts_with("//") {
            return None;
        }

        let locator = locator.split(['?', '#']).next().unwrap_or_default();
        let relative = if locator.contains("://") {
            let url = Url::parse(locator).ok()?;
            let origin = self.origin.as_ref()?;
            if url.origin() != origin.origin() {
                return None;
            }
            url.path().to_string()
        } else {
            locator.to_string()
        };

        let mut path = self.root.clone();
        let mut has_segment = false;
        for component in Path::new(relative.trim_start_matches('/')).components() {
            match component {
                Component::Normal(segment) => {
                    path.push(segment);
                    has_segment = true;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        has_segment.then_some(path)
    }
}

impl LocatorHasher for FileHasher {
    fn hash_from_locator(&self, locator: &str) -> Result<Option<String>> {
        if let Some(hash) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(locator)
        {
            return Ok(Some(hash.clone()));
        }

        let Some(path) = self.resolve(locator) else {
            tracing::debug!(locator, "asset locator is not a local file, no hash derived");
            return Ok(None);
        };

        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(locator, path = %path.display(), "asset file not found, no hash derived");
                return Ok(None);
            }
            Err(source) => {
                return Err(Error::HashRead {
                    locator: locator.to_string(),
                    path,
                    source,
                });
            }
        };

        let hash = sha256_source(&content);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(locator.to_string(), hash.clone());
        Ok(Some(hash))
    }
}

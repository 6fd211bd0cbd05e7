use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::AppError;

const CACHE_FILE_EXTENSION: &str = "json";

/// Content-addressed cache mapping a stable identifier string (source URL
/// or file path) to a previously computed payload, one file per key under
/// the cache root.
///
/// All I/O is synchronous and unlocked: each key is expected to be
/// populated once per process lifetime, and concurrent writers to the same
/// key race last-write-wins. A corrupt cache entry is an error for the
/// caller, never a silent miss.
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic file path for a key: sha256 hex digest of the key
    /// string, so the same URL or path always maps to the same file.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.root
            .join(format!("{:x}.{CACHE_FILE_EXTENSION}", hasher.finalize()))
    }

    /// Load the payload cached for `key`. Returns `Ok(None)` when no entry
    /// exists; read or deserialization failures propagate.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read(&path)?;
        let payload = serde_json::from_slice(&raw)?;
        info!(%key, "loaded payload from cache");
        Ok(Some(payload))
    }

    /// Serialize and store a payload for `key`, creating the cache root if
    /// missing and overwriting any previous entry.
    pub fn save<T: Serialize>(&self, key: &str, payload: &T) -> Result<(), AppError> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);
        fs::write(&path, serde_json::to_vec(payload)?)?;
        debug!(%key, path = %path.display(), "saved payload to cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::document::Document;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn test_path_for_is_deterministic_and_collision_free() {
        let dir = tempdir().expect("tempdir");
        let cache = ContentCache::new(dir.path());

        let url = "https://www.youtube.com/watch?v=B57wephix-w";
        assert_eq!(cache.path_for(url), cache.path_for(url));
        assert_ne!(cache.path_for(url), cache.path_for("data/report_2023.pdf"));

        // Same key, fresh instance over the same root: same path.
        let second = ContentCache::new(dir.path());
        assert_eq!(cache.path_for(url), second.path_for(url));

        let name = cache
            .path_for(url)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        assert_eq!(name.len(), 64 + ".json".len());
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn test_round_trip_nested_payload() {
        let dir = tempdir().expect("tempdir");
        let cache = ContentCache::new(dir.path());

        let docs = vec![
            Document::new("First page text")
                .with_meta("source", "report_2023.pdf")
                .with_meta("year", 2023),
            Document::new("Second page text").with_meta("title", "Results_2023"),
        ];

        cache.save("report_2023.pdf", &docs).expect("save");
        let loaded: Option<Vec<Document>> = cache.load("report_2023.pdf").expect("load");
        assert_eq!(loaded, Some(docs));

        let mut nested = BTreeMap::new();
        nested.insert("descriptions".to_owned(), vec!["a table".to_owned()]);
        cache.save("extracted", &nested).expect("save nested");
        let loaded: Option<BTreeMap<String, Vec<String>>> =
            cache.load("extracted").expect("load nested");
        assert_eq!(loaded, Some(nested));
    }

    #[test]
    fn test_missing_entry_is_absent_not_error() {
        let dir = tempdir().expect("tempdir");
        let cache = ContentCache::new(dir.path().join("never_created"));

        let loaded: Option<Vec<Document>> = cache.load("unknown").expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_corrupt_entry_propagates_error() {
        let dir = tempdir().expect("tempdir");
        let cache = ContentCache::new(dir.path());

        cache.save("key", &vec!["ok".to_owned()]).expect("save");
        std::fs::write(cache.path_for("key"), b"{not valid json").expect("corrupt file");

        let result: Result<Option<Vec<String>>, _> = cache.load("key");
        assert!(result.is_err());
    }

    #[test]
    fn test_save_overwrites_existing_entry() {
        let dir = tempdir().expect("tempdir");
        let cache = ContentCache::new(dir.path());

        cache.save("key", &vec![1, 2, 3]).expect("first save");
        cache.save("key", &vec![4, 5]).expect("second save");

        let loaded: Option<Vec<i32>> = cache.load("key").expect("load");
        assert_eq!(loaded, Some(vec![4, 5]));
    }

    #[test]
    fn test_save_creates_root_lazily() {
        let dir = tempdir().expect("tempdir");
        let root = dir.path().join("cache").join("deep");
        let cache = ContentCache::new(&root);
        assert!(!root.exists());

        cache.save("key", &"payload").expect("save");
        assert!(root.exists());

        let loaded: Option<String> = cache.load("key").expect("load");
        assert_eq!(loaded, Some("payload".to_owned()));
    }
}

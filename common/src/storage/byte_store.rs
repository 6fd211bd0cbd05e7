use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{error::AppError, storage::db::SurrealDbClient};

pub const BYTE_STORE_TABLE: &str = "bytestore";

/// One persisted row of the byte store. The record id is
/// `<collection>:<key>`, which makes every write an upsert on the
/// composite primary key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ByteStoreRecord {
    pub collection: String,
    pub key: String,
    pub value: Vec<u8>,
    pub value_hash: String,
    pub filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct BatchItem {
    id: String,
    record: ByteStoreRecord,
}

/// Recursively rebuild a JSON value with mapping keys sorted and sequence
/// order preserved, so semantically equal values serialize and hash
/// identically regardless of insertion order.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = serde_json::Map::new();
            for (key, inner) in entries {
                sorted.insert(key, canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Projection of a value onto the text that gets hashed: a mapping yields
/// its `page_content` field (empty when absent), a bare string yields
/// itself, anything else falls back to its canonical JSON text.
pub fn hashable_content(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .get("page_content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Durable key-value store over opaque serialized values, partitioned by
/// collection name. All canonicalization, hashing and upsert logic lives
/// here once; the blocking surface below delegates into this type.
///
/// Every method runs as its own short-lived query or transaction. Nothing
/// is held across calls, so concurrent writers to different keys never
/// block each other and same-key writers race last-committed-wins.
#[derive(Clone)]
pub struct DocStore {
    db: Arc<SurrealDbClient>,
    collection: String,
}

impl DocStore {
    pub fn new(db: Arc<SurrealDbClient>, collection: impl Into<String>) -> Self {
        Self {
            db,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn record_id(&self, key: &str) -> String {
        format!("{}:{}", self.collection, key)
    }

    fn build_record<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        filename: Option<String>,
    ) -> Result<ByteStoreRecord, AppError> {
        let canonical = canonicalize(serde_json::to_value(value)?);
        let value_hash = compute_hash(&hashable_content(&canonical));
        let now = Utc::now();
        Ok(ByteStoreRecord {
            collection: self.collection.clone(),
            key: key.to_owned(),
            value: serde_json::to_vec(&canonical)?,
            value_hash,
            filename,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let record: Option<ByteStoreRecord> = self
            .db
            .select((BYTE_STORE_TABLE, self.record_id(key).as_str()))
            .await?;

        match record {
            Some(record) => Ok(Some(serde_json::from_slice(&record.value)?)),
            None => Ok(None),
        }
    }

    /// Batch get. The result is aligned to the input order, with `None`
    /// exactly at the positions of absent keys.
    pub async fn mget<T: DeserializeOwned>(
        &self,
        keys: &[String],
    ) -> Result<Vec<Option<T>>, AppError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<ByteStoreRecord> = self
            .db
            .query(format!(
                "SELECT * FROM {BYTE_STORE_TABLE} WHERE collection = $collection AND key IN $keys"
            ))
            .bind(("collection", self.collection.clone()))
            .bind(("keys", keys.to_vec()))
            .await?
            .take(0)?;

        let by_key: HashMap<String, Vec<u8>> = rows
            .into_iter()
            .map(|record| (record.key, record.value))
            .collect();

        keys.iter()
            .map(|key| match by_key.get(key) {
                Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
                None => Ok(None),
            })
            .collect()
    }

    /// Upsert a single value. The stored record carries a content hash for
    /// downstream change detection; the hash is never consulted here to
    /// skip a write.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        filename: Option<String>,
    ) -> Result<(), AppError> {
        let record = self.build_record(key, value, filename)?;
        let _upserted: Option<ByteStoreRecord> = self
            .db
            .upsert((BYTE_STORE_TABLE, self.record_id(key).as_str()))
            .content(record)
            .await?;

        debug!(collection = %self.collection, %key, "stored byte store record");
        Ok(())
    }

    /// Batch upsert inside a single transaction: either every item commits
    /// or the caller sees an error and no partial state.
    pub async fn mset<T: Serialize>(
        &self,
        items: Vec<(String, T, Option<String>)>,
    ) -> Result<(), AppError> {
        if items.is_empty() {
            return Ok(());
        }

        let batch: Vec<BatchItem> = items
            .iter()
            .map(|(key, value, filename)| {
                Ok(BatchItem {
                    id: self.record_id(key),
                    record: self.build_record(key, value, filename.clone())?,
                })
            })
            .collect::<Result<_, AppError>>()?;
        let count = batch.len();

        self.db
            .query(format!(
                "BEGIN TRANSACTION; \
                 FOR $item IN $items {{ UPSERT type::thing('{BYTE_STORE_TABLE}', $item.id) CONTENT $item.record; }}; \
                 COMMIT TRANSACTION;"
            ))
            .bind(("items", batch))
            .await?
            .check()?;

        debug!(collection = %self.collection, count, "stored byte store batch");
        Ok(())
    }

    /// Delete the given keys. Deleting absent keys is not an error.
    pub async fn mdelete(&self, keys: &[String]) -> Result<(), AppError> {
        if keys.is_empty() {
            return Ok(());
        }

        self.db
            .query(format!(
                "DELETE {BYTE_STORE_TABLE} WHERE collection = $collection AND key IN $keys"
            ))
            .bind(("collection", self.collection.clone()))
            .bind(("keys", keys.to_vec()))
            .await?
            .check()?;

        Ok(())
    }

    /// Enumerate the collection's keys, optionally restricted to a prefix.
    /// Re-invocable; ordering follows whatever the storage returns.
    pub async fn yield_keys(
        &self,
        prefix: Option<&str>,
    ) -> Result<impl Iterator<Item = String>, AppError> {
        let keys: Vec<String> = self
            .db
            .query(format!(
                "SELECT VALUE key FROM {BYTE_STORE_TABLE} WHERE collection = $collection"
            ))
            .bind(("collection", self.collection.clone()))
            .await?
            .take(0)?;

        let prefix = prefix.map(str::to_owned);
        Ok(keys
            .into_iter()
            .filter(move |key| prefix.as_deref().map_or(true, |p| key.starts_with(p))))
    }
}

/// Blocking entry point over the same store. Owns a dedicated
/// current-thread runtime and delegates every call to the async core, so
/// the two surfaces cannot drift apart semantically.
pub struct BlockingDocStore {
    inner: DocStore,
    runtime: tokio::runtime::Runtime,
}

impl BlockingDocStore {
    pub fn connect(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
        collection: impl Into<String>,
    ) -> Result<Self, AppError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let db = runtime.block_on(SurrealDbClient::new(
            address, username, password, namespace, database,
        ))?;

        Ok(Self {
            inner: DocStore::new(Arc::new(db), collection),
            runtime,
        })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        self.runtime.block_on(self.inner.get(key))
    }

    pub fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Result<Vec<Option<T>>, AppError> {
        self.runtime.block_on(self.inner.mget(keys))
    }

    pub fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        filename: Option<String>,
    ) -> Result<(), AppError> {
        self.runtime.block_on(self.inner.set(key, value, filename))
    }

    pub fn mset<T: Serialize>(
        &self,
        items: Vec<(String, T, Option<String>)>,
    ) -> Result<(), AppError> {
        self.runtime.block_on(self.inner.mset(items))
    }

    pub fn mdelete(&self, keys: &[String]) -> Result<(), AppError> {
        self.runtime.block_on(self.inner.mdelete(keys))
    }

    pub fn yield_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, AppError> {
        let keys = self.runtime.block_on(self.inner.yield_keys(prefix))?;
        Ok(keys.collect())
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl BlockingDocStore {
    /// In-memory store for tests exercising the blocking surface.
    pub fn memory(
        namespace: &str,
        database: &str,
        collection: impl Into<String>,
    ) -> Result<Self, AppError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let db = runtime.block_on(SurrealDbClient::memory(namespace, database))?;

        Ok(Self {
            inner: DocStore::new(Arc::new(db), collection),
            runtime,
        })
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::debug;
use uuid::Uuid;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::document::Document},
    utils::embedding::EmbeddingProvider,
};

pub const CHUNK_TABLE: &str = "doc_chunk";
const KNN_EF: usize = 40;

/// Similarity-search collaborator boundary. The retriever composition only
/// needs to add chunk documents and run a ranked search over them; the
/// embedding model and index type stay behind this trait.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn add_documents(&self, documents: &[Document]) -> Result<(), AppError>;

    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Document>, AppError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ChunkRecord {
    content: String,
    metadata: BTreeMap<String, Value>,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct SearchRow {
    content: String,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
    distance: f64,
}

/// SurrealDB-backed vector index over chunk embeddings, searched through
/// the HNSW KNN operator.
pub struct SurrealVectorIndex {
    db: Arc<SurrealDbClient>,
    embeddings: Arc<EmbeddingProvider>,
}

impl SurrealVectorIndex {
    pub async fn new(
        db: Arc<SurrealDbClient>,
        embeddings: Arc<EmbeddingProvider>,
    ) -> Result<Self, AppError> {
        let index = Self { db, embeddings };
        index.ensure_index().await?;
        Ok(index)
    }

    /// The HNSW index dimension must match the embedding provider, so it is
    /// defined here rather than with the static schema.
    async fn ensure_index(&self) -> Result<(), AppError> {
        let dimension = self.embeddings.dimension();
        self.db
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_embedding_doc_chunk ON {CHUNK_TABLE} FIELDS embedding HNSW DIMENSION {dimension}"
            ))
            .await?
            .check()?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SurrealVectorIndex {
    async fn add_documents(&self, documents: &[Document]) -> Result<(), AppError> {
        for document in documents {
            let retry_strategy = ExponentialBackoff::from_millis(100).map(jitter).take(3);
            let embedding = Retry::spawn(retry_strategy, || {
                self.embeddings.embed(&document.page_content)
            })
            .await?;

            let record = ChunkRecord {
                content: document.page_content.clone(),
                metadata: document.metadata.clone(),
                embedding,
            };
            let _created: Option<ChunkRecord> = self
                .db
                .create((CHUNK_TABLE, Uuid::new_v4().to_string().as_str()))
                .content(record)
                .await?;
        }

        debug!(count = documents.len(), "added chunks to vector index");
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Document>, AppError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embeddings.embed(query).await?;

        let rows: Vec<SearchRow> = self
            .db
            .query(format!(
                "SELECT content, metadata, vector::distance::knn() AS distance FROM {CHUNK_TABLE} \
                 WHERE embedding <|{top_k},{KNN_EF}|> $embedding ORDER BY distance"
            ))
            .bind(("embedding", embedding))
            .await?
            .take(0)?;

        if let Some(best) = rows.first() {
            debug!(
                results = rows.len(),
                best_distance = best.distance,
                "vector search complete"
            );
        }

        Ok(rows
            .into_iter()
            .map(|row| Document {
                page_content: row.content,
                metadata: row.metadata,
            })
            .collect())
    }
}

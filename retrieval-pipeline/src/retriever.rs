use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use common::{
    error::AppError,
    storage::{
        byte_store::DocStore,
        types::document::{ParentPayload, ID_KEY},
    },
};

use crate::vector_index::VectorIndex;

/// Multi-vector composition: similarity search runs over chunk embeddings,
/// and the hits resolve through the shared parent-id metadata key to full
/// parent payloads in the byte store. Callers always receive whole
/// documents or raw images, never chunk fragments.
pub struct MultiVectorRetriever {
    vectorstore: Arc<dyn VectorIndex>,
    docstore: DocStore,
    id_key: String,
    top_k: usize,
}

impl MultiVectorRetriever {
    pub fn new(vectorstore: Arc<dyn VectorIndex>, docstore: DocStore, top_k: usize) -> Self {
        Self {
            vectorstore,
            docstore,
            id_key: ID_KEY.to_owned(),
            top_k,
        }
    }

    pub fn with_id_key(mut self, id_key: impl Into<String>) -> Self {
        self.id_key = id_key.into();
        self
    }

    pub fn vectorstore(&self) -> &Arc<dyn VectorIndex> {
        &self.vectorstore
    }

    pub fn docstore(&self) -> &DocStore {
        &self.docstore
    }

    pub fn id_key(&self) -> &str {
        &self.id_key
    }

    #[instrument(skip_all, fields(top_k = self.top_k))]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ParentPayload>, AppError> {
        let chunks = self
            .vectorstore
            .similarity_search(query, self.top_k)
            .await?;

        // Distinct parent ids, order of first appearance. Chunks without
        // the id key cannot be resolved and are skipped.
        let mut seen = HashSet::new();
        let mut parent_ids = Vec::new();
        for chunk in &chunks {
            if let Some(id) = chunk.meta_str(&self.id_key) {
                if seen.insert(id.to_owned()) {
                    parent_ids.push(id.to_owned());
                }
            }
        }

        debug!(
            chunk_hits = chunks.len(),
            parents = parent_ids.len(),
            "resolved similarity hits to parent ids"
        );

        let parents = self.docstore.mget::<ParentPayload>(&parent_ids).await?;
        Ok(parents.into_iter().flatten().collect())
    }
}

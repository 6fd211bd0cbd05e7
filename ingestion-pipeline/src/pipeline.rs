use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use common::{
    error::AppError,
    storage::{
        byte_store::DocStore,
        types::document::{Document, ParentPayload, ID_KEY},
    },
    utils::cache::ContentCache,
};
use retrieval_pipeline::vector_index::VectorIndex;

use crate::{
    chunker::TextChunker,
    descriptions::{generate_descriptions, ImageDescriber},
};

/// Ingestion side of the multi-vector composition: every parent document
/// gets a freshly minted id shared between its chunks in the vector index
/// and its full payload in the byte store.
pub struct IngestionPipeline {
    vectorstore: Arc<dyn VectorIndex>,
    docstore: DocStore,
    chunker: TextChunker,
}

impl IngestionPipeline {
    pub fn new(
        vectorstore: Arc<dyn VectorIndex>,
        docstore: DocStore,
        chunker: TextChunker,
    ) -> Self {
        Self {
            vectorstore,
            docstore,
            chunker,
        }
    }

    /// Split documents into tagged chunks, index the chunks, and store
    /// each full parent under its id. Returns the minted ids.
    pub async fn process_documents(
        &self,
        documents: Vec<Document>,
    ) -> Result<Vec<String>, AppError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = documents.len(), "processing documents");

        let doc_ids: Vec<String> = documents
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect();

        let chunks = self.chunker.split(&documents, &doc_ids)?;
        info!(chunks = chunks.len(), "adding chunks to vector index");
        self.vectorstore.add_documents(&chunks).await?;

        info!("updating document store");
        let items = doc_ids
            .iter()
            .cloned()
            .zip(documents)
            .map(|(doc_id, document)| {
                let filename = document
                    .meta_str("source")
                    .unwrap_or("unknown_file")
                    .to_owned();
                (doc_id, ParentPayload::Document(document), Some(filename))
            })
            .collect();
        self.docstore.mset(items).await?;

        info!("document processing completed");
        Ok(doc_ids)
    }

    /// Describe every extracted image, index each description as a
    /// chunk-equivalent entry, and store the raw image bytes under the same
    /// id so a semantic match on the description resolves to the original.
    pub async fn process_images(
        &self,
        extracted_dir: &Path,
        cache: &ContentCache,
        describer: &dyn ImageDescriber,
        delay: Duration,
    ) -> Result<Vec<String>, AppError> {
        let (encoded_images, descriptions) =
            generate_descriptions(extracted_dir, cache, describer, delay).await?;
        if encoded_images.is_empty() {
            info!("no extracted images to process");
            return Ok(Vec::new());
        }
        info!(count = encoded_images.len(), "processing images");

        let img_ids: Vec<String> = encoded_images
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect();

        let summaries: Vec<Document> = img_ids
            .iter()
            .zip(&descriptions)
            .map(|(img_id, description)| {
                Document::new(description.as_str()).with_meta(ID_KEY, img_id.as_str())
            })
            .collect();
        info!("adding image summaries to vector index");
        self.vectorstore.add_documents(&summaries).await?;

        info!("adding images to document store");
        let items = img_ids
            .iter()
            .cloned()
            .zip(encoded_images)
            .map(|(img_id, (image_path, encoded))| {
                (img_id, ParentPayload::Image(encoded), Some(image_path))
            })
            .collect();
        self.docstore.mset(items).await?;

        info!("image processing completed");
        Ok(img_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use common::{
        storage::db::SurrealDbClient, utils::embedding::EmbeddingProvider,
    };
    use retrieval_pipeline::{retriever::MultiVectorRetriever, vector_index::SurrealVectorIndex};
    use tempfile::tempdir;

    struct StubDescriber;

    #[async_trait]
    impl crate::descriptions::ImageDescriber for StubDescriber {
        async fn describe(&self, _base64_image: &str) -> Result<String, AppError> {
            Ok("Table of quarterly revenue split by region and powertrain".to_owned())
        }
    }

    async fn setup() -> (IngestionPipeline, MultiVectorRetriever) {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = Arc::new(
            SurrealDbClient::memory(namespace, database)
                .await
                .expect("Failed to start in-memory surrealdb"),
        );
        db.ensure_initialized()
            .await
            .expect("Failed to initialize schema");

        let embeddings = Arc::new(EmbeddingProvider::new_hashed(64));
        let index = Arc::new(
            SurrealVectorIndex::new(Arc::clone(&db), embeddings)
                .await
                .expect("Failed to create vector index"),
        );
        let docstore = DocStore::new(db, "corpus");
        let chunker = TextChunker::new(500, 50).expect("chunker");

        let pipeline = IngestionPipeline::new(
            Arc::clone(&index) as Arc<dyn VectorIndex>,
            docstore.clone(),
            chunker,
        );
        let retriever = MultiVectorRetriever::new(index, docstore, 4);
        (pipeline, retriever)
    }

    fn three_page_report() -> Document {
        let page_one = "Overview of the fiscal year with commercial performance highlights. "
            .repeat(10);
        let page_two = "The group achieved an operating margin of seven point six percent, \
                        driven by pricing discipline and the success of hybrid launches. "
            .repeat(8);
        let page_three = "Outlook and capital allocation priorities for the coming year. "
            .repeat(10);
        Document::new(format!("{page_one}\n\n{page_two}\n\n{page_three}"))
            .with_meta("source", "data/raw_pdf_data/annual_report_2023.pdf")
            .with_meta("title", "annual_report_2023.pdf")
            .with_meta("year", 2023)
    }

    #[tokio::test]
    async fn test_query_resolves_to_full_parent_document() {
        let (pipeline, retriever) = setup().await;

        let report = three_page_report();
        let ids = pipeline
            .process_documents(vec![report.clone()])
            .await
            .expect("process documents");
        assert_eq!(ids.len(), 1);

        // A phrase drawn from "page two" must resolve to the whole report,
        // not a fragment.
        let results = retriever
            .retrieve("operating margin driven by pricing discipline")
            .await
            .expect("retrieve");

        assert_eq!(results.len(), 1);
        let document = results[0].as_document().expect("document payload");
        assert_eq!(document, &report);
        assert!(document.page_content.contains("Overview of the fiscal year"));
    }

    #[tokio::test]
    async fn test_parents_are_stored_under_minted_ids() {
        let (pipeline, retriever) = setup().await;

        let ids = pipeline
            .process_documents(vec![
                Document::new("First short parent document about dividends."),
                Document::new("Second short parent document about headcount."),
            ])
            .await
            .expect("process documents");
        assert_eq!(ids.len(), 2);

        let stored: Vec<Option<ParentPayload>> = retriever
            .docstore()
            .mget(&ids)
            .await
            .expect("mget stored parents");
        assert!(stored.iter().all(Option::is_some));
    }

    #[tokio::test]
    async fn test_description_match_returns_original_image() {
        let (pipeline, retriever) = setup().await;
        let dir = tempdir().expect("tempdir");

        let images = dir.path().join("extracted");
        std::fs::create_dir_all(&images).expect("mkdir");
        let mut png = b"\x89\x50\x4E\x47\x0D\x0A\x1A\x0A".to_vec();
        png.extend_from_slice(&[7u8; 32]);
        std::fs::write(images.join("table_revenue_2023.png"), &png).expect("write image");

        let cache = ContentCache::new(dir.path().join("cache"));
        let img_ids = pipeline
            .process_images(&images, &cache, &StubDescriber, Duration::ZERO)
            .await
            .expect("process images");
        assert_eq!(img_ids.len(), 1);

        let results = retriever
            .retrieve("quarterly revenue split by region")
            .await
            .expect("retrieve");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_image(), Some(STANDARD.encode(&png).as_str()));
    }

    #[tokio::test]
    async fn test_empty_input_is_a_no_op() {
        let (pipeline, _) = setup().await;
        let ids = pipeline
            .process_documents(Vec::new())
            .await
            .expect("process documents");
        assert!(ids.is_empty());
    }
}

use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

use common::{
    error::AppError,
    storage::types::document::{Document, ID_KEY, START_INDEX_KEY},
};

/// Deterministic splitter producing overlapping character windows, cutting
/// preferentially at paragraph, sentence and word boundaries before a hard
/// character cut.
pub struct TextChunker {
    splitter: TextSplitter<text_splitter::Characters>,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, AppError> {
        if chunk_size == 0 {
            return Err(AppError::Validation("chunk size must be non-zero".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(AppError::Validation(format!(
                "chunk overlap of {chunk_overlap} must be smaller than the chunk size of {chunk_size}"
            )));
        }

        let config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| AppError::Validation(format!("invalid chunk overlap: {e}")))?;

        Ok(Self {
            splitter: TextSplitter::new(config),
        })
    }

    /// Split each document into chunks tagged with its caller-supplied
    /// identifier. Documents and ids pair 1:1; each chunk inherits the
    /// parent metadata and gains the parent id plus its start offset.
    pub fn split(
        &self,
        documents: &[Document],
        doc_ids: &[String],
    ) -> Result<Vec<Document>, AppError> {
        if documents.len() != doc_ids.len() {
            return Err(AppError::Validation(format!(
                "got {} documents but {} ids; they must pair 1:1",
                documents.len(),
                doc_ids.len()
            )));
        }

        let mut chunks = Vec::new();
        for (document, doc_id) in documents.iter().zip(doc_ids) {
            for (offset, chunk_text) in self.splitter.chunk_indices(&document.page_content) {
                let mut chunk = Document {
                    page_content: chunk_text.to_owned(),
                    metadata: document.metadata.clone(),
                };
                chunk.insert_meta(ID_KEY, doc_id.as_str());
                chunk.insert_meta(START_INDEX_KEY, offset);
                chunks.push(chunk);
            }
        }

        debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            "split documents into chunks"
        );
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_document() -> Document {
        let mut paragraphs = Vec::new();
        for section in 0..6 {
            let sentences: Vec<String> = (0..8)
                .map(|i| format!("Section {section} sentence {i} covers revenue and margin."))
                .collect();
            paragraphs.push(sentences.join(" "));
        }
        Document::new(paragraphs.join("\n\n")).with_meta("source", "annual_report_2023.pdf")
    }

    #[test]
    fn test_split_is_deterministic() {
        let chunker = TextChunker::new(500, 50).expect("chunker");
        let documents = vec![long_document()];
        let ids = vec!["d1".to_owned()];

        let first = chunker.split(&documents, &ids).expect("split");
        let second = chunker.split(&documents, &ids).expect("split");
        assert_eq!(first, second);
        assert!(first.len() > 1, "long input should produce several chunks");
    }

    #[test]
    fn test_chunks_respect_size_and_carry_parent_id() {
        let chunker = TextChunker::new(500, 50).expect("chunker");
        let documents = vec![long_document()];
        let ids = vec!["d1".to_owned()];

        let chunks = chunker.split(&documents, &ids).expect("split");
        for chunk in &chunks {
            assert!(chunk.page_content.chars().count() <= 500);
            assert_eq!(chunk.parent_id(), Some("d1"));
            // Parent metadata is inherited.
            assert_eq!(chunk.meta_str("source"), Some("annual_report_2023.pdf"));
        }
    }

    #[test]
    fn test_start_offsets_locate_chunks_in_parent() {
        let chunker = TextChunker::new(200, 20).expect("chunker");
        let documents = vec![long_document()];
        let ids = vec!["d1".to_owned()];
        let text = documents[0].page_content.clone();

        let chunks = chunker.split(&documents, &ids).expect("split");

        let mut previous_end = 0usize;
        let mut previous_offset: Option<usize> = None;
        for chunk in &chunks {
            let offset = chunk
                .metadata
                .get(START_INDEX_KEY)
                .and_then(serde_json::Value::as_u64)
                .expect("start offset present") as usize;

            // The recorded offset points at the chunk inside the parent.
            assert_eq!(
                &text[offset..offset + chunk.page_content.len()],
                chunk.page_content
            );

            if let Some(prev) = previous_offset {
                assert!(offset > prev, "offsets must be strictly increasing");
                // Anything skipped between consecutive chunks is whitespace.
                if offset > previous_end {
                    assert!(text[previous_end..offset].trim().is_empty());
                }
            }
            previous_offset = Some(offset);
            previous_end = offset + chunk.page_content.len();
        }

        // Coverage reaches the end of the parent text.
        assert!(text[previous_end..].trim().is_empty());
    }

    #[test]
    fn test_short_document_yields_single_chunk() {
        let chunker = TextChunker::new(500, 50).expect("chunker");
        let documents = vec![Document::new("Just one short sentence.")];
        let ids = vec!["d1".to_owned()];

        let chunks = chunker.split(&documents, &ids).expect("split");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_content, "Just one short sentence.");
    }

    #[test]
    fn test_each_document_gets_its_own_id() {
        let chunker = TextChunker::new(500, 50).expect("chunker");
        let documents = vec![
            Document::new("First parent content."),
            Document::new("Second parent content."),
        ];
        let ids = vec!["a".to_owned(), "b".to_owned()];

        let chunks = chunker.split(&documents, &ids).expect("split");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].parent_id(), Some("a"));
        assert_eq!(chunks[1].parent_id(), Some("b"));
    }

    #[test]
    fn test_mismatched_lengths_are_rejected() {
        let chunker = TextChunker::new(500, 50).expect("chunker");
        let documents = vec![Document::new("content")];
        let ids: Vec<String> = Vec::new();

        assert!(chunker.split(&documents, &ids).is_err());
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        assert!(TextChunker::new(0, 0).is_err());
        assert!(TextChunker::new(100, 100).is_err());
        assert!(TextChunker::new(100, 150).is_err());
    }
}

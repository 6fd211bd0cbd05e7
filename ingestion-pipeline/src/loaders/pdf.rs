use std::path::Path;

use tracing::info;

use common::{error::AppError, storage::types::document::Document, utils::cache::ContentCache};

use crate::utils::{extract_year, file_name, file_stem};

/// Load a local PDF as one parent document, consulting the cache before
/// parsing. The whole report stays one retrievable unit; chunking happens
/// downstream.
pub async fn load(path: &Path, cache: &ContentCache) -> Result<Vec<Document>, AppError> {
    let cache_key = path.display().to_string();
    if let Some(documents) = cache.load::<Vec<Document>>(&cache_key)? {
        info!(file = %file_name(path), "loaded local pdf from cache");
        return Ok(documents);
    }

    let bytes = tokio::fs::read(path).await?;
    let (text, page_count) = tokio::task::spawn_blocking(move || extract_pdf_text(&bytes)).await??;

    let mut document = Document::new(text)
        .with_meta("source", cache_key.as_str())
        .with_meta("title", file_name(path))
        .with_meta("page_count", page_count);
    if let Some(year) = extract_year(&file_stem(path)) {
        document.insert_meta("year", year);
    }

    let documents = vec![document];
    cache.save(&cache_key, &documents)?;
    info!(file = %file_name(path), pages = page_count, "loaded local pdf");
    Ok(documents)
}

/// Text-layer extraction plus a page count from the document structure.
fn extract_pdf_text(bytes: &[u8]) -> Result<(String, usize), AppError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map(|extracted| extracted.trim().to_owned())
        .map_err(|err| AppError::Processing(format!("Failed to extract text from PDF: {err}")))?;

    let page_count = lopdf::Document::load_mem(bytes)
        .map_err(|err| AppError::Processing(format!("Failed to parse PDF: {err}")))?
        .get_pages()
        .len();

    Ok((text, page_count))
}

use std::path::Path;

use tracing::info;

use common::{error::AppError, storage::types::document::Document, utils::cache::ContentCache};

use crate::utils::{extract_year, file_name, file_stem};

#[derive(Default)]
struct Header {
    title: Option<String>,
    source: Option<String>,
    year: Option<i32>,
}

/// The first three lines of a transcript file may declare `Title:`,
/// `Source:` and `Year:` fields. Header lines stay part of the content.
fn parse_header(content: &str) -> Header {
    let mut header = Header::default();
    for line in content.trim().lines().take(3) {
        if let Some(value) = line.strip_prefix("Title: ") {
            header.title = Some(value.trim().to_owned());
        } else if let Some(value) = line.strip_prefix("Source: ") {
            header.source = Some(value.trim().to_owned());
        } else if let Some(value) = line.strip_prefix("Year: ") {
            header.year = value.trim().parse().ok();
        }
    }
    header
}

/// Load a local transcript/text file as one document, with header fields
/// falling back to filename-derived defaults.
pub async fn load(path: &Path, cache: &ContentCache) -> Result<Vec<Document>, AppError> {
    let cache_key = path.display().to_string();
    if let Some(documents) = cache.load::<Vec<Document>>(&cache_key)? {
        info!(file = %file_name(path), "loaded local text file from cache");
        return Ok(documents);
    }

    let content = tokio::fs::read_to_string(path).await?;
    let header = parse_header(&content);

    let mut document = Document::new(content);
    document.insert_meta(
        "source",
        header.source.unwrap_or_else(|| cache_key.clone()),
    );
    document.insert_meta(
        "title",
        header.title.unwrap_or_else(|| file_name(path)),
    );
    if let Some(year) = header.year.or_else(|| extract_year(&file_stem(path))) {
        document.insert_meta("year", year);
    }

    let documents = vec![document];
    cache.save(&cache_key, &documents)?;
    info!(file = %file_name(path), "loaded local text file");
    Ok(documents)
}

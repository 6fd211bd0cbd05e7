use std::fmt::Write as _;
use std::path::Path;

use tracing::info;

use common::{error::AppError, storage::types::document::Document};

/// Extract a 4-digit year from the end of an underscore-delimited name,
/// e.g. `Résultats_financiers_2023` yields 2023.
pub fn extract_year(text: &str) -> Option<i32> {
    let last = text.rsplit('_').next()?;
    if last.len() == 4 && last.chars().all(|c| c.is_ascii_digit()) {
        last.parse().ok()
    } else {
        None
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Write each document to `<title>.txt` in `dir`, using the same
/// three-line metadata header the text loader consumes.
pub fn save_transcripts(documents: &[Document], dir: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(dir)?;
    for document in documents {
        let title = document.meta_str("title").unwrap_or("untitled");
        let path = dir.join(format!("{title}.txt"));
        save_doc_to_file(document, &path)?;
    }
    Ok(())
}

fn save_doc_to_file(document: &Document, path: &Path) -> Result<(), AppError> {
    let mut body = String::new();
    let _ = writeln!(
        body,
        "Title: {}",
        document.meta_str("title").unwrap_or("N/A")
    );
    let _ = writeln!(
        body,
        "Source: {}",
        document.meta_str("source").unwrap_or("N/A")
    );
    let year = document
        .metadata
        .get("year")
        .map(ToString::to_string)
        .unwrap_or_else(|| "N/A".to_owned());
    let _ = writeln!(body, "Year: {year}");
    body.push_str("Content:\n");
    body.push_str(&document.page_content);

    std::fs::write(path, body)?;
    info!(file = %path.display(), "saved transcript to file");
    Ok(())
}

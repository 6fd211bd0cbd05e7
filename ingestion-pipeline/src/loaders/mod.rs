pub mod pdf;
pub mod text;
pub mod transcript;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

use common::{error::AppError, storage::types::document::Document, utils::cache::ContentCache};

pub use transcript::HttpTranscriptFetcher;

/// Remote transcript boundary. The production impl talks to the video
/// platform; tests substitute a canned fetcher.
#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    async fn fetch_transcript(&self, url: &str) -> Result<String, AppError>;
}

/// Shared collaborators every loader needs.
pub struct LoaderContext {
    pub cache: ContentCache,
    pub fetcher: Arc<dyn TranscriptFetcher>,
}

/// The closed set of corpus source types.
#[derive(Debug, Clone)]
pub enum Source {
    Pdf { path: PathBuf },
    Text { path: PathBuf },
    Transcript { title: String, url: String },
}

impl Source {
    pub fn label(&self) -> String {
        match self {
            Source::Pdf { path } | Source::Text { path } => path.display().to_string(),
            Source::Transcript { title, .. } => title.clone(),
        }
    }

    /// Load the documents for one source, consulting the content cache
    /// before any extraction or network work.
    pub async fn load_one(&self, ctx: &LoaderContext) -> Result<Vec<Document>, AppError> {
        match self {
            Source::Pdf { path } => pdf::load(path, &ctx.cache).await,
            Source::Text { path } => text::load(path, &ctx.cache).await,
            Source::Transcript { title, url } => transcript::load(title, url, ctx).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub source: String,
    pub reason: String,
}

/// Aggregated result of a batch load: order-preserving successes plus the
/// explicit per-source failures.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub documents: Vec<Document>,
    pub failures: Vec<LoadFailure>,
}

/// Load every source concurrently, one task per source. A failed source is
/// logged and recorded but never fails the batch, and contributes no
/// placeholder documents.
pub async fn load_batch(sources: Vec<Source>, ctx: Arc<LoaderContext>) -> BatchOutcome {
    let handles: Vec<_> = sources
        .into_iter()
        .map(|source| {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                let label = source.label();
                (label, source.load_one(&ctx).await)
            })
        })
        .collect();

    let mut outcome = BatchOutcome::default();
    for joined in join_all(handles).await {
        match joined {
            Ok((_, Ok(documents))) => outcome.documents.extend(documents),
            Ok((label, Err(err))) => {
                warn!(source = %label, error = %err, "failed to load source");
                outcome.failures.push(LoadFailure {
                    source: label,
                    reason: err.to_string(),
                });
            }
            Err(join_err) => {
                warn!(error = %join_err, "loader task aborted");
                outcome.failures.push(LoadFailure {
                    source: "unknown".to_owned(),
                    reason: join_err.to_string(),
                });
            }
        }
    }
    outcome
}

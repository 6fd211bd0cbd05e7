use async_trait::async_trait;
use tracing::info;

use common::{error::AppError, storage::types::document::Document};

use crate::{
    loaders::{LoaderContext, TranscriptFetcher},
    utils::extract_year,
};

/// Load a remote video transcript as one document, keyed in the cache by
/// its URL so a second run never refetches.
pub async fn load(
    title: &str,
    url: &str,
    ctx: &LoaderContext,
) -> Result<Vec<Document>, AppError> {
    if let Some(documents) = ctx.cache.load::<Vec<Document>>(url)? {
        info!(%title, "loaded transcript from cache");
        return Ok(documents);
    }

    info!(%title, "fetching transcript");
    let text = ctx.fetcher.fetch_transcript(url).await?;

    let mut document = Document::new(text)
        .with_meta("source", url)
        .with_meta("title", title);
    if let Some(year) = extract_year(title) {
        document.insert_meta("year", year);
    }

    let documents = vec![document];
    ctx.cache.save(url, &documents)?;
    info!(%title, "fetched transcript");
    Ok(documents)
}

/// Fetches the platform's timed-text captions over HTTP, trying each
/// configured language in preference order.
pub struct HttpTranscriptFetcher {
    client: reqwest::Client,
    languages: Vec<String>,
}

impl HttpTranscriptFetcher {
    pub fn new(languages: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            languages,
        }
    }
}

#[async_trait]
impl TranscriptFetcher for HttpTranscriptFetcher {
    async fn fetch_transcript(&self, url: &str) -> Result<String, AppError> {
        let video_id = extract_video_id(url)?;

        for language in &self.languages {
            let endpoint =
                format!("https://video.google.com/timedtext?lang={language}&v={video_id}");
            let response = self.client.get(&endpoint).send().await?;
            if !response.status().is_success() {
                continue;
            }
            let body = response.text().await?;
            if body.trim().is_empty() {
                continue;
            }
            return Ok(strip_caption_markup(&body));
        }

        Err(AppError::NotFound(format!(
            "no transcript available for {url}"
        )))
    }
}

fn extract_video_id(url: &str) -> Result<String, AppError> {
    let parsed = url::Url::parse(url)
        .map_err(|_| AppError::Validation(format!("invalid video url: {url}")))?;

    if let Some(id) = parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
    {
        return Ok(id);
    }

    // Short links carry the id as the first path segment.
    if parsed.host_str() == Some("youtu.be") {
        if let Some(id) = parsed.path_segments().and_then(|mut segments| segments.next()) {
            if !id.is_empty() {
                return Ok(id.to_owned());
            }
        }
    }

    Err(AppError::Validation(format!("no video id in url: {url}")))
}

/// Timed-text is flat XML; keep the text nodes and decode the handful of
/// entities the endpoint emits.
fn strip_caption_markup(xml: &str) -> String {
    let mut text = String::with_capacity(xml.len());
    let mut in_tag = false;
    for c in xml.chars() {
        match c {
            '<' => {
                in_tag = true;
                if !text.is_empty() && !text.ends_with(' ') {
                    text.push(' ');
                }
            }
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::cache::ContentCache;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tempfile::tempdir;

    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl TranscriptFetcher for CountingFetcher {
        async fn fetch_transcript(&self, url: &str) -> Result<String, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::NotFound(format!(
                    "no transcript available for {url}"
                )));
            }
            Ok("la croissance du chiffre d'affaires".to_owned())
        }
    }

    fn context(root: &std::path::Path, fail: bool) -> (LoaderContext, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = LoaderContext {
            cache: ContentCache::new(root),
            fetcher: Arc::new(CountingFetcher {
                calls: Arc::clone(&calls),
                fail,
            }),
        };
        (ctx, calls)
    }

    #[tokio::test]
    async fn test_fetch_attaches_metadata_and_year() {
        let dir = tempdir().expect("tempdir");
        let (ctx, _) = context(dir.path(), false);

        let documents = load(
            "Résultats_financiers_2023",
            "https://www.youtube.com/watch?v=B57wephix-w",
            &ctx,
        )
        .await
        .expect("load");

        assert_eq!(documents.len(), 1);
        assert_eq!(
            documents[0].meta_str("source"),
            Some("https://www.youtube.com/watch?v=B57wephix-w")
        );
        assert_eq!(
            documents[0].meta_str("title"),
            Some("Résultats_financiers_2023")
        );
        assert_eq!(
            documents[0].metadata.get("year"),
            Some(&serde_json::Value::from(2023))
        );
    }

    #[tokio::test]
    async fn test_second_load_hits_cache_without_network() {
        let dir = tempdir().expect("tempdir");
        let (ctx, calls) = context(dir.path(), false);
        let url = "https://www.youtube.com/watch?v=B57wephix-w";

        let first = load("Résultats_financiers_2023", url, &ctx)
            .await
            .expect("first load");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let second = load("Résultats_financiers_2023", url, &ctx)
            .await
            .expect("second load");
        assert_eq!(first, second);
        // No fetch side effect on the second call.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates_to_caller() {
        let dir = tempdir().expect("tempdir");
        let (ctx, _) = context(dir.path(), true);

        let result = load(
            "PLAN_STRATEGIQUE_RENAULUTION_2021",
            "https://www.youtube.com/watch?v=EtivAvmDr2Q",
            &ctx,
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_video_id_variants() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=B57wephix-w").expect("id"),
            "B57wephix-w"
        );
        assert_eq!(
            extract_video_id(
                "https://www.youtube.com/watch?app=desktop&v=EtivAvmDr2Q&t=901s&ab_channel=RenaultGroup"
            )
            .expect("id"),
            "EtivAvmDr2Q"
        );
        assert_eq!(
            extract_video_id("https://youtu.be/VfIeaIFSCQA").expect("id"),
            "VfIeaIFSCQA"
        );
        assert!(extract_video_id("not a url").is_err());
        assert!(extract_video_id("https://example.com/no-video-here").is_err());
    }

    #[test]
    fn test_strip_caption_markup() {
        let xml = "<?xml version=\"1.0\"?><transcript>\
                   <text start=\"0\" dur=\"2\">bonjour &amp; bienvenue</text>\
                   <text start=\"2\" dur=\"3\">aux r&#39;sultats annuels</text>\
                   </transcript>";
        let stripped = strip_caption_markup(xml);
        assert_eq!(stripped, "bonjour & bienvenue aux r'sultats annuels");
    }
}

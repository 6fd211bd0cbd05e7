use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use common::{
    storage::{byte_store::DocStore, db::SurrealDbClient},
    utils::{
        cache::ContentCache,
        config::{get_config, AppConfig},
        embedding::EmbeddingProvider,
    },
};
use ingestion_pipeline::{
    descriptions::VisionDescriber,
    loaders::{load_batch, HttpTranscriptFetcher, LoaderContext, Source},
    IngestionPipeline, TextChunker,
};
use retrieval_pipeline::{
    partition_payloads, MultiVectorRetriever, SurrealVectorIndex, VectorIndex,
};

#[derive(Parser)]
#[command(
    name = "dossier",
    about = "Corpus ingestion and retrieval for the report assistant"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the configured corpus sources and index them
    Ingest,
    /// Run a similarity query and print the resolved parent documents
    Query { text: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let embedding_provider = Arc::new(EmbeddingProvider::from_config(
        &config,
        Some(Arc::clone(&openai_client)),
    )?);
    info!(
        embedding_backend = embedding_provider.backend_label(),
        embedding_dimension = embedding_provider.dimension(),
        "embedding provider initialized"
    );

    let vectorstore = Arc::new(SurrealVectorIndex::new(db.clone(), embedding_provider).await?);
    let docstore = DocStore::new(db, config.collection.clone());

    match cli.command {
        Command::Ingest => ingest(&config, vectorstore, docstore, openai_client).await?,
        Command::Query { text } => query(&config, vectorstore, docstore, &text).await?,
    }

    Ok(())
}

async fn ingest(
    config: &AppConfig,
    vectorstore: Arc<SurrealVectorIndex>,
    docstore: DocStore,
    openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cache = ContentCache::new(&config.cache_dir);
    let ctx = Arc::new(LoaderContext {
        cache: cache.clone(),
        fetcher: Arc::new(HttpTranscriptFetcher::new(
            config.transcript_languages.clone(),
        )),
    });

    let sources = gather_sources(config)?;
    info!(count = sources.len(), "loading corpus sources");
    let outcome = load_batch(sources, ctx).await;
    for failure in &outcome.failures {
        warn!(source = %failure.source, reason = %failure.reason, "source skipped");
    }

    let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap)?;
    let pipeline = IngestionPipeline::new(
        vectorstore as Arc<dyn VectorIndex>,
        docstore,
        chunker,
    );

    let doc_ids = pipeline.process_documents(outcome.documents).await?;
    info!(documents = doc_ids.len(), "indexed parent documents");

    let describer = VisionDescriber::new(openai_client, config.description_model.clone());
    let image_ids = pipeline
        .process_images(
            Path::new(&config.extracted_data_dir),
            &cache,
            &describer,
            Duration::from_secs(config.description_delay_seconds),
        )
        .await?;
    info!(images = image_ids.len(), "indexed image descriptions");

    Ok(())
}

async fn query(
    config: &AppConfig,
    vectorstore: Arc<SurrealVectorIndex>,
    docstore: DocStore,
    text: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let retriever = MultiVectorRetriever::new(
        vectorstore as Arc<dyn VectorIndex>,
        docstore,
        config.retrieval_top_k,
    );

    let results = retriever.retrieve(text).await?;
    let partitioned = partition_payloads(&results);

    if partitioned.texts.is_empty() && partitioned.images.is_empty() {
        println!("No answer found");
        return Ok(());
    }

    for (index, content) in partitioned.texts.iter().enumerate() {
        println!("--- result {} ---", index + 1);
        println!("{}", preview(content, 600));
    }
    if !partitioned.images.is_empty() {
        println!(
            "{} matching image(s); raw base64 payload omitted",
            partitioned.images.len()
        );
    }

    Ok(())
}

/// Collect the configured local PDF and transcript files plus the remote
/// video sources, in a stable order.
fn gather_sources(config: &AppConfig) -> Result<Vec<Source>, std::io::Error> {
    let mut sources = Vec::new();

    sources.extend(
        files_with_extension(Path::new(&config.pdf_dir), "pdf")?
            .into_iter()
            .map(|path| Source::Pdf { path }),
    );
    sources.extend(
        files_with_extension(Path::new(&config.transcript_dir), "txt")?
            .into_iter()
            .map(|path| Source::Text { path }),
    );
    for video in &config.video_sources {
        sources.push(Source::Transcript {
            title: video.title.clone(),
            url: video.url.clone(),
        });
    }

    Ok(sources)
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, std::io::Error> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    OpenAI,
    Hashed,
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::OpenAI
}

/// A remote video source: display title plus the URL its transcript is
/// fetched from. The title doubles as the year-extraction input.
#[derive(Clone, Deserialize, Debug)]
pub struct VideoSource {
    pub title: String,
    pub url: String,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_pdf_dir")]
    pub pdf_dir: String,
    #[serde(default = "default_transcript_dir")]
    pub transcript_dir: String,
    #[serde(default = "default_extracted_data_dir")]
    pub extracted_data_dir: String,
    #[serde(default)]
    pub video_sources: Vec<VideoSource>,
    #[serde(default = "default_transcript_languages")]
    pub transcript_languages: Vec<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_description_delay")]
    pub description_delay_seconds: u64,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_description_model")]
    pub description_model: String,
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_owned()
}

fn default_cache_dir() -> String {
    "cache".to_owned()
}

fn default_collection() -> String {
    "corpus".to_owned()
}

fn default_pdf_dir() -> String {
    "data/raw_pdf_data".to_owned()
}

fn default_transcript_dir() -> String {
    "data/youtube_transcripts".to_owned()
}

fn default_extracted_data_dir() -> String {
    "data/extracted_data".to_owned()
}

fn default_transcript_languages() -> Vec<String> {
    vec!["fr".to_owned(), "en".to_owned()]
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_description_delay() -> u64 {
    2
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_owned()
}

fn default_embedding_dimensions() -> u32 {
    1536
}

fn default_description_model() -> String {
    "gpt-4o-mini".to_owned()
}

fn default_retrieval_top_k() -> usize {
    4
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(any(test, feature = "test-utils"))]
impl AppConfig {
    /// Configuration for tests: in-memory database, hashed embeddings, no
    /// remote credentials.
    pub fn test_defaults() -> Self {
        Self {
            surrealdb_address: "mem://".to_owned(),
            surrealdb_username: "root".to_owned(),
            surrealdb_password: "root".to_owned(),
            surrealdb_namespace: "test_ns".to_owned(),
            surrealdb_database: "test_db".to_owned(),
            openai_api_key: "test".to_owned(),
            openai_base_url: default_base_url(),
            cache_dir: default_cache_dir(),
            collection: default_collection(),
            pdf_dir: default_pdf_dir(),
            transcript_dir: default_transcript_dir(),
            extracted_data_dir: default_extracted_data_dir(),
            video_sources: Vec::new(),
            transcript_languages: default_transcript_languages(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            description_delay_seconds: 0,
            embedding_backend: EmbeddingBackend::Hashed,
            embedding_model: default_embedding_model(),
            embedding_dimensions: 64,
            description_model: default_description_model(),
            retrieval_top_k: default_retrieval_top_k(),
        }
    }
}

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use async_openai::{types::CreateEmbeddingRequestArgs, Client};

use crate::utils::config::{AppConfig, EmbeddingBackend};

/// Text-to-vector boundary. The OpenAI backend is the production path; the
/// hashed backend is deterministic and offline, used by tests and local
/// smoke runs.
#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: EmbeddingInner,
}

#[derive(Clone)]
enum EmbeddingInner {
    OpenAI {
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        model: String,
        dimensions: u32,
    },
    Hashed {
        dimension: usize,
    },
}

impl EmbeddingProvider {
    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            EmbeddingInner::Hashed { .. } => "hashed",
            EmbeddingInner::OpenAI { .. } => "openai",
        }
    }

    pub fn dimension(&self) -> usize {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => *dimension,
            EmbeddingInner::OpenAI { dimensions, .. } => *dimensions as usize,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(hashed_embedding(text, *dimension)),
            EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            } => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model.clone())
                    .input([text])
                    .dimensions(*dimensions)
                    .build()?;

                let response = client.embeddings().create(request).await?;

                let embedding = response
                    .data
                    .first()
                    .ok_or_else(|| anyhow!("No embedding data received from OpenAI API"))?
                    .embedding
                    .clone();

                Ok(embedding)
            }
        }
    }

    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(texts
                .into_iter()
                .map(|text| hashed_embedding(&text, *dimension))
                .collect()),
            EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            } => {
                if texts.is_empty() {
                    return Ok(Vec::new());
                }

                let request = CreateEmbeddingRequestArgs::default()
                    .model(model.clone())
                    .input(texts)
                    .dimensions(*dimensions)
                    .build()?;

                let response = client.embeddings().create(request).await?;

                let embeddings: Vec<Vec<f32>> = response
                    .data
                    .into_iter()
                    .map(|item| item.embedding)
                    .collect();

                Ok(embeddings)
            }
        }
    }

    pub fn new_openai(
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        model: String,
        dimensions: u32,
    ) -> Self {
        EmbeddingProvider {
            inner: EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            },
        }
    }

    pub fn new_hashed(dimension: usize) -> Self {
        EmbeddingProvider {
            inner: EmbeddingInner::Hashed {
                dimension: dimension.max(1),
            },
        }
    }

    pub fn from_config(
        config: &AppConfig,
        openai_client: Option<Arc<Client<async_openai::config::OpenAIConfig>>>,
    ) -> Result<Self> {
        match config.embedding_backend {
            EmbeddingBackend::Hashed => Ok(Self::new_hashed(config.embedding_dimensions as usize)),
            EmbeddingBackend::OpenAI => {
                let client = openai_client
                    .ok_or_else(|| anyhow!("OpenAI embedding backend requires a client"))?;
                Ok(Self::new_openai(
                    client,
                    config.embedding_model.clone(),
                    config.embedding_dimensions,
                ))
            }
        }
    }
}

// Helper functions for hashed embeddings
fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];
    if text.is_empty() {
        return vector;
    }

    let mut token_count = 0f32;
    for token in tokens(text) {
        token_count += 1.0;
        let idx = bucket(&token, dim);
        vector[idx] += 1.0;
    }

    if token_count == 0.0 {
        return vector;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hashed_embeddings_are_deterministic() {
        let provider = EmbeddingProvider::new_hashed(32);

        let first = provider.embed("revenue growth").await.expect("embed");
        let second = provider.embed("revenue growth").await.expect("embed");
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }

    #[tokio::test]
    async fn test_hashed_embeddings_are_normalized() {
        let provider = EmbeddingProvider::new_hashed(16);
        let vector = provider
            .embed("operating margin improved this year")
            .await
            .expect("embed");

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_text_embeds_to_zero_vector() {
        let provider = EmbeddingProvider::new_hashed(8);
        let vector = provider.embed("").await.expect("embed");
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let provider = EmbeddingProvider::new_hashed(24);
        let single = provider.embed("free cash flow").await.expect("embed");
        let batch = provider
            .embed_batch(vec!["free cash flow".to_owned()])
            .await
            .expect("embed batch");
        assert_eq!(batch, vec![single]);
    }

    #[test]
    fn test_from_config_uses_hashed_backend() {
        let config = crate::utils::config::AppConfig::test_defaults();
        let provider = EmbeddingProvider::from_config(&config, None).expect("provider");
        assert_eq!(provider.backend_label(), "hashed");
        assert_eq!(provider.dimension(), 64);
    }
}

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_openai::types::{
    ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::time::sleep;
use tracing::{info, warn};
use walkdir::WalkDir;

use common::{error::AppError, utils::cache::ContentCache};

const DESCRIPTION_PROMPT: &str = "You are an assistant tasked with describing images or tables \
for retrieval. These descriptions will be embedded and used to retrieve the raw image or table. \
Give a concise description of the image or table that is well optimized for retrieval.";

/// Extraction drops tables and figures under this filename prefix.
const IMAGE_FILE_PREFIX: &str = "table";

/// Callable that turns an encoded image into a retrieval-ready text
/// description. Model choice and prompt content live behind this seam.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, base64_image: &str) -> Result<String, AppError>;
}

/// Production describer driving a vision-capable chat model.
pub struct VisionDescriber {
    client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    model: String,
}

impl VisionDescriber {
    pub fn new(
        client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ImageDescriber for VisionDescriber {
    async fn describe(&self, base64_image: &str) -> Result<String, AppError> {
        let image_url = format!("data:image/jpeg;base64,{base64_image}");

        let mut content_parts = Vec::with_capacity(2);
        content_parts.push(
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(DESCRIPTION_PROMPT)
                .build()?
                .into(),
        );
        content_parts.push(
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(
                    ImageUrlArgs::default()
                        .url(image_url)
                        .detail(ImageDetail::High)
                        .build()?,
                )
                .build()?
                .into(),
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages([ChatCompletionRequestUserMessageArgs::default()
                .content(content_parts)
                .build()?
                .into()])
            .build()?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| AppError::Processing("vision response missing content".into()))?;

        Ok(content.trim().to_owned())
    }
}

/// Base64-encode every extracted table/figure image under `base_path`, in
/// stable filename order. Unreadable files are skipped with a warning.
pub fn encode_all_images(base_path: &Path) -> Result<Vec<(String, String)>, AppError> {
    if !base_path.exists() {
        return Ok(Vec::new());
    }

    let mut encoded_images = Vec::new();
    for entry in WalkDir::new(base_path).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            AppError::Processing(format!(
                "failed to walk {}: {err}",
                base_path.display()
            ))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
        if !name.starts_with(IMAGE_FILE_PREFIX) {
            continue;
        }

        match std::fs::read(entry.path()) {
            Ok(bytes) => {
                encoded_images.push((entry.path().display().to_string(), STANDARD.encode(bytes)));
            }
            Err(err) => {
                warn!(file = %entry.path().display(), error = %err, "failed to read image");
            }
        }
    }

    Ok(encoded_images)
}

/// Generate a description per image under `path`, caching the description
/// list under the directory key. The loop is sequential with a fixed
/// inter-call delay to respect the remote rate limit.
pub async fn generate_descriptions(
    path: &Path,
    cache: &ContentCache,
    describer: &dyn ImageDescriber,
    delay: Duration,
) -> Result<(Vec<(String, String)>, Vec<String>), AppError> {
    let encoded_images = encode_all_images(path)?;
    let cache_key = path.display().to_string();

    if let Some(descriptions) = cache.load::<Vec<String>>(&cache_key)? {
        info!(path = %path.display(), "loaded image descriptions from cache");
        return Ok((encoded_images, descriptions));
    }

    let mut descriptions = Vec::with_capacity(encoded_images.len());
    for (image_path, base64_image) in &encoded_images {
        info!(image = %image_path, "describing image");
        let description = describer.describe(base64_image).await?;
        descriptions.push(description);
        sleep(delay).await;
    }

    cache.save(&cache_key, &descriptions)?;
    Ok((encoded_images, descriptions))
}

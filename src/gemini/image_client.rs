use crate::{
    error::{GenError, Result},
    gemini::provider::{ImageProvider, ProviderRequest, ReferenceImage},
    logger,
    models::{GeneratedImage, GenerationRequest, GenerationResult, ImageKind},
    styles::{normalize_name, StyleReference},
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Characters of provider text quoted when no image came back.
const TEXT_SNIPPET_LEN: usize = 200;

#[derive(Clone)]
pub struct ImageClient {
    provider: Arc<dyn ImageProvider>,
}

impl ImageClient {
    pub fn new(provider: Arc<dyn ImageProvider>) -> Self {
        Self { provider }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Text-only generation. Fails with `Provider` rather than returning an
    /// empty result.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let provider_request = ProviderRequest {
            prompt: request.enhanced_prompt(),
            reference: None,
            resolution: request.resolution(),
            num_images: request.num_images(),
        };
        self.run(request, provider_request, None).await
    }

    /// Resolves `style_name` under `styles_dir` and attaches the image as a
    /// conditioning input. The prompt and the returned request carry
    /// `style_name`; a request already naming a different style is rejected.
    /// Both failures happen before any network call.
    pub async fn generate_with_style_reference(
        &self,
        request: &GenerationRequest,
        style_name: &str,
        styles_dir: &Path,
    ) -> Result<GenerationResult> {
        if let Some(requested) = request.style() {
            if normalize_name(requested) != normalize_name(style_name) {
                return Err(GenError::Validation(format!(
                    "request style '{}' does not match style reference '{}'",
                    requested, style_name
                )));
            }
        }

        let style = StyleReference::find(style_name, styles_dir)?;
        let bytes = style.read_bytes()?;
        let kind = ImageKind::sniff(&bytes).unwrap_or(style.kind);
        log::info!("📷 Using style reference: {}", style.path.display());

        let request = &request.with_style(style.name.clone());
        let provider_request = ProviderRequest {
            prompt: style_reference_prompt(request),
            reference: Some(ReferenceImage {
                bytes,
                mime_type: kind.mime_type().to_string(),
            }),
            resolution: request.resolution(),
            num_images: request.num_images(),
        };
        self.run(request, provider_request, Some(style.path)).await
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        provider_request: ProviderRequest,
        style_reference: Option<PathBuf>,
    ) -> Result<GenerationResult> {
        log::info!(
            "🎨 Generating {} image(s) at {} with {} ({})",
            request.num_images(),
            request.resolution(),
            self.provider.model(),
            self.provider.name()
        );
        log::debug!("Prompt sent: {}", provider_request.prompt);

        let response = {
            let _timer = logger::timer("image generation");
            self.provider.generate(&provider_request).await?
        };

        let text = (!response.text.is_empty()).then(|| response.text.join(" "));
        if response.images.is_empty() {
            let mut detail = text
                .as_deref()
                .map(|t| t.chars().take(TEXT_SNIPPET_LEN).collect::<String>())
                .unwrap_or_else(|| "empty response".to_string());
            if !response.finish_reasons.is_empty() {
                detail.push_str(&format!(
                    " (finish reason: {})",
                    response.finish_reasons.join(", ")
                ));
            }
            return Err(GenError::Provider(format!("no image generated: {}", detail)));
        }

        let images: Vec<GeneratedImage> = response
            .images
            .into_iter()
            .map(|image| GeneratedImage::from_bytes(image.bytes, image.mime_type.as_deref()))
            .collect();

        if images.len() < request.num_images() as usize {
            log::warn!(
                "Requested {} image(s) but the provider returned {}",
                request.num_images(),
                images.len()
            );
        }
        log::info!("✅ Received {} image(s)", images.len());

        Ok(GenerationResult {
            request_id: Uuid::new_v4(),
            model: self.provider.model().to_string(),
            request: request.clone(),
            enhanced_prompt: provider_request.prompt,
            style_reference,
            images,
            text,
            raw_metadata: response.raw,
            success: true,
            error_message: None,
            created_at: Utc::now(),
        })
    }
}

fn style_reference_prompt(request: &GenerationRequest) -> String {
    format!(
        "Use the attached reference image as a style guide. Match its colour palette, \
         textures, lighting and overall aesthetic without copying its subject.\n\n{}",
        request.enhanced_prompt()
    )
}

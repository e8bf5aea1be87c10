use crate::{
    config::{mask_secret, GeminiConfig},
    error::{GenError, Result},
    gemini::provider::{ImageProvider, ProviderImage, ProviderRequest, ProviderResponse},
    models::gemini::{
        Content, ErrorEnvelope, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
        ImageConfig, Part,
    },
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;

/// Talks to the Gemini `generateContent` endpoint over HTTPS.
#[derive(Clone)]
pub struct GeminiProvider {
    http: reqwest::Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| GenError::Configuration("no Gemini API key configured".into()))?
            .to_string();

        if config.timeout.is_zero() {
            return Err(GenError::Configuration(
                "request timeout must be greater than zero".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        log::debug!(
            "Gemini provider: base={} model={} key={} timeout={:?}",
            config.api_base,
            config.model,
            mask_secret(&api_key),
            config.timeout
        );

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn endpoint(&self) -> String {
        let model = self.model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    pub fn build_payload(request: &ProviderRequest) -> GenerateContentRequest {
        let mut parts = Vec::with_capacity(2);
        if let Some(reference) = &request.reference {
            parts.push(Part::inline(
                reference.mime_type.clone(),
                STANDARD.encode(&reference.bytes),
            ));
        }
        parts.push(Part::text(request.prompt.clone()));

        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
                candidate_count: request.num_images,
                image_config: ImageConfig {
                    aspect_ratio: request.resolution.aspect_ratio().to_string(),
                    image_size: request.resolution.size_tier().to_string(),
                },
            },
        }
    }

    /// Pulls images and text out of a successful response body.
    pub fn extract(raw: serde_json::Value) -> Result<ProviderResponse> {
        let parsed: GenerateContentResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GenError::Provider(format!("unexpected response shape: {}", e)))?;

        let mut images = Vec::new();
        let mut text = Vec::new();
        let mut finish_reasons = Vec::new();
        for candidate in &parsed.candidates {
            if let Some(reason) = candidate.finish_reason.as_deref().filter(|r| !r.is_empty()) {
                finish_reasons.push(reason.to_string());
            }
            let Some(content) = &candidate.content else {
                continue;
            };
            for part in &content.parts {
                if let Some(t) = part.text.as_deref().filter(|t| !t.trim().is_empty()) {
                    text.push(t.to_string());
                }
                let Some(inline) = &part.inline_data else {
                    continue;
                };
                if inline.data.is_empty() {
                    continue;
                }
                let bytes = STANDARD.decode(inline.data.as_bytes()).map_err(|e| {
                    GenError::Provider(format!("image payload is not valid base64: {}", e))
                })?;
                images.push(ProviderImage {
                    bytes,
                    mime_type: (!inline.mime_type.is_empty()).then(|| inline.mime_type.clone()),
                });
            }
        }

        if images.is_empty() && text.is_empty() {
            if let Some(reason) = parsed
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.block_reason.as_deref())
            {
                return Err(GenError::Provider(format!("prompt blocked: {}", reason)));
            }
        }

        Ok(ProviderResponse {
            images,
            text,
            finish_reasons,
            raw,
        })
    }

    /// The error body's own `code` counts as much as the HTTP status.
    fn error_for_status(status: StatusCode, body: &str) -> GenError {
        let (message, body_code) = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => {
                let message = match envelope.error.status {
                    Some(code) => format!("{} ({})", envelope.error.message, code),
                    None => envelope.error.message,
                };
                (message, envelope.error.code)
            }
            Err(_) => (body.chars().take(200).collect(), None),
        };

        let rejected = |code: u16| {
            code == StatusCode::UNAUTHORIZED.as_u16() || code == StatusCode::FORBIDDEN.as_u16()
        };
        if rejected(status.as_u16())
            || body_code.map_or(false, rejected)
            || message.contains("API key")
        {
            GenError::Authentication(format!("HTTP {}: {}", status.as_u16(), message))
        } else {
            GenError::Provider(format!("HTTP {}: {}", status.as_u16(), message))
        }
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let payload = Self::build_payload(request);
        let endpoint = self.endpoint();
        log::debug!("POST {}", endpoint);

        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Self::error_for_status(status, &body));
        }

        let raw: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| GenError::Provider(format!("response is not JSON: {}", e)))?;
        Self::extract(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::provider::ReferenceImage;
    use crate::models::Resolution;
    use crate::test_support::{png_base64, PNG_1X1};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> GeminiProvider {
        let config = GeminiConfig::new()
            .with_api_base(server.uri())
            .with_model("gemini-test")
            .with_api_key("test-key");
        GeminiProvider::new(&config).unwrap()
    }

    fn request(num_images: u32) -> ProviderRequest {
        ProviderRequest {
            prompt: "a red bicycle".to_string(),
            reference: None,
            resolution: Resolution { width: 512, height: 512 },
            num_images,
        }
    }

    #[test]
    fn test_new_requires_api_key() {
        let err = GeminiProvider::new(&GeminiConfig::new()).err().unwrap();
        assert!(matches!(err, GenError::Configuration(_)));
    }

    #[test]
    fn test_new_rejects_zero_timeout() {
        let config = GeminiConfig::new()
            .with_api_key("k")
            .with_timeout(std::time::Duration::ZERO);
        let err = GeminiProvider::new(&config).err().unwrap();
        assert!(matches!(err, GenError::Configuration(msg) if msg.contains("timeout")));
    }

    #[test]
    fn test_endpoint_accepts_prefixed_model() {
        let config = GeminiConfig::new()
            .with_api_base("https://example.test/v1beta/")
            .with_model("models/gemini-x")
            .with_api_key("k");
        let provider = GeminiProvider::new(&config).unwrap();
        assert_eq!(
            provider.endpoint(),
            "https://example.test/v1beta/models/gemini-x:generateContent"
        );
    }

    #[test]
    fn test_payload_puts_reference_before_text() {
        let mut req = request(2);
        req.reference = Some(ReferenceImage {
            bytes: PNG_1X1.to_vec(),
            mime_type: "image/png".to_string(),
        });
        let value = serde_json::to_value(GeminiProvider::build_payload(&req)).unwrap();

        let parts = &value["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/png"));
        assert_eq!(parts[0]["inlineData"]["data"], json!(png_base64()));
        assert_eq!(parts[1]["text"], json!("a red bicycle"));
        assert_eq!(value["generationConfig"]["candidateCount"], json!(2));
        assert_eq!(
            value["generationConfig"]["imageConfig"]["aspectRatio"],
            json!("1:1")
        );
    }

    #[tokio::test]
    async fn test_generate_decodes_images_and_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [
                        {"text": "Here is your bicycle."},
                        {"inlineData": {"mimeType": "image/png", "data": png_base64()}}
                    ]}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider_for(&server).generate(&request(1)).await.unwrap();
        assert_eq!(response.images.len(), 1);
        assert_eq!(response.images[0].bytes, PNG_1X1);
        assert_eq!(response.images[0].mime_type.as_deref(), Some("image/png"));
        assert_eq!(response.text, vec!["Here is your bicycle."]);
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "permission denied", "status": "PERMISSION_DENIED"}
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server).generate(&request(1)).await.unwrap_err();
        assert!(matches!(err, GenError::Authentication(msg) if msg.contains("permission denied")));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .expect(1)
            .mount(&server)
            .await;

        let err = provider_for(&server).generate(&request(1)).await.unwrap_err();
        assert!(matches!(err, GenError::Provider(msg) if msg.contains("500") && msg.contains("upstream exploded")));
    }

    #[test]
    fn test_extract_rejects_bad_base64() {
        let raw = json!({
            "candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": "image/png", "data": "***"}}
            ]}}]
        });
        assert!(matches!(
            GeminiProvider::extract(raw),
            Err(GenError::Provider(_))
        ));
    }

    #[test]
    fn test_extract_collects_finish_reasons() {
        let raw = json!({
            "candidates": [
                {"finishReason": "IMAGE_SAFETY"},
                {"content": {"parts": [{"text": "ok"}]}, "finishReason": "STOP"}
            ]
        });
        let response = GeminiProvider::extract(raw).unwrap();
        assert!(response.images.is_empty());
        assert_eq!(response.finish_reasons, vec!["IMAGE_SAFETY", "STOP"]);
    }

    #[tokio::test]
    async fn test_error_body_code_maps_to_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 401, "message": "request had invalid credentials"}
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server).generate(&request(1)).await.unwrap_err();
        assert!(matches!(err, GenError::Authentication(msg) if msg.contains("invalid credentials")));
    }

    #[test]
    fn test_extract_reports_block_reason() {
        let raw = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = GeminiProvider::extract(raw).unwrap_err();
        assert!(matches!(err, GenError::Provider(msg) if msg.contains("SAFETY")));
    }
}

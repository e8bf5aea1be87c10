use crate::{error::Result, models::Resolution};
use async_trait::async_trait;

/// Conditioning image attached ahead of the prompt text.
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub prompt: String,
    pub reference: Option<ReferenceImage>,
    pub resolution: Resolution,
    pub num_images: u32,
}

/// Image payload as returned by the provider, already decoded from base64.
#[derive(Debug, Clone)]
pub struct ProviderImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub images: Vec<ProviderImage>,
    pub text: Vec<String>,
    /// One entry per candidate that reported why it stopped.
    pub finish_reasons: Vec<String>,
    pub raw: serde_json::Value,
}

/// A hosted text-to-image backend. One call, no retries.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse>;
}

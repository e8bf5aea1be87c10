pub mod http_provider;
pub mod image_client;
pub mod provider;

use crate::{config::GeminiConfig, error::Result};
use std::sync::Arc;

pub use http_provider::GeminiProvider;
pub use image_client::ImageClient;
pub use provider::{ImageProvider, ProviderImage, ProviderRequest, ProviderResponse, ReferenceImage};

#[derive(Clone)]
pub struct GeminiClient {
    image_client: ImageClient,
}

impl GeminiClient {
    /// Fails with `Configuration` when `config.api_key` is unset.
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let provider = GeminiProvider::new(config)?;
        Ok(Self::with_provider(Arc::new(provider)))
    }

    pub fn with_provider(provider: Arc<dyn ImageProvider>) -> Self {
        Self {
            image_client: ImageClient::new(provider),
        }
    }

    pub fn image(&self) -> &ImageClient {
        &self.image_client
    }
}

use std::sync::Arc;

use argon_core::{BackendFactory, ChatError};
use tracing::debug;

use crate::client::{DEFAULT_SYSTEM_INSTRUCTION, GeminiClient};
use crate::error::GeminiError;

/// Produces the API key at connection time.
pub type KeySource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Builds [`GeminiClient`]s, reading the API key anew on every connection.
#[derive(Clone)]
pub struct GeminiConnector {
    key_source: KeySource,
    base_url: Option<String>,
    system_instruction: String,
}

impl GeminiConnector {
    pub fn new(key_source: KeySource) -> Self {
        Self {
            key_source,
            base_url: None,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }

    /// A connector that always uses `api_key`.
    pub fn with_key(api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        Self::new(Arc::new(move || Some(api_key.clone())))
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    fn api_key(&self) -> Result<String, GeminiError> {
        (self.key_source)()
            .filter(|key| !key.trim().is_empty())
            .ok_or(GeminiError::MissingApiKey)
    }

    pub fn try_connect(&self) -> Result<GeminiClient, GeminiError> {
        let api_key = self.api_key()?;

        let client = match &self.base_url {
            Some(url) => GeminiClient::with_base_url(api_key, url.clone()),
            None => GeminiClient::new(api_key),
        };
        debug!("Created Gemini client");
        Ok(client.with_system_instruction(self.system_instruction.clone()))
    }
}

impl BackendFactory for GeminiConnector {
    type Backend = GeminiClient;

    fn connect(&self) -> Result<GeminiClient, ChatError> {
        self.try_connect().map_err(|e| ChatError::new(e.to_string()))
    }

    /// Swaps in the current key; the chat history carries over.
    fn refresh(&self, current: &GeminiClient) -> Result<GeminiClient, ChatError> {
        let api_key = self.api_key().map_err(|e| ChatError::new(e.to_string()))?;
        debug!("Refreshed Gemini client credentials");
        Ok(current.with_api_key(api_key))
    }
}

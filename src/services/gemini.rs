//! Gemini transport for Google Gemini API interactions
//!
//! One [`GeminiTransport`] is bound to one API key. Every failure leaving this
//! module is already a classified [`ProviderError`]; the retry logic above it
//! never looks at status codes or message text.

use crate::error::{PoolError, ProviderError};
use crate::schemas::gemini::{GeminiError, GeminiRequest, GeminiResponse};
use crate::services::backend_pool::{ApiKeyCredential, CredentialPool};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

// ============================================================================
// Transport Trait
// ============================================================================

/// A client able to run one `generateContent` call against a model
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        request: &GeminiRequest,
    ) -> Result<GeminiResponse, ProviderError>;
}

// ============================================================================
// Gemini Configuration
// ============================================================================

/// Configuration for building Gemini transports
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Ordered API keys, one transport each
    pub api_keys: Vec<String>,

    /// Base URL (default: generativelanguage.googleapis.com)
    pub base_url: Option<String>,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl GeminiConfig {
    pub fn with_keys(api_keys: Vec<String>) -> Self {
        Self {
            api_keys,
            base_url: None,
            timeout_seconds: 120,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

// ============================================================================
// Gemini Transport
// ============================================================================

/// REST transport bound to a single API key
#[derive(Debug, Clone)]
pub struct GeminiTransport {
    client: Client,
    base_url: String,
    credential: ApiKeyCredential,
}

impl GeminiTransport {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        credential: ApiKeyCredential,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
        }
    }

    pub fn credential(&self) -> &ApiKeyCredential {
        &self.credential
    }

    fn url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl ModelTransport for GeminiTransport {
    async fn generate_content(
        &self,
        model: &str,
        request: &GeminiRequest,
    ) -> Result<GeminiResponse, ProviderError> {
        let url = self.url(model);

        tracing::debug!(
            model = %model,
            url = %url,
            credential = %self.credential.name(),
            "Calling Gemini generateContent API"
        );

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.credential.api_key())
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(classify_error_body(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, body = %body, "Failed to parse Gemini response");
            ProviderError::fatal(format!("Failed to parse response: {}", e))
        })
    }
}

/// Turn a non-2xx Gemini response into a classified error
pub fn classify_error_body(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<GeminiError>(body) {
        Ok(gemini_error) => ProviderError::from_response(
            status,
            Some(gemini_error.error.status.as_str()),
            gemini_error.error.message,
        ),
        Err(_) => ProviderError::from_response(status, None, body),
    }
}

impl CredentialPool<GeminiTransport> {
    /// One REST transport per configured key, sharing a single HTTP client
    pub fn gemini(config: &GeminiConfig) -> Result<Self, PoolError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PoolError::Client {
                credential: "gemini".to_string(),
                message: e.to_string(),
            })?;
        let base_url = config.base_url.as_deref().unwrap_or(GEMINI_API_BASE);

        let pool = CredentialPool::build(&config.api_keys, |credential| {
            Ok(GeminiTransport::new(client.clone(), base_url, credential.clone()))
        })?;

        tracing::info!(
            key_count = pool.size(),
            credentials = ?pool.names(),
            base_url = %base_url,
            "Initialized Gemini credential pool"
        );

        Ok(pool)
    }
}

// ============================================================================
// Tests
// ============================================================================

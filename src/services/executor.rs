//! Rotating request executor
//!
//! Runs one logical `generate` call against the credential pool:
//!
//! 1. try the preferred credential
//! 2. on a rate limit, rotate to the next credential and retry at once
//! 3. on overload, rotate and retry after a fixed backoff
//! 4. on anything else, fail immediately with the provider's error
//! 5. after `pool size` attempts, try the fallback model once on the last
//!    credential used, then give up with [`GenerateError::Exhausted`]
//!
//! Attempts are strictly sequential. Every rotation is persisted to the shared
//! [`RotationStateStore`] in the background; the retry loop never waits on it.

use crate::config::Settings;
use crate::error::{FailureKind, GenerateError, ProviderError};
use crate::schemas::gemini::{models, GeminiRequest, GeminiResponse};
use crate::services::backend_pool::CredentialPool;
use crate::services::gemini::{GeminiTransport, ModelTransport};
use crate::services::rotation_state::{
    MemoryStateBackend, RedisStateBackend, RotationStateStore, StateBackend,
};
use crate::utils::{parse_json, spawn_observed, with_timeout, TimeoutError};
use anyhow::Context;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

// ============================================================================
// Executor Configuration
// ============================================================================

/// Tunables for [`RequestExecutor`]
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Model tried on every credential
    pub primary_model: String,

    /// Model tried once after the pool is exhausted
    pub fallback_model: String,

    /// Wait before retrying after an overload
    pub overload_backoff: Duration,

    /// Expiry of the persisted rotation index
    pub state_ttl: Duration,

    /// Bound on the whole call including backoffs. `None` is unbounded.
    pub deadline: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            primary_model: models::GEMINI_2_0_FLASH.to_string(),
            fallback_model: models::GEMINI_1_5_FLASH.to_string(),
            overload_backoff: Duration::from_secs(2),
            state_ttl: Duration::from_secs(3600),
            deadline: Some(Duration::from_secs(60)),
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(mut self, primary: impl Into<String>, fallback: impl Into<String>) -> Self {
        self.primary_model = primary.into();
        self.fallback_model = fallback.into();
        self
    }

    pub fn with_overload_backoff(mut self, backoff: Duration) -> Self {
        self.overload_backoff = backoff;
        self
    }

    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

// ============================================================================
// Request Executor
// ============================================================================

/// Resilient `generate` over a pool of credentials
///
/// Owns the pool and the in-memory preferred index. Independent executors
/// (in this process or others) share nothing but the rotation store.
pub struct RequestExecutor<T> {
    pool: CredentialPool<T>,
    state: RotationStateStore,
    config: ExecutorConfig,
    /// Preferred credential index, always `< pool.size()`
    current: Arc<AtomicUsize>,
    /// Set on first rotation; hydration must not overwrite a newer index
    rotated: Arc<AtomicBool>,
}

impl<T: ModelTransport> RequestExecutor<T> {
    /// Create the executor and start reading the shared index in the background
    ///
    /// Calls made before that read resolves start at index 0.
    pub fn new(pool: CredentialPool<T>, state: RotationStateStore, config: ExecutorConfig) -> Self {
        let executor = Self {
            pool,
            state,
            config,
            current: Arc::new(AtomicUsize::new(0)),
            rotated: Arc::new(AtomicBool::new(false)),
        };
        executor.hydrate();

        tracing::info!(
            key_count = executor.pool.size(),
            primary_model = %executor.config.primary_model,
            fallback_model = %executor.config.fallback_model,
            "Initialized rotating request executor"
        );

        executor
    }

    fn hydrate(&self) {
        let state = self.state.clone();
        let current = Arc::clone(&self.current);
        let rotated = Arc::clone(&self.rotated);
        let size = self.pool.size();

        spawn_observed("hydrate_rotation_state", async move {
            match state.read().await {
                Some(index) if index < size => {
                    // Only replace the untouched starting index; a local rotation is newer.
                    let applied = !rotated.load(Ordering::SeqCst)
                        && current
                            .compare_exchange(0, index, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok();
                    if applied {
                        tracing::info!(index, "Restored preferred credential from shared state");
                    } else {
                        tracing::debug!(index, "Local rotation is newer than shared state, keeping it");
                    }
                }
                Some(index) => {
                    tracing::warn!(index, size, "Discarding out-of-range rotation state");
                }
                None => tracing::debug!("No shared rotation state, starting at index 0"),
            }
            Ok::<_, Infallible>(())
        });
    }

    /// Preferred credential index
    pub fn current_index(&self) -> usize {
        self.pool.normalize(self.current.load(Ordering::SeqCst))
    }

    pub fn pool(&self) -> &CredentialPool<T> {
        &self.pool
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run one logical generate call
    ///
    /// Returns the first successful response, the unchanged provider error
    /// for a non-transient failure, [`GenerateError::Exhausted`] once every
    /// credential and the fallback model failed, or
    /// [`GenerateError::DeadlineExceeded`].
    pub async fn generate(&self, request: &GeminiRequest) -> Result<GeminiResponse, GenerateError> {
        let span = tracing::info_span!(
            "generate",
            call_id = %Uuid::new_v4(),
            pool_size = self.pool.size(),
            model = %self.config.primary_model,
        );

        with_timeout(self.config.deadline, self.run(request))
            .instrument(span)
            .await
            .map_err(|e| match e {
                TimeoutError::Timeout(limit) => {
                    tracing::error!(deadline_ms = limit.as_millis() as u64, "Generate call exceeded deadline");
                    GenerateError::DeadlineExceeded(limit)
                }
                TimeoutError::Inner(err) => err,
            })
    }

    /// Run `generate` and deserialize the JSON object in the first candidate's text
    pub async fn generate_json<R: DeserializeOwned>(
        &self,
        request: &GeminiRequest,
    ) -> Result<R, GenerateError> {
        let response = self.generate(request).await?;
        let text = response
            .text()
            .ok_or_else(|| GenerateError::InvalidResponse("response has no candidates".to_string()))?;

        parse_json(&text).map_err(|e| {
            tracing::warn!(error = %e, "Model returned unparsable JSON");
            GenerateError::InvalidResponse(e.to_string())
        })
    }

    async fn run(&self, request: &GeminiRequest) -> Result<GeminiResponse, GenerateError> {
        let size = self.pool.size();
        let mut index = self.current_index();
        let mut attempts = 0;

        let last_error = loop {
            attempts += 1;

            let err = match self
                .pool
                .get_client(index)
                .generate_content(&self.config.primary_model, request)
                .await
            {
                Ok(response) => {
                    if attempts > 1 {
                        tracing::info!(
                            credential = %self.pool.credential(index).name(),
                            attempts,
                            "Generate succeeded after rotation"
                        );
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            if err.kind == FailureKind::Fatal {
                tracing::warn!(
                    credential = %self.pool.credential(index).name(),
                    status = ?err.status,
                    error = %err.message,
                    "Non-transient provider error"
                );
                return Err(GenerateError::Fatal(err));
            }

            if attempts >= size {
                break err;
            }

            index = self.rotate(index, &err);
            if err.kind == FailureKind::Overloaded {
                tokio::time::sleep(self.config.overload_backoff).await;
            }
        };

        self.fallback(index, request, last_error).await
    }

    /// Advance to the next credential and persist it in the background
    fn rotate(&self, from: usize, cause: &ProviderError) -> usize {
        let next = self.pool.next_index(from);
        self.rotated.store(true, Ordering::SeqCst);
        self.current.store(next, Ordering::SeqCst);

        tracing::warn!(
            from = %self.pool.credential(from).name(),
            to = %self.pool.credential(next).name(),
            reason = %cause.kind,
            error = %cause.message,
            "Rotating credential"
        );

        self.state.write(next, self.config.state_ttl);
        next
    }

    async fn fallback(
        &self,
        index: usize,
        request: &GeminiRequest,
        primary_error: ProviderError,
    ) -> Result<GeminiResponse, GenerateError> {
        let size = self.pool.size();
        let credential = self.pool.credential(index).name();

        tracing::warn!(
            credential = %credential,
            attempts = size,
            fallback_model = %self.config.fallback_model,
            last_error = %primary_error,
            "Credential pool exhausted, trying fallback model"
        );

        match self
            .pool
            .get_client(index)
            .generate_content(&self.config.fallback_model, request)
            .await
        {
            Ok(response) => {
                tracing::info!(credential = %credential, "Fallback model succeeded");
                Ok(response)
            }
            Err(err) => {
                tracing::error!(
                    credential = %credential,
                    error = %err,
                    "Fallback model failed, giving up"
                );
                Err(GenerateError::Exhausted {
                    credentials: size,
                    fallback_model: self.config.fallback_model.clone(),
                    last_error: err,
                })
            }
        }
    }
}

// ============================================================================
// Settings Wiring
// ============================================================================

/// Executor over real Gemini REST transports
pub type GeminiExecutor = RequestExecutor<GeminiTransport>;

impl RequestExecutor<GeminiTransport> {
    /// Build the pool, the rotation store, and the executor from settings
    ///
    /// Uses Redis for rotation state when `redis_url` is set, otherwise a
    /// process-local store.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let pool = CredentialPool::gemini(&settings.gemini_config())
            .context("Failed to build Gemini credential pool")?;

        let backend: Arc<dyn StateBackend> = match settings.redis_url.as_deref() {
            Some(url) => {
                tracing::info!("Using Redis for rotation state");
                Arc::new(RedisStateBackend::open(url).context("Invalid REDIS_URL")?)
            }
            None => {
                tracing::info!("REDIS_URL not set, keeping rotation state in memory");
                Arc::new(MemoryStateBackend::new())
            }
        };

        let state = RotationStateStore::new(backend)
            .with_key(settings.state_key.clone())
            .with_io_timeout(settings.store_timeout());

        Ok(Self::new(pool, state, settings.executor_config()))
    }
}

// ============================================================================
// Tests
// ============================================================================

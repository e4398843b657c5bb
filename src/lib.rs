//! Rotating-credential Gemini client
//!
//! Spreads `generateContent` calls over a pool of API keys, rotating on rate
//! limits and overloads, sharing the preferred key across processes through
//! a Redis-compatible store, and falling back to a secondary model once every
//! key has failed.

pub mod config;
pub mod error;
pub mod logging;
pub mod schemas;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use error::{FailureKind, GenerateError, ProviderError};
pub use schemas::{GeminiRequest, GeminiResponse};
pub use services::{ExecutorConfig, GeminiExecutor, RequestExecutor, RotationStateStore};

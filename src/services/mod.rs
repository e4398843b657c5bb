//! Services module
//!
//! Credential pool, Gemini transport, shared rotation state, and the
//! executor tying them together.

pub mod backend_pool;
pub mod executor;
pub mod gemini;
pub mod rotation_state;

pub use backend_pool::{ApiKeyCredential, CredentialPool};
pub use executor::{ExecutorConfig, GeminiExecutor, RequestExecutor};
pub use gemini::{GeminiConfig, GeminiTransport, ModelTransport};
pub use rotation_state::{
    MemoryStateBackend, RedisStateBackend, RotationStateStore, StateBackend,
};

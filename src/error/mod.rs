//! Error types

mod types;

pub use types::{FailureKind, GenerateError, PoolError, ProviderError, StoreError};

//! Backend Pool Module
//!
//! Holds one bound client per configured API key.
//!
//! # Example
//! ```ignore
//! use gemini_rotation::services::backend_pool::CredentialPool;
//!
//! let pool = CredentialPool::build(["key1", "key2"], |cred| Ok(cred.name().to_string()))?;
//! assert_eq!(pool.get_client(5), "gemini_key_2");
//! ```

mod credential;
mod pool;

pub use credential::ApiKeyCredential;
pub use pool::CredentialPool;

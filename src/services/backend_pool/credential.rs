//! API key credentials
//!
//! A credential is an opaque secret whose only identity is its position in
//! the configured, ordered key list.

use std::fmt;

/// Simple API key credential for the Gemini API
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeyCredential {
    /// Position in the configured key list
    index: usize,
    /// Display name for logs (`gemini_key_{index + 1}`)
    name: String,
    /// The API key
    api_key: String,
}

impl ApiKeyCredential {
    /// Create a credential for the key at `index`
    pub fn new(index: usize, api_key: impl Into<String>) -> Self {
        Self {
            index,
            name: format!("gemini_key_{}", index + 1),
            api_key: api_key.into(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Name safe to put in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the API key
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Build credentials from an ordered key list, dropping blank entries
    pub fn from_keys<I, S>(keys: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter()
            .map(|k| k.as_ref().trim().to_string())
            .filter(|k| !k.is_empty())
            .enumerate()
            .map(|(idx, key)| Self::new(idx, key))
            .collect()
    }
}

impl fmt::Debug for ApiKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyCredential")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

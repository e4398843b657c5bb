//! Credential Pool Implementation
//!
//! Fixed, ordered set of bound clients, one per credential, built once at
//! startup. Selection is by index; which index to use is the executor's
//! business, not the pool's.

use super::credential::ApiKeyCredential;
use crate::error::PoolError;

/// A client bound to the credential it was built from
#[derive(Debug)]
struct PooledClient<T> {
    credential: ApiKeyCredential,
    client: T,
}

/// A pool of bound clients, one per configured credential
///
/// Invariant: never empty. Construction fails fast on an empty key list.
#[derive(Debug)]
pub struct CredentialPool<T> {
    entries: Vec<PooledClient<T>>,
}

impl<T> CredentialPool<T> {
    /// Build one client per non-blank key through `factory`
    pub fn build<I, S, F>(keys: I, mut factory: F) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(&ApiKeyCredential) -> Result<T, PoolError>,
    {
        let credentials = ApiKeyCredential::from_keys(keys);
        if credentials.is_empty() {
            return Err(PoolError::NoCredentials);
        }

        let entries = credentials
            .into_iter()
            .map(|credential| {
                let client = factory(&credential)?;
                Ok(PooledClient { credential, client })
            })
            .collect::<Result<Vec<_>, PoolError>>()?;

        Ok(Self { entries })
    }

    /// Client for `index mod size`. Never fails.
    pub fn get_client(&self, index: usize) -> &T {
        &self.entries[self.normalize(index)].client
    }

    /// Credential for `index mod size`
    pub fn credential(&self, index: usize) -> &ApiKeyCredential {
        &self.entries[self.normalize(index)].credential
    }

    /// Get the number of credentials
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Map any index into `[0, size)`
    pub fn normalize(&self, index: usize) -> usize {
        index % self.entries.len()
    }

    /// Index after `index`, wrapping
    pub fn next_index(&self, index: usize) -> usize {
        self.normalize(self.normalize(index) + 1)
    }

    /// Names of all credentials, in order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.credential.name()).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

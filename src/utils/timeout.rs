//! Timeout utilities
//!
//! Optional bounds on async operations: shared-store I/O and the total
//! deadline of a `generate` call.

use std::time::Duration;

/// Apply an optional timeout to an async operation
///
/// `None` runs the operation unbounded.
pub async fn with_timeout<T, E>(
    timeout: Option<Duration>,
    future: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, TimeoutError<E>> {
    let Some(limit) = timeout else {
        return future.await.map_err(TimeoutError::Inner);
    };

    match tokio::time::timeout(limit, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TimeoutError::Inner(err)),
        Err(_) => Err(TimeoutError::Timeout(limit)),
    }
}

/// Error type for timeout operations
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Inner(E),
}

impl<E> TimeoutError<E> {
    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutError::Timeout(_))
    }

    /// Get the inner error if not a timeout
    pub fn into_inner(self) -> Option<E> {
        match self {
            TimeoutError::Inner(e) => Some(e),
            TimeoutError::Timeout(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result: Result<i32, TimeoutError<String>> =
            with_timeout(Some(Duration::from_secs(1)), async { Ok::<_, String>(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_inner_error() {
        let result: Result<i32, TimeoutError<String>> = with_timeout(
            Some(Duration::from_secs(1)),
            async { Err::<i32, _>("inner error".to_string()) },
        )
        .await;

        let err = result.unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(err.into_inner(), Some("inner error".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_timeout() {
        let result: Result<i32, TimeoutError<String>> = with_timeout(
            Some(Duration::from_millis(10)),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, String>(42)
            },
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.into_inner().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_limit_waits() {
        let result: Result<i32, TimeoutError<String>> = with_timeout(None, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, String>(7)
        })
        .await;

        assert_eq!(result.unwrap(), 7);
    }
}

//! Bounded store calls.

use catalog_core::{CatalogError, CatalogResult};
use std::future::Future;
use std::time::Duration;

/// Run a store call with a deadline; expiry becomes `StorageError::Timeout`.
pub async fn bounded<T, F>(operation: &str, limit: Duration, call: F) -> CatalogResult<T>
where
    F: Future<Output = CatalogResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CatalogError::timeout(operation, limit)),
    }
}

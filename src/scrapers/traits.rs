use crate::error::FetchError;
use async_trait::async_trait;

/// Retrieves raw documents for the extractor.
/// Implementations own their retry behavior; callers only branch on the result.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetch the body of `url`, or the reason it could not be fetched
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

//! ContextRetriever trait, the abstraction over the text-retrieval service.

use async_trait::async_trait;

use crate::error::RetrievalError;

/// Ordered text snippets relevant to a task. Possibly empty.
pub type RetrievedContext = Vec<String>;

/// Fetches background snippets for a task description.
///
/// An empty result is a normal outcome, not an error.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    fn name(&self) -> &str;

    async fn retrieve(&self, query: &str) -> Result<RetrievedContext, RetrievalError>;

    async fn health_check(&self) -> Result<bool, RetrievalError> {
        Ok(true)
    }
}

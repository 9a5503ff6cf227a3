//! Model and retrieval endpoint clients for OpsClaw.
//!
//! The model client implements `opsclaw_core::Provider`; the retrieval
//! clients implement `opsclaw_core::ContextRetriever`.

pub mod openai_compat;
pub mod retrieval;

pub use openai_compat::OpenAiCompatProvider;
pub use retrieval::{HttpRetriever, NoopRetriever};

use opsclaw_config::RetrievalConfig;
use opsclaw_core::ContextRetriever;
use opsclaw_core::error::RetrievalError;
use std::sync::Arc;

/// Pick the retriever for the given config section.
pub fn retriever_from_config(
    config: &RetrievalConfig,
) -> Result<Arc<dyn ContextRetriever>, RetrievalError> {
    if config.enabled {
        Ok(Arc::new(HttpRetriever::from_config(config)?))
    } else {
        Ok(Arc::new(NoopRetriever))
    }
}

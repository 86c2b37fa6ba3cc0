//! Trait definitions for external dependencies.
//!
//! The pipeline talks to three outside services: the open-data portal, an
//! embedding API and a chat-completion API. Each sits behind a trait so the
//! services in this crate can be exercised against in-memory mocks.
//!
//! # Example
//!
//! ```
//! use vesta_core::traits::EmbeddingProvider;
//! use vesta_core::AppError;
//!
//! async fn embed_query<E: EmbeddingProvider>(
//!     embedding: &E,
//!     query: &str,
//! ) -> Result<Vec<f32>, AppError> {
//!     embedding.generate(query).await
//! }
//! ```

use std::future::Future;

use crate::chat::{ChatRequest, ChatResponse};
use crate::models::{PackageMetadata, PageCursor, RecordPage};
use crate::AppError;

/// Provider for generating text embeddings.
pub trait EmbeddingProvider: Send + Sync + Clone {
    /// Short provider name for logs (e.g. `"openai"`).
    fn name(&self) -> &'static str;

    /// Generates an embedding vector for the given text.
    fn generate(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, AppError>> + Send;

    /// Generates embeddings for several texts, one vector per input, in order.
    ///
    /// The default implementation calls [`generate`](Self::generate) once per text.
    fn generate_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, AppError>> + Send {
        async move {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(self.generate(text).await?);
            }
            Ok(vectors)
        }
    }
}

/// Chat-completion service with function calling.
pub trait ChatProvider: Send + Sync + Clone {
    fn name(&self) -> &'static str;

    /// Runs one completion and returns the first choice.
    fn complete(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<ChatResponse, AppError>> + Send;
}

/// Client for a CKAN-style open data portal.
pub trait PortalClient: Send + Sync + Clone {
    /// Base URL of the portal, used for logs and landing pages.
    fn base_url(&self) -> &str;

    /// Lists every package name in the catalog.
    fn list_package_names(&self) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    /// Fetches description and resource list for one package.
    fn show_package(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<PackageMetadata, AppError>> + Send;

    /// Fetches one page of datastore records.
    fn datastore_page(
        &self,
        cursor: &PageCursor,
    ) -> impl Future<Output = Result<RecordPage, AppError>> + Send;
}

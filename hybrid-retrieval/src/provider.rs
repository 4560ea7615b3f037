//! Seams to the external stores. Implementations own their connections and
//! pooling; the retrieval core only calls through these traits.

use crate::error::ProviderError;
use crate::result::{ParallelSet, ScoredHit};
use async_trait::async_trait;

/// Outbound lexical query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalSearchRequest<'a> {
    pub text: &'a str,
    pub source: Option<&'a str>,
    pub limit: usize,
}

/// Outbound nearest-neighbour query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorSearchRequest<'a> {
    pub embedding: &'a [f32],
    pub dim: usize,
    pub model: &'a str,
    pub source: Option<&'a str>,
    pub limit: usize,
}

/// Ranked keyword search against a text index.
#[async_trait]
pub trait LexicalSearchProvider: Send + Sync {
    /// Hits best-first, at most `request.limit` of them.
    async fn search(
        &self,
        request: LexicalSearchRequest<'_>,
    ) -> Result<Vec<ScoredHit>, ProviderError>;
}

/// Nearest-neighbour search against an embedding store.
#[async_trait]
pub trait VectorSearchProvider: Send + Sync {
    /// Hits best-first, at most `request.limit` of them.
    async fn search(
        &self,
        request: VectorSearchRequest<'_>,
    ) -> Result<Vec<ScoredHit>, ProviderError>;
}

/// Parallel-rendition lookup against a relationship store.
///
/// Must be a pure read: calling it twice for the same graph state yields
/// the same answer.
#[async_trait]
pub trait GraphExpansionProvider: Send + Sync {
    /// Renditions sharing `hit_id`'s canonical concept key. An unknown or
    /// unlinked identifier is an empty set, not an error.
    async fn expand(&self, hit_id: &str, max_results: usize)
    -> Result<ParallelSet, ProviderError>;

    /// Whether renditions already come in a meaningful order. When false
    /// the orchestrator sorts them by variant label.
    fn orders_renditions(&self) -> bool {
        false
    }
}

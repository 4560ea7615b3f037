/*!
# Hybrid Retrieval

Query-time hybrid retrieval over an external text index, embedding store and
passage graph:
- **Lexical search** and **vector search** issued concurrently
- **Fusion** by Reciprocal Rank Fusion or a weighted sum of normalised scores
- **Graph expansion** attaching parallel renditions to each fused hit

## Architecture

```text
RetrievalRequest
  └─> validate ─> RetrievalQuery
        ├─> Lexical provider ─┐
        │                     ├─> Fusion (RRF / weighted sum)
        └─> Vector provider ──┘      └─> top-K
                                          └─> Graph provider (bounded fan-out)
                                                └─> RetrievalResponse
```

The fusion method, RRF constant, per-branch weights and graph expansion
settings come from the index manifest and are fixed for the life of an
orchestrator. Per-request knobs (branch depths, top-K, source filter,
parallel limits) come from the query.

## Example

```rust,no_run
use haven_hybrid_retrieval::{InMemoryCorpus, Manifest, RetrievalOrchestrator, RetrievalRequest};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let manifest = Manifest::from_path(Path::new("manifest.json"))?;
    let corpus = Arc::new(InMemoryCorpus::from_path(Path::new("corpus.json"))?);

    let orchestrator = RetrievalOrchestrator::new(
        manifest.into_shared(),
        corpus.clone(),
        corpus.clone(),
        corpus,
    )?;

    let response = orchestrator
        .retrieve_request(RetrievalRequest::text("good shepherd").with_top_k(5))
        .await?;

    for (i, item) in response.items.iter().enumerate() {
        println!("{}. {} (score: {:.4})", i + 1, item.hit.id, item.hit.score);
    }

    Ok(())
}
```

## Failure semantics

- Invalid queries are rejected before any provider is called
- If one branch of a hybrid query fails, the survivor is fused alone and the
  response is flagged `degraded`
- If every requested branch fails, the request fails
- Graph lookups that fail leave that hit without parallels; nothing else
  changes
*/

mod config;
mod corpus;
mod error;
mod expansion;
mod fusion;
mod manifest;
mod orchestrator;
mod provider;
mod query;
mod result;

pub use config::{
    BranchWeights, FusionConfig, FusionMethod, GraphExpansionConfig, HybridConfig,
    MAX_PARALLELS_PER_HIT,
};
pub use corpus::{InMemoryCorpus, Passage};
pub use error::{
    BranchFailure, ConfigError, CorpusError, ProviderError, QueryError, Result, RetrievalError,
};
pub use fusion::FusionEngine;
pub use manifest::{IndexPlan, Manifest};
pub use orchestrator::{OrchestratorOptions, RetrievalOrchestrator};
pub use provider::{
    GraphExpansionProvider, LexicalSearchProvider, LexicalSearchRequest, VectorSearchProvider,
    VectorSearchRequest,
};
pub use query::{
    DEFAULT_EMBEDDING_DIM, DEFAULT_EMBEDDING_MODEL, MAX_BRANCH_K, MAX_EMBEDDING_DIM,
    MAX_PARALLEL_LIMIT, MAX_TOP_K, RetrievalQuery, RetrievalRequest,
};
pub use result::{
    Branch, BranchStatus, FusedHit, FusionInfo, GraphExpansion, GraphExpansionInfo,
    ParallelRendition, ParallelSet, RetrievalHit, RetrievalResponse, ScoredHit,
};

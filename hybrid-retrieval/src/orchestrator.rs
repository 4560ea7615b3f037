use crate::config::HybridConfig;
use crate::error::{BranchFailure, ConfigError, ProviderError, Result, RetrievalError};
use crate::expansion::{ExpansionOutcome, GraphExpander};
use crate::fusion::FusionEngine;
use crate::provider::{
    GraphExpansionProvider, LexicalSearchProvider, LexicalSearchRequest, VectorSearchProvider,
    VectorSearchRequest,
};
use crate::query::{RetrievalQuery, RetrievalRequest};
use crate::result::{
    Branch, BranchStatus, FusionInfo, GraphExpansionInfo, RetrievalHit, RetrievalResponse,
    ScoredHit,
};
use haven_async_utils::OrCancelExt;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Runtime knobs that are not part of the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Upper bound on any single provider call
    pub provider_timeout: Duration,
    /// Concurrent graph lookups allowed within one request
    pub expansion_concurrency: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(5),
            expansion_concurrency: 8,
        }
    }
}

enum BranchOutcome {
    Skipped,
    Completed(Vec<ScoredHit>),
    Failed(ProviderError),
}

impl BranchOutcome {
    fn status(&self) -> BranchStatus {
        match self {
            BranchOutcome::Skipped => BranchStatus::Skipped,
            BranchOutcome::Completed(hits) => BranchStatus::Completed { hits: hits.len() },
            BranchOutcome::Failed(_) => BranchStatus::Failed,
        }
    }
}

/// Coordinates lexical search, vector search, fusion and graph expansion
/// for one query at a time. Holds no per-request state, so one instance
/// serves any number of concurrent requests.
pub struct RetrievalOrchestrator {
    config: Arc<HybridConfig>,
    lexical: Arc<dyn LexicalSearchProvider>,
    vector: Arc<dyn VectorSearchProvider>,
    graph: Arc<dyn GraphExpansionProvider>,
    fusion_engine: FusionEngine,
    expander: GraphExpander,
    options: OrchestratorOptions,
}

impl RetrievalOrchestrator {
    /// Create new orchestrator over the given providers
    pub fn new(
        config: Arc<HybridConfig>,
        lexical: Arc<dyn LexicalSearchProvider>,
        vector: Arc<dyn VectorSearchProvider>,
        graph: Arc<dyn GraphExpansionProvider>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|reason| RetrievalError::Configuration(ConfigError::Invalid(reason)))?;

        info!(
            "Initializing retrieval orchestrator ({} fusion, k {}, graph expansion {})",
            config.fusion.method.as_str(),
            config.fusion.k,
            if config.fusion.graph_expansion.enabled {
                "enabled"
            } else {
                "disabled"
            }
        );

        let options = OrchestratorOptions::default();
        Ok(Self {
            fusion_engine: FusionEngine::new(config.fusion.clone()),
            expander: GraphExpander::new(
                graph.clone(),
                options.expansion_concurrency,
                options.provider_timeout,
            ),
            config,
            lexical,
            vector,
            graph,
            options,
        })
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.expander = GraphExpander::new(
            self.graph.clone(),
            options.expansion_concurrency,
            options.provider_timeout,
        );
        self.options = options;
        self
    }

    /// Validate a wire request, then retrieve. Invalid requests never reach
    /// a provider.
    pub async fn retrieve_request(&self, request: RetrievalRequest) -> Result<RetrievalResponse> {
        let query = request.validate()?;
        self.retrieve(&query).await
    }

    /// Retrieve unless `token` fires first; in-flight provider calls are
    /// dropped on cancellation.
    pub async fn retrieve_or_cancel(
        &self,
        query: &RetrievalQuery,
        token: &CancellationToken,
    ) -> Result<RetrievalResponse> {
        self.retrieve(query)
            .or_cancel(token)
            .await
            .map_err(|_| RetrievalError::Cancelled)?
    }

    /// Run both branches, fuse, expand and assemble the response.
    pub async fn retrieve(&self, query: &RetrievalQuery) -> Result<RetrievalResponse> {
        let start = Instant::now();

        let fts_k = query.fts_k().unwrap_or(self.config.fts_k);
        let vector_k = query.vector_k().unwrap_or(self.config.vector_k);

        // Stage 1: lexical and vector branches, concurrently
        let (lexical, vector) = tokio::join!(
            self.search_lexical(query, fts_k),
            self.search_vector(query, vector_k)
        );
        let lexical_status = lexical.status();
        let vector_status = vector.status();
        debug!("Branches finished: lexical {lexical_status:?}, vector {vector_status:?}");

        let mut failures = Vec::new();
        let lexical_hits = Self::settle(Branch::Lexical, lexical, &mut failures);
        let vector_hits = Self::settle(Branch::Vector, vector, &mut failures);

        let any_completed = [lexical_status, vector_status]
            .iter()
            .any(|status| matches!(status, BranchStatus::Completed { .. }));
        if !any_completed {
            warn!("Retrieval failed: every requested branch failed");
            return Err(RetrievalError::ProviderUnavailable(failures));
        }

        let degraded = !failures.is_empty();
        if degraded {
            warn!(
                "Degraded fusion: {} branch failed, fusing surviving branch only",
                failures
                    .iter()
                    .map(|failure| failure.branch.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        // Stage 2: fusion
        let fused = self
            .fusion_engine
            .fuse(lexical_hits, vector_hits, query.top_k());

        // Stage 3: graph expansion
        let expansion = &self.config.fusion.graph_expansion;
        let per_hit_limit = query.parallel_limit().min(expansion.max_per_hit);
        let applied = expansion.enabled && query.include_parallels() && per_hit_limit > 0;
        if query.include_parallels() && !applied {
            debug!(
                "Parallels requested but not applied (enabled {}, limit {per_hit_limit})",
                expansion.enabled
            );
        }

        let outcome = if applied && !fused.is_empty() {
            let hit_ids: Vec<&str> = fused.iter().map(|f| f.hit.id.as_str()).collect();
            self.expander.expand_all(&hit_ids, per_hit_limit).await
        } else {
            ExpansionOutcome::default()
        };

        let failed_hits = outcome.failed;
        let mut expansions = outcome.expansions.into_iter();
        let items: Vec<RetrievalHit> = fused
            .into_iter()
            .map(|fused| RetrievalHit {
                hit: fused.hit,
                lexical_rank: fused.lexical_rank,
                vector_rank: fused.vector_rank,
                parallels: expansions.next().flatten(),
            })
            .collect();

        let fusion = FusionInfo {
            method: self.config.fusion.method,
            k: self.config.fusion.k,
            weights: self.config.fusion.weights(),
            fts_k,
            vector_k,
            lexical: lexical_status,
            vector: vector_status,
            degraded,
            graph_expansion: GraphExpansionInfo {
                enabled: expansion.enabled,
                requested: query.include_parallels(),
                max_per_hit: expansion.max_per_hit,
                per_hit_limit,
                weight: expansion.weight,
                applied,
                failed_hits,
            },
        };

        let response = RetrievalResponse::new(items, fusion);
        info!(
            "Retrieval completed in {}ms, returned {} results{}",
            start.elapsed().as_millis(),
            response.len(),
            if degraded { " (degraded)" } else { "" }
        );

        Ok(response)
    }

    async fn search_lexical(&self, query: &RetrievalQuery, limit: usize) -> BranchOutcome {
        let Some(text) = query.text() else {
            return BranchOutcome::Skipped;
        };

        let request = LexicalSearchRequest {
            text,
            source: query.source(),
            limit,
        };
        self.bounded(self.lexical.search(request), limit).await
    }

    async fn search_vector(&self, query: &RetrievalQuery, limit: usize) -> BranchOutcome {
        let Some(embedding) = query.embedding() else {
            return BranchOutcome::Skipped;
        };

        let request = VectorSearchRequest {
            embedding,
            dim: query.dim(),
            model: query.model(),
            source: query.source(),
            limit,
        };
        self.bounded(self.vector.search(request), limit).await
    }

    /// Apply the provider timeout and hold the provider to its limit.
    async fn bounded<F>(&self, call: F, limit: usize) -> BranchOutcome
    where
        F: Future<Output = std::result::Result<Vec<ScoredHit>, ProviderError>>,
    {
        match timeout(self.options.provider_timeout, call).await {
            Ok(Ok(mut hits)) => {
                hits.truncate(limit);
                BranchOutcome::Completed(hits)
            }
            Ok(Err(err)) => BranchOutcome::Failed(err),
            Err(_) => BranchOutcome::Failed(ProviderError::TimedOut {
                after_ms: self.options.provider_timeout.as_millis() as u64,
            }),
        }
    }

    fn settle(
        branch: Branch,
        outcome: BranchOutcome,
        failures: &mut Vec<BranchFailure>,
    ) -> Vec<ScoredHit> {
        match outcome {
            BranchOutcome::Skipped => Vec::new(),
            BranchOutcome::Completed(hits) => hits,
            BranchOutcome::Failed(error) => {
                warn!("{branch} search failed: {error}");
                failures.push(BranchFailure { branch, error });
                Vec::new()
            }
        }
    }
}

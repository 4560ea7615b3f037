#![allow(dead_code)]

use async_trait::async_trait;
use haven_hybrid_retrieval::{
    BranchWeights, FusionConfig, GraphExpansionConfig, GraphExpansionProvider, HybridConfig,
    LexicalSearchProvider, LexicalSearchRequest, ParallelRendition, ParallelSet, ProviderError,
    RetrievalOrchestrator, ScoredHit, VectorSearchProvider, VectorSearchRequest,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A branch provider that replays a fixed answer and records how it was called.
pub struct ScriptedBranch {
    answer: Result<Vec<ScoredHit>, ProviderError>,
    delay: Duration,
    calls: AtomicUsize,
    last_source: Mutex<Option<String>>,
    last_limit: AtomicUsize,
}

impl ScriptedBranch {
    pub fn returning(hits: &[(&str, f32)]) -> Arc<Self> {
        Arc::new(Self::new(Ok(hits
            .iter()
            .map(|(id, score)| ScoredHit::new(*id, format!("text of {id}"), *score))
            .collect())))
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self::new(Err(ProviderError::Unavailable(reason.to_string()))))
    }

    pub fn slow(hits: &[(&str, f32)], delay: Duration) -> Arc<Self> {
        let mut branch = Self::new(Ok(hits
            .iter()
            .map(|(id, score)| ScoredHit::new(*id, format!("text of {id}"), *score))
            .collect()));
        branch.delay = delay;
        Arc::new(branch)
    }

    fn new(answer: Result<Vec<ScoredHit>, ProviderError>) -> Self {
        Self {
            answer,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_source: Mutex::new(None),
            last_limit: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_source(&self) -> Option<String> {
        self.last_source.lock().unwrap().clone()
    }

    pub fn last_limit(&self) -> usize {
        self.last_limit.load(Ordering::SeqCst)
    }

    async fn answer(
        &self,
        source: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ScoredHit>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_limit.store(limit, Ordering::SeqCst);
        *self.last_source.lock().unwrap() = source.map(str::to_string);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answer.clone()
    }
}

#[async_trait]
impl LexicalSearchProvider for ScriptedBranch {
    async fn search(
        &self,
        request: LexicalSearchRequest<'_>,
    ) -> Result<Vec<ScoredHit>, ProviderError> {
        self.answer(request.source, request.limit).await
    }
}

#[async_trait]
impl VectorSearchProvider for ScriptedBranch {
    async fn search(
        &self,
        request: VectorSearchRequest<'_>,
    ) -> Result<Vec<ScoredHit>, ProviderError> {
        self.answer(request.source, request.limit).await
    }
}

/// Graph provider backed by a fixed map; ids in `failing` return an error.
#[derive(Default)]
pub struct MapGraph {
    sets: HashMap<String, ParallelSet>,
    failing: Vec<String>,
    calls: AtomicUsize,
}

impl MapGraph {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every listed hit gets WEB and ASV renditions plus its own.
    pub fn with_parallels(ids: &[&str], failing: &[&str]) -> Arc<Self> {
        let sets = ids
            .iter()
            .map(|id| {
                let set = ParallelSet {
                    canonical_key: Some(format!("cvk:{id}")),
                    renditions: vec![
                        rendition(&format!("WEB_{id}"), "WEB"),
                        rendition(id, "KJV"),
                        rendition(&format!("ASV_{id}"), "ASV"),
                    ],
                };
                (id.to_string(), set)
            })
            .collect();

        Arc::new(Self {
            sets,
            failing: failing.iter().map(|id| id.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn rendition(id: &str, variant: &str) -> ParallelRendition {
    ParallelRendition {
        id: id.to_string(),
        variant: variant.to_string(),
        reference: "Psalm 23:1".to_string(),
        text: format!("{variant} rendition"),
    }
}

#[async_trait]
impl GraphExpansionProvider for MapGraph {
    async fn expand(
        &self,
        hit_id: &str,
        _max_results: usize,
    ) -> Result<ParallelSet, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|id| id == hit_id) {
            return Err(ProviderError::Unavailable("graph store offline".to_string()));
        }
        Ok(self.sets.get(hit_id).cloned().unwrap_or_default())
    }
}

pub fn rrf_config(k: u32, expansion_enabled: bool) -> HybridConfig {
    HybridConfig {
        vector_k: 50,
        fts_k: 50,
        fusion: FusionConfig {
            graph_expansion: GraphExpansionConfig {
                enabled: expansion_enabled,
                max_per_hit: 3,
                weight: 0.1,
            },
            ..FusionConfig::rrf(k)
        },
    }
}

pub fn weighted_config(lexical: f32, vector: f32) -> HybridConfig {
    HybridConfig {
        vector_k: 50,
        fts_k: 50,
        fusion: FusionConfig::weighted_sum(BranchWeights::new(lexical, vector)),
    }
}

pub fn orchestrator(
    config: HybridConfig,
    lexical: Arc<ScriptedBranch>,
    vector: Arc<ScriptedBranch>,
    graph: Arc<MapGraph>,
) -> RetrievalOrchestrator {
    RetrievalOrchestrator::new(Arc::new(config), lexical, vector, graph).unwrap()
}

use crate::config::BranchWeights;
use crate::config::FusionMethod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two independent ranked retrieval signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    /// Keyword / full-text search
    Lexical,
    /// Nearest-neighbour embedding search
    Vector,
}

impl Branch {
    pub fn other(self) -> Branch {
        match self {
            Branch::Lexical => Branch::Vector,
            Branch::Vector => Branch::Lexical,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Lexical => f.write_str("lexical"),
            Branch::Vector => f.write_str("vector"),
        }
    }
}

/// A single hit as returned by a provider, or after fusion.
///
/// The score is branch-local until fused: lexical providers return a
/// rank-derived relevance, vector providers a cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredHit {
    pub id: String,
    pub text: String,
    pub score: f32,
}

impl ScoredHit {
    pub fn new(id: impl Into<String>, text: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            score,
        }
    }
}

/// Output of fusion: the hit with its fused score plus the 1-based rank it
/// held in each branch that returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub hit: ScoredHit,
    pub lexical_rank: Option<usize>,
    pub vector_rank: Option<usize>,
}

impl FusedHit {
    pub fn rank_in(&self, branch: Branch) -> Option<usize> {
        match branch {
            Branch::Lexical => self.lexical_rank,
            Branch::Vector => self.vector_rank,
        }
    }

    /// Number of branches this hit was found in.
    pub fn branch_count(&self) -> usize {
        usize::from(self.lexical_rank.is_some()) + usize::from(self.vector_rank.is_some())
    }
}

/// A hit's counterpart in one alternate source variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelRendition {
    pub id: String,
    /// Variant label (e.g. translation code)
    pub variant: String,
    /// Human-readable reference
    pub reference: String,
    pub text: String,
}

/// What a graph provider knows about one identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelSet {
    pub canonical_key: Option<String>,
    pub renditions: Vec<ParallelRendition>,
}

/// Parallel renditions attached to a retrieval hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphExpansion {
    pub hit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_key: Option<String>,
    #[serde(default)]
    pub renditions: Vec<ParallelRendition>,
}

/// A fused hit in the final response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub hit: ScoredHit,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lexical_rank: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_rank: Option<usize>,

    /// `None` when expansion was not applied or the lookup failed for this hit
    #[serde(default)]
    pub parallels: Option<GraphExpansion>,
}

/// What happened to one search branch during a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchStatus {
    /// The query did not supply the input this branch needs
    Skipped,
    /// The provider answered
    Completed { hits: usize },
    /// The provider failed or timed out
    Failed,
}

impl BranchStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, BranchStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphExpansionInfo {
    /// Enabled in the manifest
    pub enabled: bool,
    /// Asked for by the query
    pub requested: bool,
    /// Manifest cap on renditions per hit
    pub max_per_hit: usize,
    /// Effective renditions per hit for this request
    pub per_hit_limit: usize,
    pub weight: f32,
    /// Expansion actually ran for this request
    pub applied: bool,
    /// Hits whose lookup failed and carry no expansion
    pub failed_hits: usize,
}

/// Fusion metadata describing what was actually done for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionInfo {
    pub method: FusionMethod,
    pub k: u32,
    pub weights: BranchWeights,
    pub fts_k: usize,
    pub vector_k: usize,
    pub lexical: BranchStatus,
    pub vector: BranchStatus,
    /// A requested branch failed and fusion ran on the survivor only
    pub degraded: bool,
    pub graph_expansion: GraphExpansionInfo,
}

/// Response envelope for one retrieval. Item order is relevance order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub total: usize,
    pub items: Vec<RetrievalHit>,
    pub fusion: FusionInfo,
}

impl RetrievalResponse {
    pub fn new(items: Vec<RetrievalHit>, fusion: FusionInfo) -> Self {
        Self {
            total: items.len(),
            items,
            fusion,
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.hit.id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

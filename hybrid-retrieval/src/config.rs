use crate::result::Branch;
use serde::{Deserialize, Serialize};

/// Upper bound on renditions a manifest may allow per hit
pub const MAX_PARALLELS_PER_HIT: usize = 50;

/// Strategy for combining the lexical and vector rankings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// Reciprocal Rank Fusion - sums 1 / (k + rank) across branches
    #[default]
    Rrf,
    /// Weighted sum of per-branch min-max normalised scores
    WeightedSum,
}

impl FusionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            FusionMethod::Rrf => "rrf",
            FusionMethod::WeightedSum => "weighted_sum",
        }
    }
}

/// Per-branch weights for `weighted_sum`; also decides tie-break priority.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchWeights {
    #[serde(default = "default_weight", alias = "fts")]
    pub lexical: f32,

    #[serde(default = "default_weight")]
    pub vector: f32,
}

fn default_weight() -> f32 {
    1.0
}

impl Default for BranchWeights {
    fn default() -> Self {
        Self {
            lexical: default_weight(),
            vector: default_weight(),
        }
    }
}

impl BranchWeights {
    pub fn new(lexical: f32, vector: f32) -> Self {
        Self { lexical, vector }
    }

    /// Branch whose ranks break ties first. Equal weights prefer lexical.
    pub fn priority(self) -> Branch {
        if self.vector > self.lexical {
            Branch::Vector
        } else {
            Branch::Lexical
        }
    }

    fn validate(self) -> Result<(), String> {
        for (name, weight) in [("lexical", self.lexical), ("vector", self.vector)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(format!(
                    "weight_vector.{name} must be a finite value >= 0.0, got {weight}"
                ));
            }
        }

        if self.lexical == 0.0 && self.vector == 0.0 {
            return Err("weight_vector must not zero out both branches".to_string());
        }

        Ok(())
    }
}

/// Graph-based expansion options
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphExpansionConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Maximum renditions attached to a single hit (0 - 50)
    #[serde(default)]
    pub max_per_hit: usize,

    /// Reported weight of the graph signal (>= 0.0)
    #[serde(default)]
    pub weight: f32,
}

/// Fusion strategy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default)]
    pub method: FusionMethod,

    /// RRF rank constant (higher = less emphasis on top results)
    #[serde(default = "default_rrf_k")]
    pub k: u32,

    /// Per-branch weights, used by `weighted_sum`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_vector: Option<BranchWeights>,

    #[serde(default)]
    pub graph_expansion: GraphExpansionConfig,
}

fn default_rrf_k() -> u32 {
    60
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            method: FusionMethod::Rrf,
            k: default_rrf_k(),
            weight_vector: None,
            graph_expansion: GraphExpansionConfig::default(),
        }
    }
}

impl FusionConfig {
    /// RRF with the given rank constant
    pub fn rrf(k: u32) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    /// Weighted sum with explicit branch weights
    pub fn weighted_sum(weights: BranchWeights) -> Self {
        Self {
            method: FusionMethod::WeightedSum,
            weight_vector: Some(weights),
            ..Default::default()
        }
    }

    /// Effective branch weights (1.0 each when the manifest gives none)
    pub fn weights(&self) -> BranchWeights {
        self.weight_vector.unwrap_or_default()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.k == 0 {
            return Err(format!("k must be >= 1, got {}", self.k));
        }

        if let Some(weights) = &self.weight_vector {
            weights.validate()?;
        }

        let expansion = &self.graph_expansion;
        if expansion.max_per_hit > MAX_PARALLELS_PER_HIT {
            return Err(format!(
                "graph_expansion.max_per_hit must be in [0, {MAX_PARALLELS_PER_HIT}], got {}",
                expansion.max_per_hit
            ));
        }

        if !expansion.weight.is_finite() || expansion.weight < 0.0 {
            return Err(format!(
                "graph_expansion.weight must be a finite value >= 0.0, got {}",
                expansion.weight
            ));
        }

        Ok(())
    }
}

/// Hybrid retrieval configuration: default branch sizes plus fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Candidates requested from the vector branch when the query gives none
    #[serde(default = "default_branch_k")]
    pub vector_k: usize,

    /// Candidates requested from the lexical branch when the query gives none
    #[serde(default = "default_branch_k")]
    pub fts_k: usize,

    #[serde(default)]
    pub fusion: FusionConfig,
}

fn default_branch_k() -> usize {
    50
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            vector_k: default_branch_k(),
            fts_k: default_branch_k(),
            fusion: FusionConfig::default(),
        }
    }
}

impl HybridConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.vector_k == 0 {
            return Err("vector_k must be > 0".to_string());
        }

        if self.fts_k == 0 {
            return Err("fts_k must be > 0".to_string());
        }

        self.fusion.validate()
    }
}

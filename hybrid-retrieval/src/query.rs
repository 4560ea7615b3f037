use crate::error::QueryError;
use serde::{Deserialize, Serialize};

/// Largest per-branch candidate count a query may ask for
pub const MAX_BRANCH_K: usize = 500;
/// Largest number of fused results a query may ask for
pub const MAX_TOP_K: usize = 500;
/// Largest number of renditions a query may ask for per hit
pub const MAX_PARALLEL_LIMIT: usize = 50;
/// Largest declared embedding dimensionality
pub const MAX_EMBEDDING_DIM: usize = 8192;

pub const DEFAULT_EMBEDDING_DIM: usize = 768;
pub const DEFAULT_EMBEDDING_MODEL: &str = "embeddinggemma";

/// Inbound retrieval request, as it arrives on the wire.
///
/// Nothing here is trusted; call [`RetrievalRequest::validate`] to obtain a
/// [`RetrievalQuery`] the orchestrator will accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    /// Free-text query for the lexical branch
    #[serde(default, alias = "text")]
    pub q: Option<String>,

    /// Query embedding for the vector branch
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,

    /// Embedding model the vector was produced with
    #[serde(default = "default_model")]
    pub model: String,

    /// Declared embedding dimensionality
    #[serde(default = "default_dim")]
    pub dim: usize,

    /// Lexical candidates to fetch (manifest default when unset)
    #[serde(default)]
    pub fts_k: Option<usize>,

    /// Vector candidates to fetch (manifest default when unset)
    #[serde(default)]
    pub vector_k: Option<usize>,

    /// Fused results to return
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Restrict both branches to one source (e.g. a translation code)
    #[serde(default, alias = "source")]
    pub translation: Option<String>,

    /// Ask for parallel renditions of each hit
    #[serde(default = "default_true")]
    pub include_parallels: bool,

    /// Renditions wanted per hit
    #[serde(default = "default_parallel_limit")]
    pub parallel_limit: usize,
}

fn default_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dim() -> usize {
    DEFAULT_EMBEDDING_DIM
}

fn default_top_k() -> usize {
    50
}

fn default_true() -> bool {
    true
}

fn default_parallel_limit() -> usize {
    3
}

impl Default for RetrievalRequest {
    fn default() -> Self {
        Self {
            q: None,
            embedding: None,
            model: default_model(),
            dim: default_dim(),
            fts_k: None,
            vector_k: None,
            top_k: default_top_k(),
            translation: None,
            include_parallels: default_true(),
            parallel_limit: default_parallel_limit(),
        }
    }
}

impl RetrievalRequest {
    /// Text-only request
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            q: Some(text.into()),
            ..Default::default()
        }
    }

    /// Embedding-only request
    pub fn embedding(embedding: Vec<f32>, dim: usize) -> Self {
        Self::default().with_embedding(embedding, dim)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.q = Some(text.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>, dim: usize) -> Self {
        self.embedding = Some(embedding);
        self.dim = dim;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.translation = Some(source.into());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_branch_limits(mut self, fts_k: Option<usize>, vector_k: Option<usize>) -> Self {
        self.fts_k = fts_k;
        self.vector_k = vector_k;
        self
    }

    pub fn with_parallels(mut self, include: bool, limit: usize) -> Self {
        self.include_parallels = include;
        self.parallel_limit = limit;
        self
    }

    /// Check every precondition and produce a query the orchestrator accepts.
    pub fn validate(self) -> Result<RetrievalQuery, QueryError> {
        if self.q.is_none() && self.embedding.is_none() {
            return Err(QueryError::MissingSignal);
        }

        if self.q.as_deref().is_some_and(|text| text.trim().is_empty()) {
            return Err(QueryError::EmptyText);
        }

        if let Some(embedding) = &self.embedding {
            check_range("dim", self.dim, 1, MAX_EMBEDDING_DIM)?;
            if embedding.len() != self.dim {
                return Err(QueryError::DimensionMismatch {
                    expected: self.dim,
                    actual: embedding.len(),
                });
            }
            if let Some(index) = embedding.iter().position(|value| !value.is_finite()) {
                return Err(QueryError::NonFiniteEmbedding { index });
            }
        }

        if let Some(fts_k) = self.fts_k {
            check_range("fts_k", fts_k, 1, MAX_BRANCH_K)?;
        }
        if let Some(vector_k) = self.vector_k {
            check_range("vector_k", vector_k, 1, MAX_BRANCH_K)?;
        }
        check_range("top_k", self.top_k, 1, MAX_TOP_K)?;
        check_range("parallel_limit", self.parallel_limit, 0, MAX_PARALLEL_LIMIT)?;

        Ok(RetrievalQuery { request: self })
    }
}

fn check_range(
    field: &'static str,
    value: usize,
    min: usize,
    max: usize,
) -> Result<(), QueryError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(QueryError::LimitOutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

/// A request that passed validation. Only obtainable through
/// [`RetrievalRequest::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    request: RetrievalRequest,
}

impl RetrievalQuery {
    pub fn text(&self) -> Option<&str> {
        self.request.q.as_deref()
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.request.embedding.as_deref()
    }

    pub fn dim(&self) -> usize {
        self.request.dim
    }

    pub fn model(&self) -> &str {
        &self.request.model
    }

    pub fn source(&self) -> Option<&str> {
        self.request.translation.as_deref()
    }

    pub fn fts_k(&self) -> Option<usize> {
        self.request.fts_k
    }

    pub fn vector_k(&self) -> Option<usize> {
        self.request.vector_k
    }

    pub fn top_k(&self) -> usize {
        self.request.top_k
    }

    pub fn include_parallels(&self) -> bool {
        self.request.include_parallels
    }

    pub fn parallel_limit(&self) -> usize {
        self.request.parallel_limit
    }

    pub fn is_hybrid(&self) -> bool {
        self.request.q.is_some() && self.request.embedding.is_some()
    }
}

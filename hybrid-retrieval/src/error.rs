use crate::result::Branch;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A caller-supplied query violated a precondition. Always a client fault.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("query must supply free text, an embedding, or both")]
    MissingSignal,

    #[error("query text must not be blank")]
    EmptyText,

    #[error("embedding length {actual} does not match dim {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding component {index} is not a finite number")]
    NonFiniteEmbedding { index: usize },

    #[error("{field} must be in [{min}, {max}], got {value}")]
    LimitOutOfRange {
        field: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },
}

/// The manifest could not be loaded or failed validation. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read manifest {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid fusion configuration: {0}")]
    Invalid(String),
}

/// Failure reported by a lexical, vector or graph store adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider timed out after {after_ms}ms")]
    TimedOut { after_ms: u64 },

    #[error("provider returned malformed data: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("failed to read corpus {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed corpus: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate passage id: {0}")]
    DuplicateId(String),
}

/// A search branch that was issued and failed.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchFailure {
    pub branch: Branch,
    pub error: ProviderError,
}

impl fmt::Display for BranchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.branch, self.error)
    }
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    #[error("no search branch produced results ({})", describe_failures(.0))]
    ProviderUnavailable(Vec<BranchFailure>),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("retrieval cancelled")]
    Cancelled,
}

impl RetrievalError {
    /// True when the caller is at fault and retrying the same request is pointless.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, RetrievalError::InvalidQuery(_))
    }

    /// Message safe to show a caller. Server faults never carry provider detail.
    pub fn public_message(&self) -> String {
        match self {
            RetrievalError::InvalidQuery(err) => err.to_string(),
            RetrievalError::Cancelled => "retrieval cancelled".to_string(),
            RetrievalError::ProviderUnavailable(_) | RetrievalError::Configuration(_) => {
                "retrieval failed".to_string()
            }
        }
    }
}

fn describe_failures(failures: &[BranchFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

use anyhow::{Context, Result};
use clap::Parser;
use haven_hybrid_retrieval::{
    BranchStatus, DEFAULT_EMBEDDING_MODEL, FusionMethod, InMemoryCorpus, Manifest,
    OrchestratorOptions, RetrievalError, RetrievalOrchestrator, RetrievalRequest,
    RetrievalResponse,
};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// Free-text query for the lexical branch
    #[arg(value_name = "TEXT")]
    pub text: Option<String>,

    /// Index manifest carrying the fusion configuration
    #[arg(long, env = "MANIFEST_PATH", value_name = "PATH")]
    pub manifest: PathBuf,

    /// JSON passage corpus to search
    #[arg(long, env = "CORPUS_PATH", value_name = "PATH")]
    pub corpus: PathBuf,

    /// Query embedding as comma-separated floats
    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        value_name = "F32,.."
    )]
    pub embedding: Option<Vec<f32>>,

    /// Declared embedding dimensionality (defaults to the embedding's length)
    #[arg(long, value_name = "N")]
    pub dim: Option<usize>,

    /// Embedding model name
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL)]
    pub model: String,

    /// Restrict both branches to one source variant
    #[arg(long, visible_alias = "translation", value_name = "SOURCE")]
    pub source: Option<String>,

    /// Number of fused results to return
    #[arg(short = 'n', long, default_value_t = 10)]
    pub top_k: usize,

    /// Lexical candidates to fetch (manifest default when omitted)
    #[arg(long, value_name = "N")]
    pub fts_k: Option<usize>,

    /// Vector candidates to fetch (manifest default when omitted)
    #[arg(long, value_name = "N")]
    pub vector_k: Option<usize>,

    /// Parallel renditions wanted per hit
    #[arg(long, default_value_t = 3, value_name = "N")]
    pub parallel_limit: usize,

    /// Skip graph expansion
    #[arg(long)]
    pub no_parallels: bool,

    /// Per provider call timeout
    #[arg(long, default_value_t = 5000, value_name = "MS")]
    pub timeout_ms: u64,

    /// Print the response as JSON
    #[arg(long)]
    pub json: bool,
}

impl QueryArgs {
    pub fn to_request(&self) -> RetrievalRequest {
        let mut request = RetrievalRequest {
            q: self.text.clone(),
            model: self.model.clone(),
            fts_k: self.fts_k,
            vector_k: self.vector_k,
            top_k: self.top_k,
            translation: self.source.clone(),
            include_parallels: !self.no_parallels,
            parallel_limit: self.parallel_limit,
            ..Default::default()
        };

        if let Some(embedding) = &self.embedding {
            request.dim = self.dim.unwrap_or(embedding.len());
            request.embedding = Some(embedding.clone());
        } else if let Some(dim) = self.dim {
            request.dim = dim;
        }

        request
    }
}

pub async fn run_query(args: QueryArgs) -> Result<()> {
    let manifest = Manifest::from_path(&args.manifest).context("Failed to load manifest")?;
    let corpus =
        Arc::new(InMemoryCorpus::from_path(&args.corpus).context("Failed to load corpus")?);
    if corpus.is_empty() {
        warn!(path = %args.corpus.display(), "corpus has no passages");
    } else {
        info!(passages = corpus.len(), "corpus loaded");
    }

    let orchestrator = RetrievalOrchestrator::new(
        manifest.into_shared(),
        corpus.clone(),
        corpus.clone(),
        corpus,
    )?
    .with_options(OrchestratorOptions {
        provider_timeout: Duration::from_millis(args.timeout_ms),
        ..Default::default()
    });

    let query = args.to_request().validate().map_err(RetrievalError::from)?;

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling retrieval");
            canceller.cancel();
        }
    });

    let response = orchestrator.retrieve_or_cancel(&query, &token).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }

    Ok(())
}

fn print_response(response: &RetrievalResponse) {
    if response.is_empty() {
        println!("{} No results", "▶".bright_blue());
    }

    for (i, item) in response.items.iter().enumerate() {
        let mut ranks = Vec::new();
        if let Some(rank) = item.lexical_rank {
            ranks.push(format!("lexical #{rank}"));
        }
        if let Some(rank) = item.vector_rank {
            ranks.push(format!("vector #{rank}"));
        }

        println!(
            "{}. {} {} {}",
            i + 1,
            item.hit.id.bold(),
            format!("score {:.4}", item.hit.score).green(),
            format!("[{}]", ranks.join(", ")).dimmed()
        );
        println!("   {}", item.hit.text);

        if let Some(expansion) = &item.parallels {
            for rendition in &expansion.renditions {
                println!(
                    "   {} {} {} {}",
                    "↳".bright_blue(),
                    rendition.variant.bold(),
                    rendition.reference.dimmed(),
                    rendition.text
                );
            }
        }
    }

    let fusion = &response.fusion;
    let method = match fusion.method {
        FusionMethod::Rrf => format!("rrf (k {})", fusion.k),
        FusionMethod::WeightedSum => format!(
            "weighted_sum (lexical {}, vector {})",
            fusion.weights.lexical, fusion.weights.vector
        ),
    };
    println!();
    println!(
        "{} {} results via {method}; lexical {}, vector {}",
        "▶".bright_blue(),
        response.total,
        describe(&fusion.lexical),
        describe(&fusion.vector)
    );

    if fusion.degraded {
        println!("{}", "  degraded: a search branch failed".yellow());
    }
    if fusion.graph_expansion.failed_hits > 0 {
        println!(
            "{}",
            format!(
                "  parallels unavailable for {} hits",
                fusion.graph_expansion.failed_hits
            )
            .yellow()
        );
    }
}

fn describe(status: &BranchStatus) -> String {
    match status {
        BranchStatus::Skipped => "skipped".to_string(),
        BranchStatus::Completed { hits } => format!("{hits} hits"),
        BranchStatus::Failed => "failed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args() -> QueryArgs {
        QueryArgs {
            text: Some("shepherd".to_string()),
            manifest: PathBuf::from("manifest.json"),
            corpus: PathBuf::from("corpus.json"),
            embedding: None,
            dim: None,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            source: Some("KJV".to_string()),
            top_k: 5,
            fts_k: Some(20),
            vector_k: None,
            parallel_limit: 2,
            no_parallels: false,
            timeout_ms: 5000,
            json: false,
        }
    }

    #[test]
    fn test_embedding_length_is_default_dim() {
        let request = QueryArgs {
            embedding: Some(vec![0.1, 0.2, 0.3]),
            ..args()
        }
        .to_request();

        assert_eq!(request.dim, 3);
        assert_eq!(request.translation.as_deref(), Some("KJV"));
        assert_eq!(request.fts_k, Some(20));
        assert!(request.include_parallels);
    }

    #[test]
    fn test_explicit_dim_is_kept() {
        let request = QueryArgs {
            embedding: Some(vec![0.1, 0.2, 0.3]),
            dim: Some(768),
            no_parallels: true,
            ..args()
        }
        .to_request();

        assert_eq!(request.dim, 768);
        assert!(!request.include_parallels);
        assert!(request.validate().is_err());
    }
}

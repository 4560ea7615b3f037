//! In-memory passage store implementing all three provider seams. Backs the
//! `haven` CLI and the integration tests; production deployments plug real
//! store clients into the same traits.

use crate::error::{CorpusError, ProviderError};
use crate::provider::{
    GraphExpansionProvider, LexicalSearchProvider, LexicalSearchRequest, VectorSearchProvider,
    VectorSearchRequest,
};
use crate::result::{ParallelRendition, ParallelSet, ScoredHit};
use async_trait::async_trait;
use log::debug;
use nucleo_matcher::{Config, Matcher, Utf32Str};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One unit of retrievable text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,

    /// Source variant (e.g. translation code)
    pub source: String,

    #[serde(default)]
    pub reference: String,

    pub text: String,

    /// Shared by every rendition of the same underlying passage
    #[serde(default)]
    pub canonical_key: Option<String>,

    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// Passages held in memory with lexical, vector and graph lookups
pub struct InMemoryCorpus {
    passages: Vec<Passage>,
    /// Lowercased text used for term matching
    search_texts: Vec<String>,
    by_key: HashMap<String, Vec<usize>>,
    by_id: HashMap<String, usize>,
}

impl InMemoryCorpus {
    pub fn new(passages: Vec<Passage>) -> Result<Self, CorpusError> {
        let mut by_id = HashMap::with_capacity(passages.len());
        let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, passage) in passages.iter().enumerate() {
            if by_id.insert(passage.id.clone(), idx).is_some() {
                return Err(CorpusError::DuplicateId(passage.id.clone()));
            }
            if let Some(key) = &passage.canonical_key {
                by_key.entry(key.clone()).or_default().push(idx);
            }
        }

        let search_texts = passages.iter().map(|p| p.text.to_lowercase()).collect();

        Ok(Self {
            passages,
            search_texts,
            by_key,
            by_id,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CorpusError> {
        let passages: Vec<Passage> = serde_json::from_str(raw)?;
        Self::new(passages)
    }

    pub fn from_path(path: &Path) -> Result<Self, CorpusError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Get number of passages
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    fn in_source(passage: &Passage, source: Option<&str>) -> bool {
        source.is_none_or(|source| passage.source.eq_ignore_ascii_case(source))
    }

    /// Passages matching any query term, ranked by how many terms they
    /// contain and then by match quality. The score is the fraction of
    /// query terms found.
    fn term_search(&self, request: &LexicalSearchRequest<'_>) -> Vec<ScoredHit> {
        let terms = tokenize(request.text);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut matcher = Matcher::new(Config::DEFAULT);
        let mut haystack_buf: Vec<char> = Vec::new();
        let mut needle_buf: Vec<char> = Vec::new();
        let mut matches: Vec<(usize, usize, u32)> = Vec::new();

        for (idx, passage) in self.passages.iter().enumerate() {
            if !Self::in_source(passage, request.source) {
                continue;
            }

            let mut matched = 0;
            let mut quality = 0u32;
            for term in &terms {
                let haystack = Utf32Str::new(&self.search_texts[idx], &mut haystack_buf);
                let needle = Utf32Str::new(term, &mut needle_buf);
                if let Some(score) = matcher.substring_match(haystack, needle) {
                    matched += 1;
                    quality += u32::from(score);
                }
            }

            if matched > 0 {
                matches.push((idx, matched, quality));
            }
        }

        matches.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));
        matches.truncate(request.limit);

        debug!(
            "Term search for '{}' matched {} passages",
            request.text,
            matches.len()
        );

        let term_count = terms.len() as f32;
        matches
            .into_iter()
            .map(|(idx, matched, _)| {
                let passage = &self.passages[idx];
                ScoredHit::new(&passage.id, &passage.text, matched as f32 / term_count)
            })
            .collect()
    }

    /// Cosine similarity against every embedded passage of the declared
    /// dimensionality; negative similarities are clamped to 0.
    fn nearest(&self, request: &VectorSearchRequest<'_>) -> Vec<ScoredHit> {
        let Some(query_norm) = norm(request.embedding) else {
            return Vec::new();
        };

        let mut scored: Vec<(usize, f32)> = self
            .passages
            .iter()
            .enumerate()
            .filter(|(_, passage)| Self::in_source(passage, request.source))
            .filter_map(|(idx, passage)| {
                let embedding = passage.embedding.as_deref()?;
                if embedding.len() != request.dim || embedding.len() != request.embedding.len() {
                    return None;
                }
                let passage_norm = norm(embedding)?;
                let dot: f32 = embedding
                    .iter()
                    .zip(request.embedding)
                    .map(|(a, b)| a * b)
                    .sum();
                Some((idx, (dot / (passage_norm * query_norm)).max(0.0)))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(request.limit);

        scored
            .into_iter()
            .map(|(idx, score)| {
                let passage = &self.passages[idx];
                ScoredHit::new(&passage.id, &passage.text, score)
            })
            .collect()
    }

    /// Every passage sharing `hit_id`'s canonical key, ordered by source.
    fn parallels(&self, hit_id: &str, max_results: usize) -> ParallelSet {
        let Some(key) = self
            .by_id
            .get(hit_id)
            .and_then(|idx| self.passages[*idx].canonical_key.as_ref())
        else {
            return ParallelSet::default();
        };

        let mut renditions: Vec<ParallelRendition> = self
            .by_key
            .get(key)
            .into_iter()
            .flatten()
            .map(|idx| {
                let passage = &self.passages[*idx];
                ParallelRendition {
                    id: passage.id.clone(),
                    variant: passage.source.clone(),
                    reference: passage.reference.clone(),
                    text: passage.text.clone(),
                }
            })
            .collect();

        renditions.sort_by(|a, b| a.variant.cmp(&b.variant).then_with(|| a.id.cmp(&b.id)));
        renditions.truncate(max_results);

        ParallelSet {
            canonical_key: Some(key.clone()),
            renditions,
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
    {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

fn norm(vector: &[f32]) -> Option<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    (norm > 0.0 && norm.is_finite()).then_some(norm)
}

#[async_trait]
impl LexicalSearchProvider for InMemoryCorpus {
    async fn search(
        &self,
        request: LexicalSearchRequest<'_>,
    ) -> Result<Vec<ScoredHit>, ProviderError> {
        Ok(self.term_search(&request))
    }
}

#[async_trait]
impl VectorSearchProvider for InMemoryCorpus {
    async fn search(
        &self,
        request: VectorSearchRequest<'_>,
    ) -> Result<Vec<ScoredHit>, ProviderError> {
        if request.embedding.len() != request.dim {
            return Err(ProviderError::Malformed(format!(
                "embedding length {} does not match dim {}",
                request.embedding.len(),
                request.dim
            )));
        }
        Ok(self.nearest(&request))
    }
}

#[async_trait]
impl GraphExpansionProvider for InMemoryCorpus {
    async fn expand(
        &self,
        hit_id: &str,
        max_results: usize,
    ) -> Result<ParallelSet, ProviderError> {
        Ok(self.parallels(hit_id, max_results))
    }

    fn orders_renditions(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn passage(id: &str, source: &str, text: &str, key: &str, embedding: Vec<f32>) -> Passage {
        Passage {
            id: id.to_string(),
            source: source.to_string(),
            reference: "Psalm 23:1".to_string(),
            text: text.to_string(),
            canonical_key: Some(key.to_string()),
            embedding: Some(embedding),
        }
    }

    fn corpus() -> InMemoryCorpus {
        InMemoryCorpus::new(vec![
            passage(
                "KJV_19_23_1_",
                "KJV",
                "The LORD is my shepherd; I shall not want.",
                "19:23:1:",
                vec![1.0, 0.0, 0.0],
            ),
            passage(
                "WEB_19_23_1_",
                "WEB",
                "Yahweh is my shepherd: I shall lack nothing.",
                "19:23:1:",
                vec![0.9, 0.1, 0.0],
            ),
            passage(
                "KJV_43_10_11_",
                "KJV",
                "I am the good shepherd: the good shepherd giveth his life for the sheep.",
                "43:10:11:",
                vec![0.0, 1.0, 0.0],
            ),
            passage(
                "KJV_1_1_1_",
                "KJV",
                "In the beginning God created the heaven and the earth.",
                "1:1:1:",
                vec![-1.0, 0.0, 0.0],
            ),
        ])
        .unwrap()
    }

    fn lexical<'a>(
        text: &'a str,
        source: Option<&'static str>,
        limit: usize,
    ) -> LexicalSearchRequest<'a> {
        LexicalSearchRequest {
            text,
            source,
            limit,
        }
    }

    #[test]
    fn test_term_search_ranks_by_matched_terms() {
        let corpus = corpus();

        let hits = corpus.term_search(&lexical("good shepherd", None, 10));

        assert_eq!(hits[0].id, "KJV_43_10_11_");
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits.len(), 3);
        assert!(hits[1..].iter().all(|h| h.score == 0.5));
    }

    #[test]
    fn test_term_search_is_case_insensitive_and_filters_source() {
        let corpus = corpus();

        let hits = corpus.term_search(&lexical("SHEPHERD", Some("web"), 10));

        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["WEB_19_23_1_"]);
    }

    #[test]
    fn test_term_search_no_terms() {
        let corpus = corpus();
        assert!(corpus.term_search(&lexical("  ;; ", None, 10)).is_empty());
        assert!(corpus.term_search(&lexical("leviathan", None, 10)).is_empty());
    }

    #[test]
    fn test_nearest_cosine_ordering() {
        let corpus = corpus();
        let embedding = [1.0, 0.0, 0.0];

        let hits = corpus.nearest(&VectorSearchRequest {
            embedding: &embedding,
            dim: 3,
            model: "embeddinggemma",
            source: None,
            limit: 10,
        });

        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["KJV_19_23_1_", "WEB_19_23_1_", "KJV_43_10_11_", "KJV_1_1_1_"]
        );
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[3].score, 0.0);
    }

    #[test]
    fn test_nearest_skips_other_dimensions() {
        let corpus = corpus();
        let embedding = [1.0, 0.0];

        let hits = corpus.nearest(&VectorSearchRequest {
            embedding: &embedding,
            dim: 2,
            model: "embeddinggemma",
            source: None,
            limit: 10,
        });

        assert!(hits.is_empty());
    }

    #[test]
    fn test_parallels_share_canonical_key() {
        let corpus = corpus();

        let set = corpus.parallels("WEB_19_23_1_", 10);

        assert_eq!(set.canonical_key.as_deref(), Some("19:23:1:"));
        let variants: Vec<&str> = set.renditions.iter().map(|r| r.variant.as_str()).collect();
        assert_eq!(variants, vec!["KJV", "WEB"]);
        assert_eq!(corpus.parallels("unknown", 10), ParallelSet::default());
    }

    #[test]
    fn test_empty_corpus() {
        let corpus = InMemoryCorpus::from_json_str("[]").unwrap();
        assert!(corpus.is_empty());
        assert_eq!(corpus.len(), 0);
        assert!(!self::corpus().is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = InMemoryCorpus::from_json_str(
            r#"[
                { "id": "a", "source": "KJV", "text": "one" },
                { "id": "a", "source": "WEB", "text": "two" }
            ]"#,
        )
        .err()
        .unwrap();
        assert!(matches!(err, CorpusError::DuplicateId(id) if id == "a"));
    }
}

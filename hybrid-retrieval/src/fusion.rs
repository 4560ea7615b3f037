use crate::config::{FusionConfig, FusionMethod};
use crate::result::{Branch, FusedHit, ScoredHit};
use log::debug;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Fusion engine combining the lexical and vector rankings
#[derive(Debug, Clone)]
pub struct FusionEngine {
    config: FusionConfig,
}

/// A hit being fused. Position in the candidate list is discovery order:
/// lexical hits first, in rank order, then vector-only hits.
struct Candidate {
    fused: FusedHit,
    lexical_score: Option<f32>,
    vector_score: Option<f32>,
    discovery: usize,
}

impl FusionEngine {
    /// Create new fusion engine
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Fuse two best-first branch rankings into at most `top_k` hits,
    /// deduplicated by identifier and sorted by descending fused score.
    pub fn fuse(
        &self,
        lexical: Vec<ScoredHit>,
        vector: Vec<ScoredHit>,
        top_k: usize,
    ) -> Vec<FusedHit> {
        debug!(
            "{} fusion: {} lexical + {} vector (top_k {})",
            self.config.method.as_str(),
            lexical.len(),
            vector.len(),
            top_k
        );

        if top_k == 0 || (lexical.is_empty() && vector.is_empty()) {
            return Vec::new();
        }

        let mut candidates = Self::collect(lexical, vector);

        match self.config.method {
            FusionMethod::Rrf => self.reciprocal_rank_scores(&mut candidates),
            FusionMethod::WeightedSum => self.weighted_sum_scores(&mut candidates),
        }

        let priority = self.config.weights().priority();
        candidates.sort_by(|a, b| Self::compare(a, b, priority));
        candidates.truncate(top_k);

        debug!("Fusion produced {} results", candidates.len());
        candidates.into_iter().map(|c| c.fused).collect()
    }

    /// Merge both branches by identifier, recording each hit's 1-based rank
    /// and raw score per branch. A repeated identifier within one branch
    /// keeps only its first (best) position.
    fn collect(lexical: Vec<ScoredHit>, vector: Vec<ScoredHit>) -> Vec<Candidate> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut candidates: Vec<Candidate> = Vec::with_capacity(lexical.len() + vector.len());

        for (position, hit) in lexical.into_iter().enumerate() {
            let rank = position + 1;
            if let Entry::Vacant(slot) = index.entry(hit.id.clone()) {
                slot.insert(candidates.len());
                candidates.push(Candidate {
                    lexical_score: Some(hit.score),
                    vector_score: None,
                    discovery: candidates.len(),
                    fused: FusedHit {
                        hit,
                        lexical_rank: Some(rank),
                        vector_rank: None,
                    },
                });
            }
        }

        for (position, hit) in vector.into_iter().enumerate() {
            let rank = position + 1;
            match index.entry(hit.id.clone()) {
                Entry::Occupied(slot) => {
                    let candidate = &mut candidates[*slot.get()];
                    if candidate.fused.vector_rank.is_none() {
                        candidate.fused.vector_rank = Some(rank);
                        candidate.vector_score = Some(hit.score);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(candidates.len());
                    candidates.push(Candidate {
                        lexical_score: None,
                        vector_score: Some(hit.score),
                        discovery: candidates.len(),
                        fused: FusedHit {
                            hit,
                            lexical_rank: None,
                            vector_rank: Some(rank),
                        },
                    });
                }
            }
        }

        candidates
    }

    /// Reciprocal Rank Fusion (RRF)
    /// RRF(d) = Σ 1 / (k + rank(d))
    /// where k is the configured constant and rank(d) is d's 1-based rank in
    /// each branch that returned it. Branch weights do not apply.
    fn reciprocal_rank_scores(&self, candidates: &mut [Candidate]) {
        let k = self.config.k as f32;
        let contribution = |rank: Option<usize>| rank.map_or(0.0, |r| 1.0 / (k + r as f32));

        for candidate in candidates.iter_mut() {
            let fused = &mut candidate.fused;
            fused.hit.score = contribution(fused.lexical_rank) + contribution(fused.vector_rank);
        }
    }

    /// Weighted sum of min-max normalised branch scores.
    /// Normalisation is per branch, per request: the branch's best score maps
    /// to 1.0 and its worst to 0.0; a branch whose scores are all equal maps
    /// every hit to 1.0. Non-finite provider scores count as 0.0.
    fn weighted_sum_scores(&self, candidates: &mut [Candidate]) {
        let weights = self.config.weights();
        let lexical_range = score_range(candidates.iter().filter_map(|c| c.lexical_score));
        let vector_range = score_range(candidates.iter().filter_map(|c| c.vector_score));

        for candidate in candidates.iter_mut() {
            let lexical = candidate
                .lexical_score
                .zip(lexical_range)
                .map_or(0.0, |(score, range)| normalize(score, range));
            let vector = candidate
                .vector_score
                .zip(vector_range)
                .map_or(0.0, |(score, range)| normalize(score, range));

            candidate.fused.hit.score = weights.lexical * lexical + weights.vector * vector;
        }
    }

    /// Descending fused score; ties go to (a) hits found by both branches,
    /// (b) the better rank in the priority branch, then in the other branch,
    /// (c) discovery order.
    fn compare(a: &Candidate, b: &Candidate, priority: Branch) -> Ordering {
        b.fused
            .hit
            .score
            .total_cmp(&a.fused.hit.score)
            .then_with(|| b.fused.branch_count().cmp(&a.fused.branch_count()))
            .then_with(|| compare_rank(a.fused.rank_in(priority), b.fused.rank_in(priority)))
            .then_with(|| {
                compare_rank(
                    a.fused.rank_in(priority.other()),
                    b.fused.rank_in(priority.other()),
                )
            })
            .then_with(|| a.discovery.cmp(&b.discovery))
    }
}

/// Present beats absent; otherwise the lower rank wins.
fn compare_rank(a: Option<usize>, b: Option<usize>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn sanitize(score: f32) -> f32 {
    if score.is_finite() { score } else { 0.0 }
}

fn score_range(scores: impl Iterator<Item = f32>) -> Option<(f32, f32)> {
    scores.map(sanitize).fold(None, |range, score| match range {
        None => Some((score, score)),
        Some((min, max)) => Some((min.min(score), max.max(score))),
    })
}

fn normalize(score: f32, (min, max): (f32, f32)) -> f32 {
    let span = max - min;
    if span > 0.0 {
        (sanitize(score) - min) / span
    } else {
        1.0
    }
}

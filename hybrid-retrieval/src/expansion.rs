use crate::error::ProviderError;
use crate::provider::GraphExpansionProvider;
use crate::result::{GraphExpansion, ParallelSet};
use futures::future::join_all;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Per-request result of expanding every fused hit.
#[derive(Debug, Default)]
pub(crate) struct ExpansionOutcome {
    /// One slot per input hit, same order. `None` means the lookup failed.
    pub expansions: Vec<Option<GraphExpansion>>,
    pub failed: usize,
}

/// Fans graph lookups out over a request's hits with a fixed concurrency cap.
pub(crate) struct GraphExpander {
    provider: Arc<dyn GraphExpansionProvider>,
    concurrency: usize,
    timeout: Duration,
}

impl GraphExpander {
    pub(crate) fn new(
        provider: Arc<dyn GraphExpansionProvider>,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// Look up parallels for each hit, keeping at most `per_hit_limit`
    /// renditions per hit. Failures only affect their own slot.
    pub(crate) async fn expand_all(
        &self,
        hit_ids: &[&str],
        per_hit_limit: usize,
    ) -> ExpansionOutcome {
        debug!(
            "Expanding {} hits (limit {per_hit_limit}, concurrency {})",
            hit_ids.len(),
            self.concurrency
        );

        // Cap is per request.
        let semaphore = Semaphore::new(self.concurrency);
        let lookups = hit_ids
            .iter()
            .map(|hit_id| self.expand_one(&semaphore, hit_id, per_hit_limit));
        let expansions = join_all(lookups).await;

        let failed = expansions.iter().filter(|slot| slot.is_none()).count();
        if failed > 0 {
            warn!("Graph expansion unavailable for {failed} of {} hits", hit_ids.len());
        }

        ExpansionOutcome { expansions, failed }
    }

    async fn expand_one(
        &self,
        semaphore: &Semaphore,
        hit_id: &str,
        per_hit_limit: usize,
    ) -> Option<GraphExpansion> {
        let _permit = semaphore.acquire().await.ok()?;

        // One extra slot: providers usually return the hit's own rendition too.
        let lookup = self.provider.expand(hit_id, per_hit_limit + 1);
        let outcome = match timeout(self.timeout, lookup).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::TimedOut {
                after_ms: self.timeout.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(set) => Some(self.shape(hit_id, set, per_hit_limit)),
            Err(err) => {
                warn!("Graph expansion failed for {hit_id}: {err}");
                None
            }
        }
    }

    fn shape(&self, hit_id: &str, set: ParallelSet, per_hit_limit: usize) -> GraphExpansion {
        let mut renditions: Vec<_> = set
            .renditions
            .into_iter()
            .filter(|rendition| rendition.id != hit_id)
            .collect();

        if !self.provider.orders_renditions() {
            renditions.sort_by(|a, b| a.variant.cmp(&b.variant));
        }
        renditions.truncate(per_hit_limit);

        GraphExpansion {
            hit_id: hit_id.to_string(),
            canonical_key: set.canonical_key,
            renditions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ParallelRendition;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rendition(id: &str, variant: &str) -> ParallelRendition {
        ParallelRendition {
            id: id.to_string(),
            variant: variant.to_string(),
            reference: "John 3:16".to_string(),
            text: format!("{variant} text"),
        }
    }

    /// Returns WEB, KJV, ASV renditions (unsorted) for every id except
    /// `fail_id`, and records peak concurrency.
    struct CountingGraph {
        fail_id: Option<&'static str>,
        ordered: bool,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingGraph {
        fn new() -> Self {
            Self {
                fail_id: None,
                ordered: false,
                delay: Duration::from_millis(5),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GraphExpansionProvider for CountingGraph {
        async fn expand(
            &self,
            hit_id: &str,
            _max_results: usize,
        ) -> Result<ParallelSet, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_id == Some(hit_id) {
                return Err(ProviderError::Unavailable("bolt connection reset".to_string()));
            }

            Ok(ParallelSet {
                canonical_key: Some(format!("cvk:{hit_id}")),
                renditions: vec![
                    rendition(&format!("WEB_{hit_id}"), "WEB"),
                    rendition(hit_id, "KJV"),
                    rendition(&format!("ASV_{hit_id}"), "ASV"),
                ],
            })
        }

        fn orders_renditions(&self) -> bool {
            self.ordered
        }
    }

    #[tokio::test]
    async fn test_excludes_self_and_sorts_by_variant() {
        let expander =
            GraphExpander::new(Arc::new(CountingGraph::new()), 4, Duration::from_secs(1));

        let outcome = expander.expand_all(&["h1"], 5).await;

        let expansion = outcome.expansions[0].as_ref().unwrap();
        let variants: Vec<&str> = expansion
            .renditions
            .iter()
            .map(|r| r.variant.as_str())
            .collect();
        assert_eq!(variants, vec!["ASV", "WEB"]);
        assert_eq!(expansion.canonical_key.as_deref(), Some("cvk:h1"));
        assert_eq!(outcome.failed, 0);
    }

    #[tokio::test]
    async fn test_keeps_provider_order_when_provider_orders() {
        let graph = CountingGraph {
            ordered: true,
            ..CountingGraph::new()
        };
        let expander = GraphExpander::new(Arc::new(graph), 4, Duration::from_secs(1));

        let outcome = expander.expand_all(&["h1"], 1).await;

        let expansion = outcome.expansions[0].as_ref().unwrap();
        assert_eq!(expansion.renditions.len(), 1);
        assert_eq!(expansion.renditions[0].variant, "WEB");
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_its_hit() {
        let graph = CountingGraph {
            fail_id: Some("h2"),
            ..CountingGraph::new()
        };
        let expander = GraphExpander::new(Arc::new(graph), 4, Duration::from_secs(1));

        let outcome = expander.expand_all(&["h1", "h2", "h3"], 3).await;

        assert!(outcome.expansions[0].is_some());
        assert!(outcome.expansions[1].is_none());
        assert!(outcome.expansions[2].is_some());
        assert_eq!(outcome.failed, 1);
    }

    #[tokio::test]
    async fn test_fan_out_is_bounded() {
        let graph = Arc::new(CountingGraph::new());
        let expander = GraphExpander::new(graph.clone(), 2, Duration::from_secs(1));
        let ids: Vec<String> = (0..12).map(|i| format!("h{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();

        let outcome = expander.expand_all(&refs, 3).await;

        assert_eq!(outcome.expansions.len(), 12);
        assert!(graph.peak.load(Ordering::SeqCst) <= 2);
        assert!(graph.peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_degrades_to_no_expansion() {
        let graph = CountingGraph {
            delay: Duration::from_secs(30),
            ..CountingGraph::new()
        };
        let expander = GraphExpander::new(Arc::new(graph), 2, Duration::from_millis(100));

        let outcome = expander.expand_all(&["slow"], 3).await;

        assert!(outcome.expansions[0].is_none());
        assert_eq!(outcome.failed, 1);
    }
}

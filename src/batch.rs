use std::sync::Arc;

use futures_util::{stream, StreamExt};
use serde_json::json;

use crate::health::LivenessProbe;
use crate::logging::Logger;
use crate::stations::{StationMap, VerificationResult};

/// Fans liveness probes out over a bounded number of in-flight requests.
#[derive(Clone)]
pub struct BatchVerifier {
    probe: Arc<dyn LivenessProbe>,
    logger: Logger,
}

impl BatchVerifier {
    pub fn new(probe: Arc<dyn LivenessProbe>, logger: Logger) -> Self {
        Self { probe, logger }
    }

    /// One result per entry, in completion order. Nothing is retried within
    /// a pass.
    pub async fn verify_results(
        &self,
        entries: &StationMap,
        max_workers: usize,
    ) -> Vec<VerificationResult> {
        let probe = &self.probe;
        stream::iter(entries.iter())
            .map(|(id, url)| async move {
                let alive = probe.is_alive(url).await;
                VerificationResult {
                    id: id.clone(),
                    alive,
                }
            })
            .buffer_unordered(max_workers.max(1))
            .collect::<Vec<_>>()
            .await
    }

    /// The subset of `entries` whose URL answered the probe, with the
    /// original URLs untouched.
    pub async fn verify_all(&self, entries: &StationMap, max_workers: usize) -> StationMap {
        let total = entries.len();
        self.logger.info(
            "verify.batch.started",
            json!({ "total": total, "maxWorkers": max_workers.max(1) }),
        );

        let mut working = StationMap::new();
        for result in self.verify_results(entries, max_workers).await {
            self.logger.debug(
                "verify.station",
                json!({ "stationId": result.id, "alive": result.alive }),
            );
            if !result.alive {
                continue;
            }
            if let Some(url) = entries.get(&result.id) {
                working.insert(result.id, url.clone());
            }
        }

        self.logger.info(
            "verify.batch.completed",
            json!({
                "working": working.len(),
                "total": total,
                "summary": format!("{}/{} working", working.len(), total),
            }),
        );
        working
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeProbe {
        alive: HashSet<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeProbe {
        fn new(alive: &[&str]) -> Self {
            Self {
                alive: alive.iter().map(|url| url.to_string()).collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LivenessProbe for FakeProbe {
        async fn is_alive(&self, url: &str) -> bool {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.alive.contains(url)
        }
    }

    fn entries() -> StationMap {
        (0..12)
            .map(|idx| (format!("st{idx}-riyadh-SA"), format!("https://s{idx}.example/live")))
            .collect()
    }

    #[tokio::test]
    async fn returns_only_alive_subset_with_original_urls() {
        let probe = Arc::new(FakeProbe::new(&[
            "https://s1.example/live",
            "https://s7.example/live",
        ]));
        let verifier = BatchVerifier::new(probe, Logger::silent());
        let input = entries();

        let working = verifier.verify_all(&input, 4).await;

        assert_eq!(working.len(), 2);
        for (id, url) in &working {
            assert_eq!(input.get(id), Some(url));
        }
        assert!(working.contains_key("st1-riyadh-SA"));
        assert!(working.contains_key("st7-riyadh-SA"));
    }

    #[tokio::test]
    async fn never_exceeds_worker_bound() {
        let probe = Arc::new(FakeProbe::new(&[]));
        let verifier = BatchVerifier::new(probe.clone(), Logger::silent());

        let results = verifier.verify_results(&entries(), 3).await;

        assert_eq!(results.len(), 12);
        assert!(probe.peak.load(Ordering::SeqCst) <= 3);
        assert!(results.iter().all(|result| !result.alive));
    }

    #[tokio::test]
    async fn zero_workers_still_makes_progress() {
        let probe = Arc::new(FakeProbe::new(&["https://s0.example/live"]));
        let verifier = BatchVerifier::new(probe, Logger::silent());
        let working = verifier.verify_all(&entries(), 0).await;
        assert_eq!(working.len(), 1);
    }
}

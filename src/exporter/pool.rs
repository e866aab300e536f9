use crate::client::BeanstalkdClient;
use crate::fields::StatFilter;
use crate::mapper::TubeMapper;
use std::sync::Arc;
use tracing::{error, warn};

/// One collected stat value with its labels fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub field: String,
    /// Mapped tube label, not the raw tube name.
    pub tube: String,
    pub value: f64,
}

/// Result of fanning one tube list across the pool.
#[derive(Debug, Default)]
pub struct PassOutcome {
    pub samples: Vec<Sample>,
    /// Tubes whose stats fetch failed this pass.
    pub failures: u64,
}

/// Fixed-size pool fanning per-tube stat fetches over the shared client.
///
/// Workers race on a bounded work queue; the client serializes the actual
/// wire round-trips, so the pool parallelizes mapping and bookkeeping while
/// the single connection throttles backend load.
pub struct TubeStatsPool {
    client: Arc<BeanstalkdClient>,
    mapper: Arc<TubeMapper>,
    filter: Arc<StatFilter>,
    workers: usize,
}

impl TubeStatsPool {
    pub fn new(
        client: Arc<BeanstalkdClient>,
        mapper: Arc<TubeMapper>,
        filter: Arc<StatFilter>,
        workers: usize,
    ) -> Self {
        Self {
            client,
            mapper,
            filter,
            workers: workers.max(1),
        }
    }

    /// Fetch stats for every given tube exactly once, distributed across the
    /// pool. Per-tube failures are logged, counted, and skipped; they never
    /// abort the pass or affect sibling tubes. Completes only after every
    /// tube has been attempted.
    pub async fn run(&self, tubes: Vec<String>) -> PassOutcome {
        if tubes.is_empty() {
            return PassOutcome::default();
        }

        let worker_count = self.workers.min(tubes.len());
        let (tube_tx, tube_rx) = async_channel::bounded::<String>(worker_count);

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let tube_rx = tube_rx.clone();
            let client = Arc::clone(&self.client);
            let mapper = Arc::clone(&self.mapper);
            let filter = Arc::clone(&self.filter);

            handles.push(tokio::spawn(async move {
                let mut outcome = PassOutcome::default();
                while let Ok(tube) = tube_rx.recv().await {
                    match client.stats_tube(&tube).await {
                        Ok(stats) => {
                            let label = mapper.classify(&tube);
                            for field in filter.retained() {
                                let Some(raw) = stats.get(field) else {
                                    continue;
                                };
                                let Ok(value) = raw.parse::<f64>() else {
                                    continue;
                                };
                                outcome.samples.push(Sample {
                                    field: field.to_string(),
                                    tube: label.clone(),
                                    value,
                                });
                            }
                        }
                        Err(e) => {
                            outcome.failures += 1;
                            warn!("Error fetching stats for tube {}: {}", tube, e);
                        }
                    }
                }
                outcome
            }));
        }
        drop(tube_rx);

        for tube in tubes {
            if tube_tx.send(tube).await.is_err() {
                break;
            }
        }
        drop(tube_tx);

        // Pass-completion barrier: every worker has drained its share.
        let mut outcome = PassOutcome::default();
        for handle in handles {
            match handle.await {
                Ok(part) => {
                    outcome.samples.extend(part.samples);
                    outcome.failures += part.failures;
                }
                Err(e) => error!("Tube stats worker task failed: {}", e),
            }
        }
        outcome
    }
}

pub mod pool;

pub use pool::{PassOutcome, Sample, TubeStatsPool};

use crate::client::BeanstalkdClient;
use crate::fields::StatFilter;
use crate::mapper::TubeMapper;
use anyhow::Result;
use prometheus::{Encoder, Gauge, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Orchestrates one collection pass per scrape and renders the snapshot.
///
/// A pass walks Listing -> GlobalFetch -> Dispatching -> Awaiting ->
/// Rendering. Samples live in a pass-scoped registry so vanished tubes and
/// failed fetches leave no stale series; the process-wide counters (mapping
/// reloads, fetch errors) live in a persistent registry merged into every
/// snapshot. Passes are serialized: at most one runs at a time.
pub struct Exporter {
    client: Arc<BeanstalkdClient>,
    filter: Arc<StatFilter>,
    pool: TubeStatsPool,
    registry: Registry,
    fetch_errors: IntCounterVec,
    pass_lock: tokio::sync::Mutex<()>,
}

impl Exporter {
    pub fn new(
        client: Arc<BeanstalkdClient>,
        mapper: Arc<TubeMapper>,
        filter: StatFilter,
        workers: usize,
    ) -> Result<Self> {
        let registry = Registry::new();

        let fetch_errors = IntCounterVec::new(
            Opts::new(
                "beanstalkd_fetch_errors_total",
                "Backend fetch failures by operation.",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(fetch_errors.clone()))?;
        mapper.register(&registry)?;

        let filter = Arc::new(filter);
        let pool = TubeStatsPool::new(
            Arc::clone(&client),
            mapper,
            Arc::clone(&filter),
            workers,
        );

        Ok(Self {
            client,
            filter,
            pool,
            registry,
            fetch_errors,
            pass_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Run one collection pass and render the merged snapshot in the
    /// Prometheus text format. A scrape arriving mid-pass waits behind the
    /// pass lock.
    pub async fn render(&self) -> Result<String> {
        let _pass = self.pass_lock.lock().await;

        let snapshot = self.run_pass().await?;

        let mut families = snapshot.gather();
        families.extend(self.registry.gather());
        families.sort_by(|a, b| a.get_name().cmp(b.get_name()));

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    async fn run_pass(&self) -> Result<Registry> {
        let snapshot = Registry::new();

        let up = Gauge::with_opts(Opts::new(
            "beanstalkd_up",
            "Whether the last scrape of beanstalkd succeeded (1 = up, 0 = down).",
        ))?;
        snapshot.register(Box::new(up.clone()))?;

        // Listing. A failure skips per-tube dispatching but not the global
        // fetch: the snapshot carries whatever succeeded this pass.
        let tubes = match self.client.list_tubes().await {
            Ok(tubes) => {
                up.set(1.0);
                debug!("Listed {} tubes", tubes.len());
                tubes
            }
            Err(e) => {
                up.set(0.0);
                self.fetch_errors.with_label_values(&["list-tubes"]).inc();
                warn!("Error listing tubes on {}: {}", self.client.address(), e);
                Vec::new()
            }
        };

        match self.client.stats().await {
            Ok(stats) => self.record_global(&snapshot, &stats)?,
            Err(e) => {
                self.fetch_errors.with_label_values(&["stats"]).inc();
                warn!("Error fetching server stats: {}", e);
            }
        }

        if !tubes.is_empty() {
            let outcome = self.pool.run(tubes).await;
            if outcome.failures > 0 {
                self.fetch_errors
                    .with_label_values(&["stats-tube"])
                    .inc_by(outcome.failures);
            }
            record_tubes(&snapshot, &outcome.samples)?;
        }

        Ok(snapshot)
    }

    fn record_global(&self, snapshot: &Registry, stats: &HashMap<String, String>) -> Result<()> {
        for field in self.filter.retained() {
            let Some(raw) = stats.get(field) else {
                continue;
            };
            let Ok(value) = raw.parse::<f64>() else {
                continue;
            };
            let gauge = Gauge::with_opts(Opts::new(
                global_metric_name(field),
                format!("beanstalkd server stat {}.", field),
            ))?;
            snapshot.register(Box::new(gauge.clone()))?;
            gauge.set(value);
        }
        Ok(())
    }
}

/// Record per-tube samples into the snapshot. Tubes mapped to the same
/// label are aggregated by summing, so grouping rules reduce cardinality
/// instead of silently overwriting.
fn record_tubes(snapshot: &Registry, samples: &[Sample]) -> Result<()> {
    let mut totals: BTreeMap<&str, BTreeMap<&str, f64>> = BTreeMap::new();
    for sample in samples {
        *totals
            .entry(sample.field.as_str())
            .or_default()
            .entry(sample.tube.as_str())
            .or_insert(0.0) += sample.value;
    }

    for (field, by_tube) in totals {
        let gauges = GaugeVec::new(
            Opts::new(
                tube_metric_name(field),
                format!("beanstalkd per-tube stat {}.", field),
            ),
            &["tube"],
        )?;
        snapshot.register(Box::new(gauges.clone()))?;
        for (tube, value) in by_tube {
            gauges.with_label_values(&[tube]).set(value);
        }
    }
    Ok(())
}

fn sanitize_field(field: &str) -> String {
    field.replace('-', "_")
}

fn global_metric_name(field: &str) -> String {
    format!("beanstalkd_{}", sanitize_field(field))
}

fn tube_metric_name(field: &str) -> String {
    format!("beanstalkd_tube_{}", sanitize_field(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert_eq!(
            global_metric_name("current-jobs-ready"),
            "beanstalkd_current_jobs_ready"
        );
        assert_eq!(
            tube_metric_name("pause-time-left"),
            "beanstalkd_tube_pause_time_left"
        );
    }

    #[test]
    fn test_record_tubes_aggregates_shared_labels() {
        let snapshot = Registry::new();
        let samples = vec![
            Sample {
                field: "current-jobs-ready".to_string(),
                tube: "web".to_string(),
                value: 3.0,
            },
            Sample {
                field: "current-jobs-ready".to_string(),
                tube: "web".to_string(),
                value: 5.0,
            },
            Sample {
                field: "current-jobs-ready".to_string(),
                tube: "batch-1".to_string(),
                value: 0.0,
            },
        ];
        record_tubes(&snapshot, &samples).unwrap();

        let families = snapshot.gather();
        assert_eq!(families.len(), 1);
        let family = &families[0];
        assert_eq!(family.get_name(), "beanstalkd_tube_current_jobs_ready");

        let mut by_tube = HashMap::new();
        for metric in family.get_metric() {
            let tube = metric.get_label()[0].get_value().to_string();
            by_tube.insert(tube, metric.get_gauge().get_value());
        }
        assert_eq!(by_tube.get("web"), Some(&8.0));
        assert_eq!(by_tube.get("batch-1"), Some(&0.0));
    }

    #[tokio::test]
    async fn test_render_with_unreachable_backend() {
        let client = Arc::new(BeanstalkdClient::new(
            "127.0.0.1:1",
            Some(std::time::Duration::from_millis(200)),
        ));
        let exporter = Exporter::new(
            client,
            Arc::new(TubeMapper::new()),
            StatFilter::all(),
            2,
        )
        .unwrap();

        let output = exporter.render().await.unwrap();

        assert!(output.contains("beanstalkd_up 0"));
        assert!(output.contains("beanstalkd_fetch_errors_total{operation=\"list-tubes\"} 1"));
        assert!(output.contains("beanstalkd_fetch_errors_total{operation=\"stats\"} 1"));
        assert!(!output.contains("beanstalkd_tube_"));
    }
}

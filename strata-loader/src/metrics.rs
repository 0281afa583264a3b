//! Prometheus metrics for loader runs.

use std::time::Duration;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

/// Metrics describing one loader process. Clones share the same
/// underlying collectors.
#[derive(Clone, Debug)]
pub struct LoaderMetrics {
    /// Duration of each lifecycle operation. The `success` and
    /// `status` labels are populated on the post-loop operations
    /// (post_load, flush, cleanup) and empty elsewhere.
    pub operation_duration: HistogramVec,
    /// Metadata fetchers instantiated.
    pub metadata_fetchers: IntCounter,
    /// Parent origins reported, labeled by fetcher name.
    pub metadata_parent_origins: IntCounterVec,
    /// Extrinsic metadata objects collected.
    pub metadata_objects: IntCounter,
}

impl LoaderMetrics {
    /// Create the collectors and register them with `registry`,
    /// prefixing every metric name with `prefix`.
    pub fn new(prefix: &str, registry: &Registry) -> Result<Self, prometheus::Error> {
        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                format!("{prefix}_operation_duration_seconds"),
                "Duration of loader lifecycle operations",
            )
            .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
            &["operation", "success", "status"],
        )?;

        let metadata_fetchers = IntCounter::with_opts(Opts::new(
            format!("{prefix}_metadata_fetchers_total"),
            "Total number of metadata fetchers instantiated",
        ))?;

        let metadata_parent_origins = IntCounterVec::new(
            Opts::new(
                format!("{prefix}_metadata_parent_origins_total"),
                "Total number of parent origins reported by metadata fetchers",
            ),
            &["fetcher"],
        )?;

        let metadata_objects = IntCounter::with_opts(Opts::new(
            format!("{prefix}_metadata_objects_total"),
            "Total number of extrinsic metadata objects collected",
        ))?;

        registry.register(Box::new(operation_duration.clone()))?;
        registry.register(Box::new(metadata_fetchers.clone()))?;
        registry.register(Box::new(metadata_parent_origins.clone()))?;
        registry.register(Box::new(metadata_objects.clone()))?;

        Ok(LoaderMetrics {
            operation_duration,
            metadata_fetchers,
            metadata_parent_origins,
            metadata_objects,
        })
    }

    /// Collectors registered against a private registry, for callers
    /// that do not export metrics.
    pub fn unregistered() -> Result<Self, prometheus::Error> {
        LoaderMetrics::new("strata_loader", &Registry::new())
    }

    pub(crate) fn observe(&self, operation: &str, success: &str, status: &str, took: Duration) {
        self.operation_duration
            .with_label_values(&[operation, success, status])
            .observe(took.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_observes() {
        use prometheus::{Encoder, TextEncoder};

        let registry = Registry::new();
        let metrics = LoaderMetrics::new("strata_loader", &registry).unwrap();
        metrics.observe("prepare", "", "", Duration::from_millis(5));
        metrics.observe("flush", "true", "full", Duration::from_millis(1));
        metrics.metadata_fetchers.inc();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        let exported = String::from_utf8(buffer).unwrap();
        assert!(exported.contains("strata_loader_operation_duration_seconds"));
        assert!(exported.contains("strata_loader_metadata_fetchers_total 1"));
        assert!(exported.contains(r#"operation="flush",status="full",success="true""#));
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        LoaderMetrics::new("strata_loader", &registry).unwrap();
        assert!(LoaderMetrics::new("strata_loader", &registry).is_err());
    }
}

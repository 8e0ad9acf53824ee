//! Metrics for versioned API traffic.
//!
//! Provides Prometheus metrics for resolved and rejected requests, sunset
//! tracking, and route table publication.

use prometheus::{IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

/// Metrics collector for the versioning gateway.
#[derive(Clone)]
pub struct VersioningMetrics {
    /// Registry for all metrics
    registry: Registry,

    /// Counter for resolved requests by template, method and version
    pub requests_total: IntCounterVec,

    /// Counter for rejected requests by error code
    pub rejected_total: IntCounterVec,

    /// Counter for requests that reached a binding past its sunset
    pub expired_total: IntCounterVec,

    /// Counter for route table swaps
    pub table_swaps_total: IntCounter,

    /// Gauge for the number of registered bindings
    pub registered_bindings: IntGauge,

    /// Gauge for days until sunset for each binding
    pub days_until_sunset: IntGaugeVec,
}

impl VersioningMetrics {
    /// Create a new metrics collector with the given prefix.
    ///
    /// Fails when the prefix does not form valid Prometheus metric names.
    pub fn new(prefix: &str) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                format!("{}_requests_total", prefix),
                "Total number of resolved versioned requests",
            ),
            &["template", "method", "version", "deprecated"],
        )?;

        let rejected_total = IntCounterVec::new(
            Opts::new(
                format!("{}_rejected_total", prefix),
                "Total number of requests rejected during version resolution",
            ),
            &["reason"],
        )?;

        let expired_total = IntCounterVec::new(
            Opts::new(
                format!("{}_expired_total", prefix),
                "Total number of requests to API versions past their sunset",
            ),
            &["template", "version"],
        )?;

        let table_swaps_total = IntCounter::new(
            format!("{}_table_swaps_total", prefix),
            "Total number of route table publications",
        )?;

        let registered_bindings = IntGauge::new(
            format!("{}_registered_bindings", prefix),
            "Number of route bindings in the active table",
        )?;

        let days_until_sunset = IntGaugeVec::new(
            Opts::new(
                format!("{}_days_until_sunset", prefix),
                "Days until binding sunset (negative if past)",
            ),
            &["template", "method", "version"],
        )?;

        // Register all metrics
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(rejected_total.clone()))?;
        registry.register(Box::new(expired_total.clone()))?;
        registry.register(Box::new(table_swaps_total.clone()))?;
        registry.register(Box::new(registered_bindings.clone()))?;
        registry.register(Box::new(days_until_sunset.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            rejected_total,
            expired_total,
            table_swaps_total,
            registered_bindings,
            days_until_sunset,
        })
    }

    /// Record a resolved request.
    pub fn record_request(&self, template: &str, method: &str, version: &str, deprecated: bool) {
        let deprecated = if deprecated { "true" } else { "false" };
        self.requests_total
            .with_label_values(&[template, method, version, deprecated])
            .inc();
    }

    /// Record a rejected request.
    pub fn record_rejected(&self, reason: &str) {
        self.rejected_total.with_label_values(&[reason]).inc();
    }

    /// Record a request to a binding past its sunset.
    pub fn record_expired(&self, template: &str, version: &str) {
        self.expired_total
            .with_label_values(&[template, version])
            .inc();
    }

    /// Record a route table swap.
    pub fn record_table_swap(&self) {
        self.table_swaps_total.inc();
    }

    /// Update the registered bindings gauge.
    pub fn set_registered_bindings(&self, count: usize) {
        self.registered_bindings.set(count as i64);
    }

    /// Update the days until sunset gauge.
    pub fn set_days_until_sunset(&self, template: &str, method: &str, version: &str, days: i64) {
        self.days_until_sunset
            .with_label_values(&[template, method, version])
            .set(days);
    }

    /// Drop every days-until-sunset series.
    pub fn clear_days_until_sunset(&self) {
        self.days_until_sunset.reset();
    }

    /// Get the Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode metrics in Prometheus text format.
    pub fn encode(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

//! Per-request versioning pipeline.
//!
//! Matches the request path against the route table, reads the version token,
//! resolves the effective version, looks up the exact binding and annotates it
//! with the deprecation policy. The table lives behind an [`ArcSwap`] so it can
//! be replaced wholesale while requests are in flight.

use crate::config::{GatewayConfig, GlobalSettings};
use crate::error::{Result, VersioningError};
use crate::metrics::VersioningMetrics;
use crate::policy::{annotate, DeprecationInfo, PastSunsetAction};
use crate::resolver::{resolve, VersionReader};
use crate::table::{RouteBinding, RouteTable};
use crate::version::ApiVersion;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The parts of a request the gateway needs.
#[derive(Debug, Clone, Copy)]
pub struct RequestParts<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
}

impl<'a> RequestParts<'a> {
    pub fn new(method: &'a Method, path: &'a str, headers: &'a HeaderMap) -> Self {
        Self {
            method,
            path,
            query: None,
            headers,
        }
    }

    pub fn with_query(mut self, query: Option<&'a str>) -> Self {
        self.query = query;
        self
    }
}

/// Outcome of a successful resolution. Dropped once the response is sent.
#[derive(Debug)]
pub struct ResolvedRequest<H> {
    pub version: ApiVersion,
    pub binding: Arc<RouteBinding<H>>,
    /// Path parameters captured from the template
    pub params: HashMap<String, String>,
    pub deprecation: DeprecationInfo,
    /// Non-deprecated versions of the matched route
    pub supported_versions: Vec<ApiVersion>,
    /// Deprecated versions of the matched route
    pub deprecated_versions: Vec<ApiVersion>,
}

impl<H> ResolvedRequest<H> {
    pub fn handler(&self) -> &H {
        self.binding.handler()
    }
}

/// Version-aware request router over a swappable route table.
pub struct VersioningGateway<H> {
    table: ArcSwap<RouteTable<H>>,
    reader: VersionReader,
    settings: GlobalSettings,
    metrics: Arc<VersioningMetrics>,
}

impl<H> VersioningGateway<H> {
    /// Create a gateway over `table` using the reader, settings and metrics of `config`.
    ///
    /// Fails when the configured metrics prefix is not a valid Prometheus name.
    pub fn new(table: RouteTable<H>, config: &GatewayConfig) -> Result<Self, prometheus::Error> {
        let metrics = Arc::new(VersioningMetrics::new(&config.metrics.prefix)?);
        let gateway = Self {
            table: ArcSwap::from_pointee(table),
            reader: config.versioning.reader.clone(),
            settings: config.settings.clone(),
            metrics,
        };
        gateway.refresh_table_metrics(Utc::now());

        info!(
            bindings = gateway.table.load().len(),
            reader = ?gateway.reader,
            "API versioning gateway initialized"
        );
        Ok(gateway)
    }

    pub fn metrics(&self) -> &VersioningMetrics {
        &self.metrics
    }

    /// Encode metrics, recomputing the sunset countdowns for the current table.
    pub fn encode_metrics(&self) -> String {
        self.refresh_table_metrics(Utc::now());
        self.metrics.encode()
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    pub fn reader(&self) -> &VersionReader {
        &self.reader
    }

    /// Snapshot of the current table.
    pub fn table(&self) -> Arc<RouteTable<H>> {
        self.table.load_full()
    }

    /// Atomically replace the route table, returning the previous one.
    ///
    /// Requests already resolved keep their bindings alive until dropped.
    pub fn publish(&self, table: RouteTable<H>) -> Arc<RouteTable<H>> {
        let bindings = table.len();
        let previous = self.table.swap(Arc::new(table));
        self.metrics.record_table_swap();
        self.refresh_table_metrics(Utc::now());
        info!(
            previous_bindings = previous.len(),
            bindings, "Published new route table"
        );
        previous
    }

    /// Resolve a request against the current table at the current time.
    pub fn resolve(&self, request: RequestParts<'_>) -> Result<ResolvedRequest<H>> {
        self.resolve_at(request, Utc::now())
    }

    /// Resolve a request at `now`.
    pub fn resolve_at(
        &self,
        request: RequestParts<'_>,
        now: DateTime<Utc>,
    ) -> Result<ResolvedRequest<H>> {
        let table = self.table.load_full();

        let result = self.resolve_in(&table, request, now);
        match &result {
            Ok(resolved) => {
                self.metrics.record_request(
                    resolved.binding.template(),
                    request.method.as_str(),
                    &resolved.version.to_string(),
                    resolved.deprecation.deprecated,
                );
            }
            Err(err) => {
                debug!(
                    path = %request.path,
                    method = %request.method,
                    error = %err,
                    "Request rejected"
                );
                self.metrics.record_rejected(err.code());
            }
        }
        result
    }

    fn resolve_in(
        &self,
        table: &RouteTable<H>,
        request: RequestParts<'_>,
        now: DateTime<Utc>,
    ) -> Result<ResolvedRequest<H>> {
        let not_found = |version| VersioningError::NotFound {
            method: request.method.clone(),
            path: request.path.to_string(),
            version,
        };

        // Try every matching template, most specific first. When none serves
        // the request, report what went wrong on the most specific one.
        let mut first_error = None;
        let mut found = None;
        for matched in table.match_all(request.path) {
            let token = self
                .reader
                .read(&matched.params, request.query, request.headers);
            let version = match resolve(token.as_deref(), table.default_version(), table.versions())
            {
                Ok(version) => version,
                Err(err) => {
                    first_error.get_or_insert(err);
                    continue;
                }
            };
            match table.binding_for(&matched, request.method, version) {
                Some(binding) => {
                    found = Some((matched.template, matched.params, version, binding.clone()));
                    break;
                }
                None => {
                    first_error.get_or_insert_with(|| not_found(Some(version)));
                }
            }
        }
        let Some((template, params, version, binding)) = found else {
            return Err(first_error.unwrap_or_else(|| not_found(None)));
        };

        let deprecation = annotate(&*binding, now);
        if deprecation.deprecated && self.settings.log_access {
            info!(
                template = %binding.template(),
                method = %request.method,
                version = %version,
                sunset = ?deprecation.sunset,
                "Deprecated API version accessed"
            );
        }

        if deprecation.expired {
            self.metrics
                .record_expired(binding.template(), &version.to_string());
            warn!(
                template = %binding.template(),
                version = %version,
                sunset = ?deprecation.sunset,
                action = ?self.settings.past_sunset_action,
                "Request to API version past sunset date"
            );
            if let (PastSunsetAction::Reject, Some(sunset)) =
                (self.settings.past_sunset_action, deprecation.sunset)
            {
                return Err(VersioningError::SunsetElapsed {
                    version,
                    path: request.path.to_string(),
                    sunset,
                });
            }
        }

        let (supported_versions, deprecated_versions) =
            table.reported_versions(template, request.method);

        Ok(ResolvedRequest {
            version,
            params,
            binding,
            deprecation,
            supported_versions,
            deprecated_versions,
        })
    }

    fn refresh_table_metrics(&self, now: DateTime<Utc>) {
        let table = self.table.load();
        self.metrics.set_registered_bindings(table.len());
        self.metrics.clear_days_until_sunset();
        for binding in table.bindings() {
            if let Some(days) = annotate(binding, now).days_until_sunset(now) {
                self.metrics.set_days_until_sunset(
                    binding.template(),
                    binding.method().as_str(),
                    &binding.version().to_string(),
                    days,
                );
            }
        }
    }
}

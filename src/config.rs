//! Configuration for the versioning gateway.
//!
//! Declares the versioning options, the versioned routes with their
//! deprecation and sunset data, response header settings, and documentation
//! and metrics options.

use crate::policy::PastSunsetAction;
use crate::table::{BindingOptions, OperationDoc, RouteTable, VersionedRoute, VersioningOptions};
use crate::version::ApiVersion;
use chrono::{DateTime, Utc};
use http::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Main configuration for the versioning gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Default version and version reader
    #[serde(default)]
    pub versioning: VersioningOptions,

    /// Versioned routes
    #[serde(default)]
    pub routes: Vec<RouteDeclaration>,

    /// Response header settings
    #[serde(default)]
    pub settings: GlobalSettings,

    /// Documentation output
    #[serde(default)]
    pub documentation: DocumentationConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl GatewayConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, including building the route table once.
    pub fn validate(&self) -> anyhow::Result<()> {
        for route in &self.routes {
            route.validate()?;
        }
        self.metrics.validate()?;
        self.build_table()?;
        Ok(())
    }

    /// Build the route table declared by this configuration.
    ///
    /// Handlers are the operation ids of the declarations.
    pub fn build_table(&self) -> anyhow::Result<RouteTable<String>> {
        let mut builder = RouteTable::builder(&self.versioning);
        for route in &self.routes {
            builder.add(route.to_versioned_route()?)?;
        }
        Ok(builder.build())
    }
}

/// A route served under one or more versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDeclaration {
    /// Handler reference, also used as the OpenAPI operation id
    pub operation_id: String,

    /// Path template, e.g. /v{version:apiVersion}/stuff/{id:int}
    pub path: String,

    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Path parameter descriptions
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    /// Versions this route is served at
    pub versions: Vec<VersionDeclaration>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl RouteDeclaration {
    /// Validate the route declaration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.operation_id.is_empty() {
            anyhow::bail!("Route operation_id cannot be empty");
        }
        if self.path.is_empty() {
            anyhow::bail!("Route path cannot be empty for: {}", self.operation_id);
        }
        if self.versions.is_empty() {
            anyhow::bail!(
                "Route {} must declare at least one version",
                self.operation_id
            );
        }
        self.parse_method()?;

        for declared in &self.versions {
            if let Some(sunset) = &declared.sunset_at {
                if !declared.deprecated {
                    anyhow::bail!(
                        "Route {} version {} has a sunset date but is not deprecated",
                        self.operation_id,
                        declared.version
                    );
                }
                if *sunset < Utc::now() {
                    tracing::warn!(
                        operation_id = %self.operation_id,
                        version = %declared.version,
                        sunset = %sunset,
                        "Sunset date is in the past"
                    );
                }
            }
        }

        Ok(())
    }

    fn parse_method(&self) -> anyhow::Result<Method> {
        Method::from_bytes(self.method.to_uppercase().as_bytes()).map_err(|_| {
            anyhow::anyhow!(
                "Invalid HTTP method '{}' for route {}",
                self.method,
                self.operation_id
            )
        })
    }

    fn doc(&self) -> OperationDoc {
        OperationDoc {
            operation_id: Some(self.operation_id.clone()),
            summary: self.summary.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            parameters: self.parameters.clone(),
        }
    }

    /// Convert into a registrable route whose handler is the operation id.
    pub fn to_versioned_route(&self) -> anyhow::Result<VersionedRoute<String>> {
        let method = self.parse_method()?;
        let mut route = VersionedRoute::new(method, self.path.clone(), self.operation_id.clone())
            .doc(self.doc());

        for declared in &self.versions {
            let mut options = BindingOptions {
                deprecated: declared.deprecated,
                sunset_at: declared.sunset_at,
                link: declared.link.clone(),
                doc: self.doc(),
            };
            if let Some(summary) = &declared.summary {
                options.doc.summary = Some(summary.clone());
            }
            route = route.version_with(declared.version, options);
        }

        Ok(route)
    }
}

/// One version of a declared route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionDeclaration {
    pub version: ApiVersion,

    #[serde(default)]
    pub deprecated: bool,

    /// Date after which this version may be refused (RFC 3339), requires deprecated
    #[serde(default)]
    pub sunset_at: Option<DateTime<Utc>>,

    /// Link to the sunset policy or migration guide
    #[serde(default)]
    pub link: Option<String>,

    /// Summary override for this version
    #[serde(default)]
    pub summary: Option<String>,
}

/// Response header settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Header name for deprecation marker (default: Deprecation)
    #[serde(default = "default_deprecation_header")]
    pub deprecation_header: String,

    /// Header name for sunset date (default: Sunset)
    #[serde(default = "default_sunset_header")]
    pub sunset_header: String,

    /// Header name for sunset policy link (default: Link)
    #[serde(default = "default_link_header")]
    pub link_header: String,

    /// Header name for deprecation message (default: X-Deprecation-Notice)
    #[serde(default = "default_notice_header")]
    pub notice_header: String,

    /// Header listing supported versions (default: api-supported-versions)
    #[serde(default = "default_supported_header")]
    pub supported_versions_header: String,

    /// Header listing deprecated versions (default: api-deprecated-versions)
    #[serde(default = "default_deprecated_versions_header")]
    pub deprecated_versions_header: String,

    /// Whether to add deprecation headers to deprecated responses
    #[serde(default = "default_true")]
    pub include_headers: bool,

    /// Whether to report supported and deprecated versions on every response
    #[serde(default = "default_true")]
    pub report_api_versions: bool,

    /// Action for requests to bindings past their sunset date
    #[serde(default)]
    pub past_sunset_action: PastSunsetAction,

    /// Whether to log every access to a deprecated binding
    #[serde(default = "default_true")]
    pub log_access: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            deprecation_header: default_deprecation_header(),
            sunset_header: default_sunset_header(),
            link_header: default_link_header(),
            notice_header: default_notice_header(),
            supported_versions_header: default_supported_header(),
            deprecated_versions_header: default_deprecated_versions_header(),
            include_headers: true,
            report_api_versions: true,
            past_sunset_action: PastSunsetAction::default(),
            log_access: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_deprecation_header() -> String {
    "Deprecation".to_string()
}

fn default_sunset_header() -> String {
    "Sunset".to_string()
}

fn default_link_header() -> String {
    "Link".to_string()
}

fn default_notice_header() -> String {
    "X-Deprecation-Notice".to_string()
}

fn default_supported_header() -> String {
    "api-supported-versions".to_string()
}

fn default_deprecated_versions_header() -> String {
    "api-deprecated-versions".to_string()
}

/// Documentation output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentationConfig {
    /// Title of every generated document
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Whether the gateway serves documents under /swagger
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for DocumentationConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            description: None,
            enabled: true,
        }
    }
}

fn default_title() -> String {
    "API".to_string()
}

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether to expose Prometheus metrics on /metrics
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prefix for metric names
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: default_metrics_prefix(),
        }
    }
}

impl MetricsConfig {
    /// Metric names are `<prefix>_<name>`, so the prefix must itself be a
    /// valid Prometheus metric name.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid = regex::Regex::new("^[a-zA-Z_:][a-zA-Z0-9_:]*$")?;
        if !valid.is_match(&self.prefix) {
            anyhow::bail!(
                "Invalid metrics prefix '{}': expected [a-zA-Z_:][a-zA-Z0-9_:]*",
                self.prefix
            );
        }
        Ok(())
    }
}

fn default_metrics_prefix() -> String {
    "zentinel_api_versioning".to_string()
}

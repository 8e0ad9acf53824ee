//! Header generation for versioned responses.
//!
//! Implements the headers a host attaches to a resolved request:
//! - Deprecation header (RFC 9745 style `Deprecation: true`)
//! - Sunset header (RFC 8594)
//! - Link header to the sunset policy (`rel="sunset"`)
//! - api-supported-versions / api-deprecated-versions reporting

use crate::config::GlobalSettings;
use crate::error::VersioningError;
use crate::gateway::ResolvedRequest;
use crate::version::join_versions;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Builder for versioning-related HTTP headers.
pub struct DeprecationHeaders {
    headers: HashMap<String, String>,
}

impl DeprecationHeaders {
    /// Create a new header builder.
    pub fn new() -> Self {
        Self {
            headers: HashMap::new(),
        }
    }

    /// Build headers for a resolved request.
    pub fn for_request<H>(resolved: &ResolvedRequest<H>, settings: &GlobalSettings) -> Self {
        let mut builder = Self::new();

        if settings.report_api_versions {
            if !resolved.supported_versions.is_empty() {
                builder.headers.insert(
                    settings.supported_versions_header.clone(),
                    join_versions(&resolved.supported_versions),
                );
            }
            if !resolved.deprecated_versions.is_empty() {
                builder.headers.insert(
                    settings.deprecated_versions_header.clone(),
                    join_versions(&resolved.deprecated_versions),
                );
            }
        }

        if !settings.include_headers || !resolved.deprecation.deprecated {
            return builder;
        }

        builder
            .headers
            .insert(settings.deprecation_header.clone(), "true".to_string());

        if let Some(sunset) = &resolved.deprecation.sunset {
            builder
                .headers
                .insert(settings.sunset_header.clone(), format_http_date(sunset));
        }

        if let Some(link) = resolved.binding.link() {
            builder.headers.insert(
                settings.link_header.clone(),
                format!("<{}>; rel=\"sunset\"; type=\"text/html\"", link),
            );
        }

        builder
            .headers
            .insert(settings.notice_header.clone(), deprecation_message(resolved));

        builder
    }

    /// Add a custom header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Get all headers.
    pub fn build(self) -> HashMap<String, String> {
        self.headers
    }

    /// Get headers as a vector of tuples.
    pub fn to_vec(self) -> Vec<(String, String)> {
        self.headers.into_iter().collect()
    }
}

impl Default for DeprecationHeaders {
    fn default() -> Self {
        Self::new()
    }
}

/// Human readable deprecation notice for a resolved request.
pub fn deprecation_message<H>(resolved: &ResolvedRequest<H>) -> String {
    let binding = &resolved.binding;
    let mut message = format!(
        "Version {} of {} {} is deprecated",
        resolved.version,
        binding.method(),
        binding.template()
    );

    if let Some(sunset) = &resolved.deprecation.sunset {
        let verb = if resolved.deprecation.expired {
            "was"
        } else {
            "will be"
        };
        message.push_str(&format!(
            " and {} removed on {}",
            verb,
            sunset.format("%Y-%m-%d")
        ));
    }

    if let Some(latest) = resolved.supported_versions.last() {
        message.push_str(&format!(". Please migrate to version {}", latest));
    }

    if let Some(link) = resolved.binding.link() {
        message.push_str(&format!(". See {} for details", link));
    }

    message.push('.');
    message
}

/// Format a datetime as an HTTP date (RFC 7231).
/// Example: Sun, 06 Nov 1994 08:49:37 GMT
pub fn format_http_date(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// JSON body describing a resolution, returned by the reference host.
pub fn resolution_body<H: AsRef<str>>(resolved: &ResolvedRequest<H>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "operation_id": resolved.handler().as_ref(),
        "version": resolved.version,
        "template": resolved.binding.template(),
        "method": resolved.binding.method().as_str(),
        "params": resolved.params,
        "deprecated": resolved.deprecation.deprecated,
        "expired": resolved.deprecation.expired,
    });

    if let Some(sunset) = &resolved.deprecation.sunset {
        body["sunset"] = serde_json::Value::String(sunset.to_rfc3339());
    }

    body
}

/// JSON error body for a versioning error.
pub fn error_body(error: &VersioningError) -> serde_json::Value {
    let mut body = serde_json::json!({
        "error": error.code(),
        "message": error.to_string(),
    });

    match error {
        VersioningError::UnsupportedVersion {
            requested,
            supported,
        } => {
            body["requested_version"] = serde_json::json!(requested);
            body["supported_versions"] = serde_json::json!(supported);
        }
        VersioningError::NotFound {
            version: Some(version),
            ..
        } => {
            body["version"] = serde_json::json!(version);
        }
        VersioningError::SunsetElapsed { version, sunset, .. } => {
            body["version"] = serde_json::json!(version);
            body["sunset"] = serde_json::Value::String(sunset.to_rfc3339());
        }
        _ => {}
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::gateway::{RequestParts, VersioningGateway};
    use crate::table::{BindingOptions, RouteTableBuilder, VersionedRoute};
    use crate::version::ApiVersion;
    use chrono::TimeZone;
    use http::{HeaderMap, Method};

    static GET: Method = Method::GET;

    fn sunset() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap()
    }

    fn gateway(settings: GlobalSettings) -> VersioningGateway<String> {
        let mut config = GatewayConfig::default();
        config.versioning.default_version = ApiVersion::new(3, 0);
        config.settings = settings;
        let mut builder = RouteTableBuilder::new(&config.versioning);
        builder
            .add(
                VersionedRoute::new(Method::GET, "/v{version}/stuff", "list_stuff".to_string())
                    .version_with(
                        ApiVersion::new(1, 0),
                        BindingOptions::deprecated()
                            .with_sunset(sunset())
                            .with_link("https://docs.example.com/sunset"),
                    )
                    .version(ApiVersion::new(2, 0))
                    .version(ApiVersion::new(3, 0)),
            )
            .unwrap();
        VersioningGateway::new(builder.build(), &config).unwrap()
    }

    fn resolve(gateway: &VersioningGateway<String>, path: &str) -> ResolvedRequest<String> {
        let headers = HeaderMap::new();
        gateway
            .resolve_at(
                RequestParts::new(&GET, path, &headers),
                sunset() - chrono::Duration::days(1),
            )
            .unwrap()
    }

    #[test]
    fn test_deprecated_headers() {
        let gateway = gateway(GlobalSettings::default());
        let resolved = resolve(&gateway, "/v1/stuff");
        let headers = DeprecationHeaders::for_request(&resolved, gateway.settings()).build();

        assert_eq!(headers["Deprecation"], "true");
        assert_eq!(headers["Sunset"], "Sat, 01 Jun 2030 12:00:00 GMT");
        assert!(headers["Link"].contains("rel=\"sunset\""));
        assert!(headers["Link"].contains("docs.example.com"));
        assert_eq!(headers["api-supported-versions"], "2.0, 3.0");
        assert_eq!(headers["api-deprecated-versions"], "1.0");

        let notice = &headers["X-Deprecation-Notice"];
        assert!(notice.contains("deprecated"));
        assert!(notice.contains("2030-06-01"));
        assert!(notice.contains("version 3.0"));
    }

    #[test]
    fn test_current_version_only_reports() {
        let gateway = gateway(GlobalSettings::default());
        let resolved = resolve(&gateway, "/v3/stuff");
        let headers = DeprecationHeaders::for_request(&resolved, gateway.settings()).build();

        assert!(!headers.contains_key("Deprecation"));
        assert!(!headers.contains_key("Sunset"));
        assert_eq!(headers["api-supported-versions"], "2.0, 3.0");
    }

    #[test]
    fn test_disabled_headers() {
        let settings = GlobalSettings {
            include_headers: false,
            report_api_versions: false,
            ..GlobalSettings::default()
        };
        let gateway = gateway(settings);
        let resolved = resolve(&gateway, "/v1/stuff");
        let headers = DeprecationHeaders::for_request(&resolved, gateway.settings()).build();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_custom_header_names() {
        let settings = GlobalSettings {
            sunset_header: "X-Api-Sunset".to_string(),
            ..GlobalSettings::default()
        };
        let gateway = gateway(settings);
        let resolved = resolve(&gateway, "/v1/stuff");
        let headers = DeprecationHeaders::for_request(&resolved, gateway.settings())
            .with_header("X-Extra", "1")
            .build();
        assert!(headers.contains_key("X-Api-Sunset"));
        assert!(!headers.contains_key("Sunset"));
        assert_eq!(headers["X-Extra"], "1");
    }

    #[test]
    fn test_format_http_date() {
        let dt: DateTime<Utc> = "2025-06-01T12:00:00Z".parse().unwrap();
        assert_eq!(format_http_date(&dt), "Sun, 01 Jun 2025 12:00:00 GMT");
    }

    #[test]
    fn test_resolution_body() {
        let gateway = gateway(GlobalSettings::default());
        let resolved = resolve(&gateway, "/v1/stuff");
        let body = resolution_body(&resolved);
        assert_eq!(body["operation_id"], "list_stuff");
        assert_eq!(body["version"], "1.0");
        assert_eq!(body["deprecated"], true);
        assert_eq!(body["expired"], false);
        assert_eq!(body["sunset"], "2030-06-01T12:00:00+00:00");
    }

    #[test]
    fn test_error_body() {
        let err = VersioningError::UnsupportedVersion {
            requested: ApiVersion::new(1, 0),
            supported: vec![ApiVersion::new(2, 0), ApiVersion::new(3, 0)],
        };
        let body = error_body(&err);
        assert_eq!(body["error"], "unsupported_api_version");
        assert_eq!(body["requested_version"], "1.0");
        assert_eq!(body["supported_versions"], serde_json::json!(["2.0", "3.0"]));

        let body = error_body(&VersioningError::MalformedVersion {
            token: "x".to_string(),
        });
        assert_eq!(body["error"], "malformed_api_version");
        assert!(body.get("supported_versions").is_none());
    }
}

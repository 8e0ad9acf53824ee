//! Error taxonomy for version resolution and route registration.

use crate::version::{join_versions, ApiVersion};
use chrono::{DateTime, Utc};
use http::{Method, StatusCode};
use thiserror::Error;

/// Errors produced by the versioning core.
///
/// Request-time variants are recoverable and map to distinct client-facing
/// statuses. Registration-time variants abort startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersioningError {
    /// The client sent a version token that is not `major.minor`.
    #[error("malformed API version '{token}'")]
    MalformedVersion { token: String },

    /// The client asked for a well-formed version nobody registered.
    #[error("API version {requested} is not supported (supported: {})", join_versions(.supported))]
    UnsupportedVersion {
        requested: ApiVersion,
        supported: Vec<ApiVersion>,
    },

    /// No binding for the path, method and version combination.
    #[error("no route for {method} {path}")]
    NotFound {
        method: Method,
        path: String,
        version: Option<ApiVersion>,
    },

    /// The sunset of the matched binding has passed and the gateway rejects expired versions.
    #[error("API version {version} of {path} was sunset at {sunset}")]
    SunsetElapsed {
        version: ApiVersion,
        path: String,
        sunset: DateTime<Utc>,
    },

    /// (template, method, version) registered twice.
    #[error("duplicate route binding for {method} {template} at version {version}")]
    DuplicateBinding {
        template: String,
        method: Method,
        version: ApiVersion,
    },

    /// A sunset was registered on a binding that is not deprecated.
    #[error("{method} {template} at version {version} has a sunset but is not deprecated")]
    SunsetWithoutDeprecation {
        template: String,
        method: Method,
        version: ApiVersion,
    },

    /// The path template could not be parsed.
    #[error("invalid path template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },
}

impl VersioningError {
    /// Stable machine-readable code used in error bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedVersion { .. } => "malformed_api_version",
            Self::UnsupportedVersion { .. } => "unsupported_api_version",
            Self::NotFound { .. } => "not_found",
            Self::SunsetElapsed { .. } => "api_version_sunset",
            Self::DuplicateBinding { .. } => "duplicate_binding",
            Self::SunsetWithoutDeprecation { .. } => "sunset_without_deprecation",
            Self::InvalidTemplate { .. } => "invalid_template",
        }
    }

    /// HTTP status a host should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedVersion { .. } | Self::UnsupportedVersion { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::SunsetElapsed { .. } => StatusCode::GONE,
            Self::DuplicateBinding { .. }
            | Self::SunsetWithoutDeprecation { .. }
            | Self::InvalidTemplate { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error can only occur while building a route table.
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateBinding { .. }
                | Self::SunsetWithoutDeprecation { .. }
                | Self::InvalidTemplate { .. }
        )
    }
}

pub type Result<T, E = VersioningError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_message_lists_versions() {
        let err = VersioningError::UnsupportedVersion {
            requested: ApiVersion::new(1, 0),
            supported: vec![ApiVersion::new(2, 0), ApiVersion::new(3, 0)],
        };
        assert_eq!(
            err.to_string(),
            "API version 1.0 is not supported (supported: 2.0, 3.0)"
        );
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_distinct_outcomes() {
        let errors = [
            VersioningError::MalformedVersion {
                token: "x".to_string(),
            },
            VersioningError::UnsupportedVersion {
                requested: ApiVersion::new(9, 0),
                supported: vec![],
            },
            VersioningError::NotFound {
                method: Method::GET,
                path: "/v1/none".to_string(),
                version: None,
            },
            VersioningError::DuplicateBinding {
                template: "/v{version}/stuff".to_string(),
                method: Method::GET,
                version: ApiVersion::new(1, 0),
            },
        ];

        let codes: std::collections::HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(errors[3].is_registration_error());
        assert!(!errors[2].is_registration_error());
        assert_eq!(errors[2].status_code(), StatusCode::NOT_FOUND);
    }
}

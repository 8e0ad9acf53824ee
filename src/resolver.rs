//! Version resolution.
//!
//! [`VersionReader`] pulls the raw token out of a request; [`resolve`] turns
//! that token into the effective [`ApiVersion`].

use crate::error::{Result, VersioningError};
use crate::version::{ApiVersion, VersionSet};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Determine the effective API version for a request.
///
/// An absent token selects `default`. A token that does not parse fails with
/// [`VersioningError::MalformedVersion`]; a parsed version missing from
/// `supported` fails with [`VersioningError::UnsupportedVersion`].
pub fn resolve(
    token: Option<&str>,
    default: ApiVersion,
    supported: &VersionSet,
) -> Result<ApiVersion> {
    let Some(token) = token else {
        return Ok(default);
    };

    let requested: ApiVersion =
        token
            .parse()
            .map_err(|_| VersioningError::MalformedVersion {
                token: token.to_string(),
            })?;

    if supported.contains(&requested) {
        Ok(requested)
    } else {
        Err(VersioningError::UnsupportedVersion {
            requested,
            supported: supported.iter().copied().collect(),
        })
    }
}

/// Where the version token is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VersionReader {
    /// A path template parameter, e.g. `/v{version}/stuff`
    UrlSegment {
        #[serde(default = "default_segment_param")]
        param: String,
    },

    /// A request header, e.g. `api-version: 2.0`
    Header {
        #[serde(default = "default_api_version_key")]
        name: String,
    },

    /// A query parameter, e.g. `?api-version=2.0`
    Query {
        #[serde(default = "default_api_version_key")]
        param: String,
    },
}

fn default_segment_param() -> String {
    "version".to_string()
}

fn default_api_version_key() -> String {
    "api-version".to_string()
}

impl Default for VersionReader {
    fn default() -> Self {
        Self::UrlSegment {
            param: default_segment_param(),
        }
    }
}

impl VersionReader {
    /// Extract the raw token.
    ///
    /// `path_params` are the parameters captured by the matched path template.
    pub fn read(
        &self,
        path_params: &HashMap<String, String>,
        query: Option<&str>,
        headers: &HeaderMap,
    ) -> Option<String> {
        match self {
            Self::UrlSegment { param } => path_params.get(param).cloned(),
            Self::Header { name } => headers
                .get(name.as_str())
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string()),
            Self::Query { param } => query.and_then(|qs| query_value(qs, param)),
        }
    }

    /// Name of the path parameter carrying the version, if versions live in the URL.
    pub fn path_param(&self) -> Option<&str> {
        match self {
            Self::UrlSegment { param } => Some(param),
            _ => None,
        }
    }
}

/// First value of `param` in a form-encoded query string, percent-decoded.
fn query_value(query: &str, param: &str) -> Option<String> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .ok()?
        .into_iter()
        .find(|(key, _)| key == param)
        .map(|(_, value)| value)
}

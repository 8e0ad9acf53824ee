//! API version type and parsing.
//!
//! Versions are `(major, minor)` pairs with structural ordering. Text forms
//! accepted by the parser:
//! - `1.0`, `2.5` (major.minor)
//! - `1`, `2` (major only, minor defaults to 0)
//! - an optional `v`/`V` prefix on any of the above

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Ordered `(major, minor)` identifier for an API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiVersion {
    major: u32,
    minor: u32,
}

/// Every version registered anywhere in a route table, ascending.
pub type VersionSet = BTreeSet<ApiVersion>;

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub const fn major(&self) -> u32 {
        self.major
    }

    pub const fn minor(&self) -> u32 {
        self.minor
    }

    /// Documentation group name: `v1` for 1.0, `v1.5` for 1.5.
    pub fn group_name(&self) -> String {
        format!("v{}", self.url_segment())
    }

    /// Value substituted for the version parameter in documented URLs.
    pub fn url_segment(&self) -> String {
        if self.minor == 0 {
            self.major.to_string()
        } else {
            format!("{}.{}", self.major, self.minor)
        }
    }

    /// Parse a documentation group name produced by [`ApiVersion::group_name`].
    pub fn from_group_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix('v')?;
        rest.parse().ok()
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Error returned when a version token cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("empty version string")]
    Empty,
    #[error("invalid number '{0}' in version")]
    InvalidNumber(String),
    #[error("invalid version format '{0}', expected major.minor")]
    InvalidFormat(String),
}

impl FromStr for ApiVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        if body.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let mut parts = body.split('.');
        let major = parse_component(parts.next().unwrap_or_default())?;
        let minor = match parts.next() {
            Some(part) => parse_component(part)?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(VersionParseError::InvalidFormat(s.to_string()));
        }

        Ok(Self::new(major, minor))
    }
}

fn parse_component(part: &str) -> Result<u32, VersionParseError> {
    // u32::from_str accepts a leading '+', which is not a version digit
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VersionParseError::InvalidNumber(part.to_string()));
    }
    part.parse()
        .map_err(|_| VersionParseError::InvalidNumber(part.to_string()))
}

impl TryFrom<String> for ApiVersion {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApiVersion> for String {
    fn from(version: ApiVersion) -> Self {
        version.to_string()
    }
}

/// Render versions as a comma separated list, e.g. `1.0, 2.0`.
pub fn join_versions<'a>(versions: impl IntoIterator<Item = &'a ApiVersion>) -> String {
    versions
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

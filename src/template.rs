//! Path templates.
//!
//! Templates use brace parameters with an optional constraint:
//! `/v{version:apiVersion}/stuff/{id:int}`. A parameter may share a segment
//! with literal text (`v{version}`). Templates are compiled to an anchored
//! regex once at registration.

use crate::error::{Result, VersioningError};
use regex::Regex;
use std::collections::HashMap;

/// A compiled path template.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    key: String,
    regex: Regex,
    params: Vec<String>,
    literal_len: usize,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let raw = normalize_path(template);
        let invalid = |reason: &str| VersioningError::InvalidTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        if !raw.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let mut pattern = String::from("^");
        let mut params: Vec<String> = Vec::new();
        let mut literal_len = 0;
        let mut rest = raw.as_str();

        while !rest.is_empty() {
            match rest.find(['{', '}']) {
                Some(idx) if rest.as_bytes()[idx] == b'}' => {
                    return Err(invalid("unbalanced '}'"));
                }
                Some(idx) => {
                    let literal = &rest[..idx];
                    pattern.push_str(&regex::escape(literal));
                    literal_len += literal.len();

                    let after = &rest[idx + 1..];
                    let end = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
                    let inner = &after[..end];
                    let (name, constraint) = match inner.split_once(':') {
                        Some((name, constraint)) => (name, Some(constraint)),
                        None => (inner, None),
                    };

                    if !is_identifier(name) {
                        return Err(invalid(&format!("invalid parameter name '{}'", name)));
                    }
                    if params.iter().any(|p| p == name) {
                        return Err(invalid(&format!("duplicate parameter '{}'", name)));
                    }
                    let class = match canonical_constraint(constraint) {
                        Some(None) => "[^/]+",
                        Some(Some(_)) => "-?[0-9]+",
                        None => {
                            return Err(invalid(&format!(
                                "unknown constraint '{}'",
                                constraint.unwrap_or_default()
                            )));
                        }
                    };

                    pattern.push_str(&format!("(?P<{}>{})", name, class));
                    params.push(name.to_string());
                    rest = &after[end + 1..];
                }
                None => {
                    pattern.push_str(&regex::escape(rest));
                    literal_len += rest.len();
                    rest = "";
                }
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            key: template_key(&raw),
            raw,
            regex,
            params,
            literal_len,
        })
    }

    /// Normalized template text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Shape of the template: constraints that match the same segments are
    /// collapsed, so `/v{version:apiVersion}/stuff` and `/v{version}/stuff`
    /// share the key `/v{version}/stuff`.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Parameter names in declaration order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }

    /// Match a concrete request path, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let path = normalize_path(path);
        let captures = self.regex.captures(&path)?;
        Some(
            self.params
                .iter()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }

    /// Replace one parameter with a concrete value, leaving the others intact.
    ///
    /// Constraints are dropped from the remaining parameters so the result is a
    /// plain OpenAPI path (`/v1/stuff/{id}`).
    pub fn substitute(&self, name: &str, value: &str) -> String {
        self.render(Some((name, value)))
    }

    /// The template with constraints dropped (`/v{version}/stuff/{id}`).
    pub fn plain(&self) -> String {
        self.render(None)
    }

    fn render(&self, replace: Option<(&str, &str)>) -> String {
        let mut out = String::with_capacity(self.raw.len());
        let mut rest = self.raw.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find('}').unwrap_or(after.len());
            let param = after[..end].split(':').next().unwrap_or_default();
            match replace {
                Some((name, value)) if name == param => out.push_str(value),
                _ => {
                    out.push('{');
                    out.push_str(param);
                    out.push('}');
                }
            }
            rest = after.get(end + 1..).unwrap_or_default();
        }
        out.push_str(rest);
        out
    }

    /// Ordering key: fewer parameters first, then more literal text.
    pub(crate) fn specificity(&self) -> (usize, std::cmp::Reverse<usize>) {
        (self.params.len(), std::cmp::Reverse(self.literal_len))
    }
}

/// Strip a trailing slash (except for the root path).
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.len() > 1 && trimmed.ends_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        trimmed.to_string()
    }
}

/// Key of a template string without compiling it. See [`PathTemplate::key`].
pub fn template_key(template: &str) -> String {
    let raw = normalize_path(template);
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw.as_str();
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').unwrap_or(after.len());
        let (name, constraint) = match after[..end].split_once(':') {
            Some((name, constraint)) => (name, Some(constraint)),
            None => (&after[..end], None),
        };
        out.push('{');
        out.push_str(name);
        match canonical_constraint(constraint) {
            Some(None) => {}
            Some(Some(canonical)) => {
                out.push(':');
                out.push_str(canonical);
            }
            None => {
                out.push(':');
                out.push_str(constraint.unwrap_or_default());
            }
        }
        out.push('}');
        rest = after.get(end + 1..).unwrap_or_default();
    }
    out.push_str(rest);
    out
}

/// `Some(None)` for unconstrained segments, `Some(Some(name))` for numeric
/// ones, `None` for unknown constraints.
fn canonical_constraint(constraint: Option<&str>) -> Option<Option<&'static str>> {
    match constraint {
        None | Some("apiVersion") => Some(None),
        Some("int") | Some("long") => Some(Some("int")),
        Some(_) => None,
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

//! Versioned route table.
//!
//! Bindings are keyed by (path template, method, version). The table is built
//! once through [`RouteTableBuilder`] and is immutable afterwards, so it can be
//! shared across request workers without locking.

use crate::error::{Result, VersioningError};
use crate::resolver::VersionReader;
use crate::template::{normalize_path, template_key, PathTemplate};
use crate::version::{ApiVersion, VersionSet};
use chrono::{DateTime, Utc};
use http::Method;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Options fixed for the lifetime of a route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersioningOptions {
    /// Version used when a request carries no token
    pub default_version: ApiVersion,

    /// Where request version tokens are read from
    #[serde(default)]
    pub reader: VersionReader,
}

impl Default for VersioningOptions {
    fn default() -> Self {
        Self {
            default_version: ApiVersion::new(1, 0),
            reader: VersionReader::default(),
        }
    }
}

/// Static documentation attached to a binding at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationDoc {
    #[serde(default)]
    pub operation_id: Option<String>,

    #[serde(default)]
    pub summary: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Descriptions of path parameters, keyed by parameter name
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Optional metadata for [`RouteTableBuilder::register_with`].
#[derive(Debug, Clone, Default)]
pub struct BindingOptions {
    pub deprecated: bool,
    pub sunset_at: Option<DateTime<Utc>>,
    /// Link to a migration or sunset policy document
    pub link: Option<String>,
    pub doc: OperationDoc,
}

impl BindingOptions {
    pub fn deprecated() -> Self {
        Self {
            deprecated: true,
            ..Self::default()
        }
    }

    pub fn with_sunset(mut self, sunset_at: DateTime<Utc>) -> Self {
        self.sunset_at = Some(sunset_at);
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_doc(mut self, doc: OperationDoc) -> Self {
        self.doc = doc;
        self
    }
}

/// A handler bound to one path template, method and version.
#[derive(Debug)]
pub struct RouteBinding<H> {
    template: String,
    method: Method,
    version: ApiVersion,
    handler: H,
    deprecated: bool,
    sunset_at: Option<DateTime<Utc>>,
    link: Option<String>,
    doc: OperationDoc,
}

impl<H> RouteBinding<H> {
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn version(&self) -> ApiVersion {
        self.version
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    pub fn sunset_at(&self) -> Option<DateTime<Utc>> {
        self.sunset_at
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    pub fn doc(&self) -> &OperationDoc {
        &self.doc
    }
}

/// One handler registered under several versions.
///
/// ```
/// use http::Method;
/// use zentinel_api_versioning::{ApiVersion, RouteTableBuilder, VersionedRoute, VersioningOptions};
///
/// let options = VersioningOptions::default();
/// let mut builder = RouteTableBuilder::new(&options);
/// builder
///     .add(
///         VersionedRoute::new(Method::GET, "/v{version}/stuff", "list_stuff")
///             .deprecated_version(ApiVersion::new(1, 0))
///             .version(ApiVersion::new(2, 0)),
///     )
///     .unwrap();
/// let table = builder.build();
/// assert_eq!(table.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct VersionedRoute<H> {
    method: Method,
    template: String,
    handler: H,
    versions: Vec<(ApiVersion, BindingOptions)>,
    doc: OperationDoc,
}

impl<H: Clone> VersionedRoute<H> {
    pub fn new(method: Method, template: impl Into<String>, handler: H) -> Self {
        Self {
            method,
            template: template.into(),
            handler,
            versions: Vec::new(),
            doc: OperationDoc::default(),
        }
    }

    /// Serve this route at `version`.
    pub fn version(mut self, version: ApiVersion) -> Self {
        self.versions.push((version, BindingOptions::default()));
        self
    }

    /// Serve this route at `version`, marked deprecated.
    pub fn deprecated_version(mut self, version: ApiVersion) -> Self {
        self.versions.push((version, BindingOptions::deprecated()));
        self
    }

    /// Serve this route at `version` with explicit options.
    pub fn version_with(mut self, version: ApiVersion, options: BindingOptions) -> Self {
        self.versions.push((version, options));
        self
    }

    /// Documentation shared by every version that has none of its own.
    pub fn doc(mut self, doc: OperationDoc) -> Self {
        self.doc = doc;
        self
    }
}

struct RouteEntry<H> {
    template: PathTemplate,
    methods: HashMap<Method, BTreeMap<ApiVersion, Arc<RouteBinding<H>>>>,
}

/// Result of matching a concrete path against the registered templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch<'a> {
    pub template: &'a str,
    pub params: HashMap<String, String>,
    entry: usize,
}

/// Immutable (template, method, version) → binding map.
///
/// Templates are keyed by [`PathTemplate::key`], so spellings that match the
/// same paths share one entry.
pub struct RouteTable<H> {
    default_version: ApiVersion,
    entries: Vec<RouteEntry<H>>,
    index: HashMap<String, usize>,
    versions: VersionSet,
    bindings: usize,
}

impl<H> RouteTable<H> {
    pub fn builder(options: &VersioningOptions) -> RouteTableBuilder<H> {
        RouteTableBuilder::new(options)
    }

    pub fn default_version(&self) -> ApiVersion {
        self.default_version
    }

    /// Exact lookup. There is no nearest-version fallback.
    pub fn lookup(
        &self,
        template: &str,
        method: &Method,
        version: ApiVersion,
    ) -> Result<&RouteBinding<H>> {
        self.lookup_shared(template, method, version)
            .map(|binding| &**binding)
    }

    pub(crate) fn lookup_shared(
        &self,
        template: &str,
        method: &Method,
        version: ApiVersion,
    ) -> Result<&Arc<RouteBinding<H>>> {
        self.versions_for(template, method)
            .and_then(|versions| versions.get(&version))
            .ok_or_else(|| VersioningError::NotFound {
                method: method.clone(),
                path: normalize_path(template),
                version: Some(version),
            })
    }

    /// Binding for `method` and `version` on the entry a path matched.
    pub(crate) fn binding_for(
        &self,
        matched: &PathMatch<'_>,
        method: &Method,
        version: ApiVersion,
    ) -> Option<&Arc<RouteBinding<H>>> {
        self.entries
            .get(matched.entry)
            .and_then(|entry| entry.methods.get(method))
            .and_then(|versions| versions.get(&version))
    }

    /// Versions registered for (template, method), ascending.
    pub fn list_versions(&self, template: &str, method: &Method) -> Vec<ApiVersion> {
        self.versions_for(template, method)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Versions registered for (template, method) split into (supported, deprecated).
    pub fn reported_versions(
        &self,
        template: &str,
        method: &Method,
    ) -> (Vec<ApiVersion>, Vec<ApiVersion>) {
        let mut supported = Vec::new();
        let mut deprecated = Vec::new();
        if let Some(versions) = self.versions_for(template, method) {
            for (version, binding) in versions {
                if binding.is_deprecated() {
                    deprecated.push(*version);
                } else {
                    supported.push(*version);
                }
            }
        }
        (supported, deprecated)
    }

    fn versions_for(
        &self,
        template: &str,
        method: &Method,
    ) -> Option<&BTreeMap<ApiVersion, Arc<RouteBinding<H>>>> {
        self.index
            .get(&template_key(template))
            .and_then(|idx| self.entries[*idx].methods.get(method))
    }

    /// Every version registered anywhere in the table.
    pub fn versions(&self) -> &VersionSet {
        &self.versions
    }

    /// Find the most specific template matching `path`.
    pub fn match_path(&self, path: &str) -> Option<PathMatch<'_>> {
        self.match_all(path).into_iter().next()
    }

    /// Every template matching `path`, most specific first. Ties keep
    /// registration order.
    pub fn match_all(&self, path: &str) -> Vec<PathMatch<'_>> {
        let mut matches: Vec<_> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| {
                entry.template.matches(path).map(|params| {
                    (
                        entry.template.specificity(),
                        PathMatch {
                            template: entry.template.as_str(),
                            params,
                            entry: idx,
                        },
                    )
                })
            })
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        matches.into_iter().map(|(_, matched)| matched).collect()
    }

    /// Parsed template for a registered template string.
    pub fn template(&self, template: &str) -> Option<&PathTemplate> {
        self.index
            .get(&template_key(template))
            .map(|idx| &self.entries[*idx].template)
    }

    /// All bindings, grouped by template in registration order.
    pub fn bindings(&self) -> impl Iterator<Item = &RouteBinding<H>> + '_ {
        self.entries.iter().flat_map(|entry| {
            entry
                .methods
                .values()
                .flat_map(|versions| versions.values().map(|binding| &**binding))
        })
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.bindings == 0
    }
}

/// Registration-phase builder for a [`RouteTable`].
pub struct RouteTableBuilder<H> {
    table: RouteTable<H>,
}

impl<H> RouteTableBuilder<H> {
    pub fn new(options: &VersioningOptions) -> Self {
        Self {
            table: RouteTable {
                default_version: options.default_version,
                entries: Vec::new(),
                index: HashMap::new(),
                versions: VersionSet::new(),
                bindings: 0,
            },
        }
    }

    /// Register a non-deprecated binding.
    pub fn register(
        &mut self,
        template: &str,
        method: Method,
        version: ApiVersion,
        handler: H,
    ) -> Result<&mut Self> {
        self.register_with(template, method, version, handler, BindingOptions::default())
    }

    /// Register a binding with deprecation and documentation metadata.
    pub fn register_with(
        &mut self,
        template: &str,
        method: Method,
        version: ApiVersion,
        handler: H,
        options: BindingOptions,
    ) -> Result<&mut Self> {
        let parsed = PathTemplate::parse(template)?;
        let key = parsed.key().to_string();
        let raw = parsed.as_str().to_string();

        if options.sunset_at.is_some() && !options.deprecated {
            return Err(VersioningError::SunsetWithoutDeprecation {
                template: raw,
                method,
                version,
            });
        }

        let idx = match self.table.index.get(&key) {
            Some(idx) => *idx,
            None => {
                self.table.entries.push(RouteEntry {
                    template: parsed,
                    methods: HashMap::new(),
                });
                let idx = self.table.entries.len() - 1;
                self.table.index.insert(key, idx);
                idx
            }
        };

        let versions = self.table.entries[idx]
            .methods
            .entry(method.clone())
            .or_default();
        if versions.contains_key(&version) {
            return Err(VersioningError::DuplicateBinding {
                template: raw,
                method,
                version,
            });
        }

        debug!(
            template = %raw,
            method = %method,
            version = %version,
            deprecated = options.deprecated,
            sunset = ?options.sunset_at,
            "Registered route binding"
        );

        versions.insert(
            version,
            Arc::new(RouteBinding {
                template: raw,
                method,
                version,
                handler,
                deprecated: options.deprecated,
                sunset_at: options.sunset_at,
                link: options.link,
                doc: options.doc,
            }),
        );
        self.table.bindings += 1;

        Ok(self)
    }

    /// Freeze the table.
    pub fn build(self) -> RouteTable<H> {
        let mut table = self.table;
        table.versions = table.bindings().map(|binding| binding.version()).collect();
        let versions = &table.versions;
        if !table.is_empty() && !versions.contains(&table.default_version) {
            warn!(
                default_version = %table.default_version,
                "Default API version has no registered bindings"
            );
        }
        info!(
            bindings = table.len(),
            templates = table.entries.len(),
            versions = versions.len(),
            "Route table built"
        );
        table
    }
}

impl<H: Clone> RouteTableBuilder<H> {
    /// Register every version of a [`VersionedRoute`].
    pub fn add(&mut self, route: VersionedRoute<H>) -> Result<&mut Self> {
        for (version, mut options) in route.versions {
            if options.doc == OperationDoc::default() {
                options.doc = route.doc.clone();
            }
            self.register_with(
                &route.template,
                route.method.clone(),
                version,
                route.handler.clone(),
                options,
            )?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn v(major: u32) -> ApiVersion {
        ApiVersion::new(major, 0)
    }

    fn options() -> VersioningOptions {
        VersioningOptions {
            default_version: v(3),
            reader: VersionReader::default(),
        }
    }

    fn stuff_table() -> RouteTable<&'static str> {
        let opts = options();
        let mut builder = RouteTable::builder(&opts);
        builder
            .add(
                VersionedRoute::new(Method::GET, "/v{version}/stuff/", "list_stuff")
                    .deprecated_version(v(1))
                    .version(v(2)),
            )
            .unwrap()
            .register("/v{version}/stuff", Method::GET, v(3), "list_stuff_v3")
            .unwrap()
            .register("/v{version}/stuff/{id:int}", Method::GET, v(3), "get_stuff")
            .unwrap()
            .register_with(
                "/v{version}/stuff/deprecated",
                Method::GET,
                v(1),
                "deprecated",
                BindingOptions::deprecated(),
            )
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_lookup_after_register() {
        let table = stuff_table();
        let binding = table.lookup("/v{version}/stuff", &Method::GET, v(3)).unwrap();
        assert_eq!(*binding.handler(), "list_stuff_v3");
        assert_eq!(binding.version(), v(3));
        assert!(!binding.is_deprecated());

        let binding = table.lookup("/v{version}/stuff/", &Method::GET, v(1)).unwrap();
        assert_eq!(*binding.handler(), "list_stuff");
        assert!(binding.is_deprecated());
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_lookup_is_exact() {
        let table = stuff_table();
        let err = table
            .lookup("/v{version}/stuff/{id:int}", &Method::GET, v(2))
            .unwrap_err();
        assert_eq!(
            err,
            VersioningError::NotFound {
                method: Method::GET,
                path: "/v{version}/stuff/{id:int}".to_string(),
                version: Some(v(2)),
            }
        );
        assert!(table
            .lookup("/v{version}/stuff", &Method::POST, v(3))
            .is_err());
        assert!(table.lookup("/nope", &Method::GET, v(3)).is_err());
    }

    #[test]
    fn test_duplicate_binding_any_order() {
        let opts = options();
        for order in [["a", "b"], ["b", "a"]] {
            let mut builder = RouteTableBuilder::new(&opts);
            builder
                .register("/v{version}/stuff", Method::GET, v(1), order[0])
                .unwrap();
            let err = builder
                .register("/v{version}/stuff/", Method::GET, v(1), order[1])
                .err()
                .unwrap();
            assert!(matches!(err, VersioningError::DuplicateBinding { .. }));
        }

        let mut builder = RouteTableBuilder::new(&opts);
        builder
            .register("/v{version}/stuff", Method::GET, v(1), "get")
            .unwrap()
            .register("/v{version}/stuff", Method::POST, v(1), "post")
            .unwrap()
            .register("/v{version}/stuff", Method::GET, v(2), "get")
            .unwrap();
        assert_eq!(builder.build().len(), 3);
    }

    #[test]
    fn test_equivalent_templates_are_duplicates() {
        let opts = options();
        let mut builder = RouteTableBuilder::new(&opts);
        builder
            .register("/v{version:apiVersion}/stuff", Method::GET, v(1), "a")
            .unwrap();
        let err = builder
            .register("/v{version}/stuff", Method::GET, v(1), "b")
            .err()
            .unwrap();
        assert_eq!(
            err,
            VersioningError::DuplicateBinding {
                template: "/v{version}/stuff".to_string(),
                method: Method::GET,
                version: v(1),
            }
        );

        builder
            .register("/v{version}/stuff", Method::GET, v(2), "b")
            .unwrap();
        let table = builder.build();
        assert_eq!(
            table.list_versions("/v{version:apiVersion}/stuff", &Method::GET),
            vec![v(1), v(2)]
        );
        let binding = table.lookup("/v{version}/stuff", &Method::GET, v(2)).unwrap();
        assert_eq!(binding.template(), "/v{version}/stuff");
    }

    #[test]
    fn test_match_all_orders_by_specificity() {
        let table = stuff_table();
        let templates: Vec<_> = table
            .match_all("/v1/stuff/deprecated")
            .into_iter()
            .map(|m| m.template)
            .collect();
        assert_eq!(templates, vec!["/v{version}/stuff/deprecated"]);

        let opts = options();
        let mut builder = RouteTableBuilder::new(&opts);
        builder
            .register("/v{version}/stuff/{id}", Method::GET, v(1), "by_id")
            .unwrap()
            .register("/v{version}/stuff/special", Method::POST, v(1), "special")
            .unwrap();
        let table = builder.build();
        let templates: Vec<_> = table
            .match_all("/v1/stuff/special")
            .into_iter()
            .map(|m| m.template)
            .collect();
        assert_eq!(
            templates,
            vec!["/v{version}/stuff/special", "/v{version}/stuff/{id}"]
        );
    }

    #[test]
    fn test_sunset_requires_deprecation() {
        let opts = options();
        let mut builder = RouteTableBuilder::new(&opts);
        let sunset = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let err = builder
            .register_with(
                "/v{version}/stuff",
                Method::GET,
                v(1),
                "h",
                BindingOptions {
                    sunset_at: Some(sunset),
                    ..BindingOptions::default()
                },
            )
            .err()
            .unwrap();
        assert!(matches!(
            err,
            VersioningError::SunsetWithoutDeprecation { .. }
        ));

        builder
            .register_with(
                "/v{version}/stuff",
                Method::GET,
                v(1),
                "h",
                BindingOptions::deprecated().with_sunset(sunset),
            )
            .unwrap();
        let table = builder.build();
        let binding = table.lookup("/v{version}/stuff", &Method::GET, v(1)).unwrap();
        assert_eq!(binding.sunset_at(), Some(sunset));
    }

    #[test]
    fn test_list_versions_ascending() {
        let table = stuff_table();
        assert_eq!(
            table.list_versions("/v{version}/stuff", &Method::GET),
            vec![v(1), v(2), v(3)]
        );
        assert!(table
            .list_versions("/v{version}/stuff", &Method::DELETE)
            .is_empty());

        let (supported, deprecated) = table.reported_versions("/v{version}/stuff", &Method::GET);
        assert_eq!(supported, vec![v(2), v(3)]);
        assert_eq!(deprecated, vec![v(1)]);
    }

    #[test]
    fn test_version_set() {
        let table = stuff_table();
        let versions: Vec<_> = table.versions().iter().copied().collect();
        assert_eq!(versions, vec![v(1), v(2), v(3)]);
    }

    #[test]
    fn test_match_path_prefers_specific_template() {
        let table = stuff_table();

        let matched = table.match_path("/v1/stuff/deprecated").unwrap();
        assert_eq!(matched.template, "/v{version}/stuff/deprecated");
        assert_eq!(matched.params["version"], "1");

        let matched = table.match_path("/v3/stuff/7").unwrap();
        assert_eq!(matched.template, "/v{version}/stuff/{id:int}");
        assert_eq!(matched.params["id"], "7");

        let matched = table.match_path("/v2/stuff/").unwrap();
        assert_eq!(matched.template, "/v{version}/stuff");

        assert!(table.match_path("/other").is_none());
    }

    #[test]
    fn test_versioned_route_shares_doc() {
        let opts = options();
        let mut builder = RouteTableBuilder::new(&opts);
        builder
            .add(
                VersionedRoute::new(Method::GET, "/v{version}/stuff", "list")
                    .version(v(1))
                    .version(v(2))
                    .doc(OperationDoc {
                        summary: Some("List stuff".to_string()),
                        ..OperationDoc::default()
                    }),
            )
            .unwrap();
        let table = builder.build();
        for version in [v(1), v(2)] {
            let binding = table.lookup("/v{version}/stuff", &Method::GET, version).unwrap();
            assert_eq!(binding.doc().summary.as_deref(), Some("List stuff"));
        }
    }

    #[test]
    fn test_invalid_template_rejected() {
        let opts = options();
        let mut builder = RouteTableBuilder::<()>::new(&opts);
        let err = builder
            .register("stuff", Method::GET, v(1), ())
            .err()
            .unwrap();
        assert!(matches!(err, VersioningError::InvalidTemplate { .. }));
    }
}

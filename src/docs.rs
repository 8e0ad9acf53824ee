//! Documentation projection.
//!
//! [`project`] derives one renderer-independent [`Document`] per version from a
//! route table. [`Document::to_openapi`] renders a document as OpenAPI with
//! utoipa.

use crate::config::DocumentationConfig;
use crate::resolver::VersionReader;
use crate::table::RouteTable;
use crate::version::ApiVersion;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::openapi::path::{Operation, OperationBuilder, ParameterBuilder, ParameterIn};
use utoipa::openapi::schema::{ObjectBuilder, Schema, SchemaType, Type};
use utoipa::openapi::{
    Deprecated, InfoBuilder, OpenApi, OpenApiBuilder, PathItem, PathsBuilder, RefOr, Required,
    ResponseBuilder,
};

/// Where a documented parameter is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentParameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentOperation {
    /// Path with the version parameter substituted, e.g. `/v1/stuff/{id}`
    pub path: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub parameters: Vec<DocumentParameter>,
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sunset: Option<DateTime<Utc>>,
}

/// Documentation for one API version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub version: ApiVersion,
    pub group_name: String,
    /// Sorted by path, then method
    pub operations: Vec<DocumentOperation>,
}

impl Document {
    /// A version is deprecated when every operation in it is.
    pub fn is_deprecated(&self) -> bool {
        !self.operations.is_empty() && self.operations.iter().all(|op| op.deprecated)
    }

    /// Earliest sunset among the operations of this version.
    pub fn earliest_sunset(&self) -> Option<DateTime<Utc>> {
        self.operations.iter().filter_map(|op| op.sunset).min()
    }

    /// Render as an OpenAPI document.
    ///
    /// Header and query readers add the version parameter to every operation.
    pub fn to_openapi(&self, config: &DocumentationConfig, reader: &VersionReader) -> OpenApi {
        let mut description = config.description.clone().unwrap_or_default();
        if self.is_deprecated() {
            if !description.is_empty() {
                description.push(' ');
            }
            description.push_str("This API version has been deprecated.");
        }
        if let Some(sunset) = self.earliest_sunset() {
            if !description.is_empty() {
                description.push(' ');
            }
            description.push_str(&format!(
                "Parts of this version are sunset on {}.",
                sunset.format("%Y-%m-%d")
            ));
        }

        let info = InfoBuilder::new()
            .title(config.title.clone())
            .version(self.version.to_string())
            .description((!description.is_empty()).then_some(description))
            .build();

        let mut items: BTreeMap<&str, PathItem> = BTreeMap::new();
        for op in &self.operations {
            let operation = self.render_operation(op, reader);
            let item = items.entry(op.path.as_str()).or_default();
            match op.method.as_str() {
                "GET" => item.get = Some(operation),
                "POST" => item.post = Some(operation),
                "PUT" => item.put = Some(operation),
                "DELETE" => item.delete = Some(operation),
                "PATCH" => item.patch = Some(operation),
                "HEAD" => item.head = Some(operation),
                "OPTIONS" => item.options = Some(operation),
                "TRACE" => item.trace = Some(operation),
                other => {
                    tracing::debug!(method = %other, path = %op.path, "Skipping undocumentable method");
                }
            }
        }

        let mut paths = PathsBuilder::new();
        for (path, item) in items {
            paths = paths.path(path, item);
        }

        OpenApiBuilder::new().info(info).paths(paths.build()).build()
    }

    fn render_operation(&self, op: &DocumentOperation, reader: &VersionReader) -> Operation {
        let mut builder = OperationBuilder::new()
            .operation_id(op.operation_id.clone())
            .summary(op.summary.clone())
            .description(op.description.clone())
            .response("200", ResponseBuilder::new().description("Success").build());

        if !op.tags.is_empty() {
            builder = builder.tags(Some(op.tags.clone()));
        }
        if op.deprecated {
            builder = builder.deprecated(Some(Deprecated::True));
        }

        for param in &op.parameters {
            builder = builder.parameter(
                ParameterBuilder::new()
                    .name(param.name.clone())
                    .parameter_in(match param.location {
                        ParameterLocation::Path => ParameterIn::Path,
                        ParameterLocation::Query => ParameterIn::Query,
                        ParameterLocation::Header => ParameterIn::Header,
                    })
                    .required(if param.required {
                        Required::True
                    } else {
                        Required::False
                    })
                    .description(param.description.clone())
                    .schema(Some(string_schema()))
                    .build(),
            );
        }

        let version_param = match reader {
            VersionReader::UrlSegment { .. } => None,
            VersionReader::Header { name } => Some((name, ParameterIn::Header)),
            VersionReader::Query { param } => Some((param, ParameterIn::Query)),
        };
        if let Some((name, location)) = version_param {
            builder = builder.parameter(
                ParameterBuilder::new()
                    .name(name.clone())
                    .parameter_in(location)
                    .required(Required::False)
                    .description(Some(format!(
                        "The requested API version, defaults to the latest served version. This document describes {}.",
                        self.version
                    )))
                    .schema(Some(string_schema()))
                    .build(),
            );
        }

        builder.build()
    }
}

fn string_schema() -> RefOr<Schema> {
    RefOr::T(Schema::Object(
        ObjectBuilder::new()
            .schema_type(SchemaType::Type(Type::String))
            .build(),
    ))
}

/// Project a route table into one document per registered version.
///
/// Versions that only exist through deprecated bindings get a document too.
pub fn project<H>(table: &RouteTable<H>) -> BTreeMap<ApiVersion, Document> {
    project_with(table, &VersionReader::default())
}

/// Like [`project`], substituting the path parameter used by `reader`.
pub fn project_with<H>(
    table: &RouteTable<H>,
    reader: &VersionReader,
) -> BTreeMap<ApiVersion, Document> {
    let version_param = reader.path_param();
    let mut documents: BTreeMap<ApiVersion, Document> = BTreeMap::new();

    for binding in table.bindings() {
        let version = binding.version();
        let template = table.template(binding.template());
        let path = template
            .map(|t| match version_param {
                Some(param) => t.substitute(param, &version.url_segment()),
                None => t.plain(),
            })
            .unwrap_or_else(|| binding.template().to_string());
        let doc = binding.doc();

        let parameters = template
            .map(|t| {
                t.params()
                    .iter()
                    .filter(|name| Some(name.as_str()) != version_param)
                    .map(|name| DocumentParameter {
                        name: name.clone(),
                        location: ParameterLocation::Path,
                        required: true,
                        description: doc.parameters.get(name).cloned(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        documents
            .entry(version)
            .or_insert_with(|| Document {
                version,
                group_name: version.group_name(),
                operations: Vec::new(),
            })
            .operations
            .push(DocumentOperation {
                path,
                method: binding.method().as_str().to_string(),
                operation_id: doc.operation_id.clone(),
                summary: doc.summary.clone(),
                description: doc.description.clone(),
                tags: doc.tags.clone(),
                parameters,
                deprecated: binding.is_deprecated(),
                sunset: binding.sunset_at(),
            });
    }

    for document in documents.values_mut() {
        document
            .operations
            .sort_by(|a, b| (&a.path, &a.method).cmp(&(&b.path, &b.method)));
    }

    documents
}

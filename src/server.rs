//! Reference HTTP host for the versioning gateway.
//!
//! Serves per-version OpenAPI documents under `/swagger`, Prometheus metrics
//! under `/metrics`, and answers every other request with the resolution the
//! gateway produced for it.

use crate::config::{DocumentationConfig, GatewayConfig};
use crate::docs::project_with;
use crate::error::VersioningError;
use crate::gateway::{RequestParts, VersioningGateway};
use crate::headers::{error_body, resolution_body, DeprecationHeaders};
use crate::version::ApiVersion;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, Response, StatusCode, Uri};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

const JSON: &str = "application/json";

/// Pause after a failed accept; errors such as EMFILE repeat until a descriptor frees up.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Shared state of the reference host.
pub struct AppState {
    gateway: Arc<VersioningGateway<String>>,
    documentation: DocumentationConfig,
    metrics_enabled: bool,
}

impl AppState {
    pub fn new(gateway: Arc<VersioningGateway<String>>, config: &GatewayConfig) -> Self {
        Self {
            gateway,
            documentation: config.documentation.clone(),
            metrics_enabled: config.metrics.enabled,
        }
    }

    pub fn gateway(&self) -> &Arc<VersioningGateway<String>> {
        &self.gateway
    }

    /// Answer one request.
    pub fn handle(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> Response<Full<Bytes>> {
        let path = uri.path();

        if *method == Method::GET {
            if self.documentation.enabled {
                if path == "/swagger" || path == "/swagger/" {
                    return self.document_index();
                }
                if let Some(group) = path
                    .strip_prefix("/swagger/")
                    .and_then(|rest| rest.strip_suffix("/swagger.json"))
                {
                    return self.document(group);
                }
            }
            if self.metrics_enabled && path == "/metrics" {
                return text_response(
                    StatusCode::OK,
                    "text/plain; version=0.0.4; charset=utf-8",
                    self.gateway.encode_metrics(),
                );
            }
        }

        let request = RequestParts::new(method, path, headers).with_query(uri.query());
        match self.gateway.resolve(request) {
            Ok(resolved) => {
                let mut response = json_response(StatusCode::OK, &resolution_body(&resolved));
                let extra = DeprecationHeaders::for_request(&resolved, self.gateway.settings());
                for (name, value) in extra.to_vec() {
                    append_header(&mut response, &name, &value);
                }
                response
            }
            Err(err) => error_response(&err),
        }
    }

    fn document_index(&self) -> Response<Full<Bytes>> {
        let documents = project_with(&self.gateway.table(), self.gateway.reader());
        let groups: Vec<_> = documents
            .values()
            .map(|doc| {
                serde_json::json!({
                    "group": doc.group_name,
                    "version": doc.version,
                    "deprecated": doc.is_deprecated(),
                    "url": format!("/swagger/{}/swagger.json", doc.group_name),
                })
            })
            .collect();
        json_response(StatusCode::OK, &serde_json::Value::Array(groups))
    }

    fn document(&self, group: &str) -> Response<Full<Bytes>> {
        let documents = project_with(&self.gateway.table(), self.gateway.reader());
        let document = ApiVersion::from_group_name(group).and_then(|v| documents.get(&v));

        let Some(document) = document else {
            return json_response(
                StatusCode::NOT_FOUND,
                &serde_json::json!({
                    "error": "unknown_document",
                    "message": format!("No documentation group named {}", group),
                }),
            );
        };

        let openapi = document.to_openapi(&self.documentation, self.gateway.reader());
        match serde_json::to_value(&openapi) {
            Ok(body) => json_response(StatusCode::OK, &body),
            Err(e) => {
                warn!(group = %group, error = %e, "Failed to serialize OpenAPI document");
                text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    "failed to render document".to_string(),
                )
            }
        }
    }
}

fn error_response(err: &VersioningError) -> Response<Full<Bytes>> {
    json_response(err.status_code(), &error_body(err))
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Full<Bytes>> {
    text_response(status, JSON, body.to_string())
}

fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: String,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn append_header(response: &mut Response<Full<Bytes>>, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            response.headers_mut().insert(name, value);
        }
        _ => warn!(header = %name, "Skipping invalid response header"),
    }
}

/// Accept connections on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    info!(address = %listener.local_addr()?, "API versioning gateway listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                let response = state.handle(req.method(), req.uri(), req.headers());
                std::future::ready(Ok::<_, Infallible>(response))
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(peer = %peer, error = %e, "Connection closed with error");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn state() -> AppState {
        let config =
            GatewayConfig::from_yaml(include_str!("../config/default-config.yaml")).unwrap();
        let table = config.build_table().unwrap();
        let gateway = Arc::new(VersioningGateway::new(table, &config).unwrap());
        AppState::new(gateway, &config)
    }

    fn get(state: &AppState, uri: &str) -> Response<Full<Bytes>> {
        state.handle(&Method::GET, &uri.parse().unwrap(), &HeaderMap::new())
    }

    fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = tokio_test::block_on(response.into_body().collect())
            .unwrap()
            .to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_resolves_deprecated_version() {
        let state = state();
        let response = get(&state, "/v1/stuff");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["deprecation"], "true");
        assert!(response.headers().contains_key("sunset"));
        assert_eq!(response.headers()["api-supported-versions"], "2.0, 3.0");

        let body = body_json(response);
        assert_eq!(body["operation_id"], "list_stuff");
        assert_eq!(body["version"], "1.0");
    }

    #[test]
    fn test_default_version_and_params() {
        let state = state();
        let response = get(&state, "/v3/stuff/42");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("deprecation"));

        let body = body_json(response);
        assert_eq!(body["operation_id"], "get_stuff");
        assert_eq!(body["params"]["id"], "42");
    }

    #[test]
    fn test_error_statuses() {
        let state = state();

        let response = get(&state, "/v9/stuff");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response)["error"], "unsupported_api_version");

        let response = get(&state, "/vabc/stuff");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response)["error"], "malformed_api_version");

        let response = get(&state, "/v2/stuff/7");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = get(&state, "/nothing");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_swagger_documents() {
        let state = state();

        let index = body_json(get(&state, "/swagger"));
        let groups: Vec<_> = index
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["group"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(groups, vec!["v1", "v2", "v3"]);
        assert_eq!(index[0]["deprecated"], true);

        let doc = body_json(get(&state, "/swagger/v1/swagger.json"));
        assert_eq!(doc["info"]["title"], "Stuff");
        assert_eq!(doc["paths"]["/v1/stuff"]["get"]["deprecated"], true);

        let response = get(&state, "/swagger/v7/swagger.json");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_metrics_endpoint() {
        let state = state();
        get(&state, "/v2/stuff");
        let response = get(&state, "/metrics");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = tokio_test::block_on(response.into_body().collect())
            .unwrap()
            .to_bytes();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("zentinel_api_versioning_requests_total"));
    }

    #[tokio::test]
    async fn test_serve_over_tcp() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, Arc::new(state())));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /v2/stuff HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8_lossy(&raw);

        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.contains("\"operation_id\":\"list_stuff\""));
        server.abort();
    }
}

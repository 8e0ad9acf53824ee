//! Zentinel API Versioning
//!
//! Version-aware routing core: resolves the API version a request asks for,
//! dispatches it to the binding registered for that exact (path, method,
//! version), annotates the binding with its deprecation and sunset state, and
//! projects the route table into one OpenAPI document per version.
//!
//! # Features
//!
//! - **Version Resolution**: URL segment, header or query readers with a default version
//! - **Versioned Route Table**: immutable once built, swapped atomically on reload
//! - **Deprecation Policy**: Deprecation, Sunset (RFC 8594) and Link headers
//! - **Documentation**: per-version OpenAPI documents under `/swagger/{group}/swagger.json`
//! - **Usage Tracking**: Prometheus metrics for versioned and rejected requests
//!
//! # Example Configuration
//!
//! ```yaml
//! versioning:
//!   default_version: "3.0"
//!   reader:
//!     type: url_segment
//!     param: version
//! routes:
//!   - operation_id: list_stuff
//!     path: /v{version:apiVersion}/stuff
//!     versions:
//!       - version: "1.0"
//!         deprecated: true
//!         sunset_at: "2027-01-01T00:00:00Z"
//!       - version: "2.0"
//!       - version: "3.0"
//! ```

pub mod config;
pub mod docs;
pub mod error;
pub mod gateway;
pub mod headers;
pub mod metrics;
pub mod policy;
pub mod resolver;
pub mod server;
pub mod table;
pub mod template;
pub mod version;

pub use config::GatewayConfig;
pub use docs::{project, project_with, Document};
pub use error::VersioningError;
pub use gateway::{RequestParts, ResolvedRequest, VersioningGateway};
pub use policy::{annotate, DeprecationInfo, PastSunsetAction};
pub use resolver::{resolve, VersionReader};
pub use table::{
    BindingOptions, OperationDoc, RouteBinding, RouteTable, RouteTableBuilder, VersionedRoute,
    VersioningOptions,
};
pub use version::{ApiVersion, VersionSet};

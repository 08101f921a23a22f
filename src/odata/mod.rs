//! Generic OData v4 read service over specification-capable repositories.
pub mod edm;
mod error;
pub mod filter;
pub mod metadata;
pub mod path;
pub mod processor;
pub mod projection;
pub mod query;
pub mod repository;
mod router;
pub mod service;
pub mod specification;

pub use error::{ODataError, Result};
pub use processor::{EntityProcessor, ODataResponse, PrimitiveProcessor};
pub use projection::{ODataMapper, ProjectionBuilder};
pub use repository::{Entity, PgRepository, SpecificationRepository};
pub use router::router;
pub use service::ODataService;

use axum::http::HeaderName;

/// Header carrying the protocol version of every response.
pub const ODATA_VERSION_HEADER: HeaderName = HeaderName::from_static("odata-version");
pub const ODATA_VERSION: &str = "4.0";

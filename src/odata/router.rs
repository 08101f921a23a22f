//! HTTP entry point of the OData service.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, RawQuery, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::any;

use crate::odata::service::ODataService;

/// Routes serving every resource below the service root.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    Arc<ODataService>: axum::extract::FromRef<S>,
{
    Router::new()
        .route("/", any(service_root))
        .route("/{*path}", any(resource))
}

async fn service_root(
    State(service): State<Arc<ODataService>>,
    method: Method,
    RawQuery(query): RawQuery,
) -> Response {
    dispatch(&service, method, "", query).await
}

async fn resource(
    State(service): State<Arc<ODataService>>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    dispatch(&service, method, &path, query).await
}

async fn dispatch(service: &ODataService, method: Method, path: &str, query: Option<String>) -> Response {
    match service.handle(&method, path, query.as_deref()).await {
        Ok(response) => response.into_response(),
        Err(err) => {
            tracing::debug!(%method, path, error = %err, "odata request rejected");
            err.into_response()
        },
    }
}

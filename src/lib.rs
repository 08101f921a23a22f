//! Shop-floor assistance backend: orders and products over OData v4.

#![forbid(unsafe_code)]
mod crypto;
mod database;
pub mod error;
mod middleware;
pub mod odata;
mod router;
pub mod shopfloor;
pub mod telemetry;
mod token;
pub mod user;

pub mod config;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{FromRef, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

use odata::ODataService;
use user::{PgUserRepository, UserRepository};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    token: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub users: Arc<dyn UserRepository>,
    pub odata: Arc<ODataService>,
    pub crypto: Arc<crypto::PasswordManager>,
    pub token: token::TokenManager,
    pub metrics: Option<PrometheusHandle>,
}

impl FromRef<AppState> for Arc<ODataService> {
    fn from_ref(state: &AppState) -> Arc<ODataService> {
        Arc::clone(&state.odata)
    }
}

/// Prometheus exposition of recorded metrics.
async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(30)))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::PUT, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    // Every OData resource requires an authenticated editor or operator.
    let odata_router = odata::router::<AppState>()
        .route_layer(AxumMiddleware::from_fn(middleware::require_authority))
        .route_layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ));

    let router = Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(metrics))
        // `POST /auth/register` goes to `create`.
        .route("/auth/register", post(router::create::handler))
        // `POST /auth/login` goes to `login`.
        .route("/auth/login", post(router::login::handler));

    let root = format!("/{}", state.config.odata.root.trim_matches('/'));
    let router = if root == "/" {
        router.merge(odata_router)
    } else {
        router.nest(&root, odata_router)
    };

    router
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let mut config = config::Configuration::default();
    if let Ok(path) = std::env::var("CONFIG_PATH") {
        config = config.path(path.into());
    }
    let config = config.read()?;

    let Some(postgres) = &config.postgres else {
        return Err("missing `postgres` entry on `config.yaml` file".into());
    };
    let db = database::Database::from_config(postgres).await?;

    // execute migrations scripts on start.
    db.migrate().await?;

    let crypto = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);

    // handle jwt.
    let Some(token_config) = &config.token else {
        return Err("missing `token` entry on `config.yaml` file".into());
    };
    let mut token = token::TokenManager::new(&config.url, &token_config.secret)?;
    if let Some(audience) = &token_config.audience {
        token.audience(audience);
    }

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "prometheus recorder not installed");
            None
        },
    };

    let odata = shopfloor::service(&config, db.postgres.clone());
    tracing::info!(root = odata.root(), "odata service ready");

    Ok(AppState {
        users: Arc::new(PgUserRepository::new(db.postgres)),
        odata: Arc::new(odata),
        config,
        crypto,
        token,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::RoleName;
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn json(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_status() {
        let state = test_utils::state();
        let response = make_request(None, app(state), Method::GET, "/status.json", String::new()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["name"], env!("CARGO_CRATE_NAME"));
        assert_eq!(body["odata"], "http://localhost:8080/odata");
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let state = test_utils::state();
        let response = make_request(None, app(state), Method::GET, "/metrics", String::new()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_odata_requires_authentication() {
        let state = test_utils::state();

        let response = make_request(None, app(state.clone()), Method::GET, "/odata/Orders", String::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = make_request(
            Some("not.a.token"),
            app(state.clone()),
            Method::GET,
            "/odata/Orders",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Valid token whose user does not exist.
        let token = state.token.create("ghost").unwrap();
        let response = make_request(Some(&token), app(state), Method::GET, "/odata/Orders", String::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_odata_requires_authority() {
        let state = test_utils::state();
        let token = test_utils::user_token(&state, "visitor", &[]).await;

        let response = make_request(Some(&token), app(state), Method::GET, "/odata/Orders", String::new()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_odata_collection() {
        let state = test_utils::state();
        let token = test_utils::user_token(&state, "operator", &[RoleName::Operator]).await;

        let response = make_request(
            Some(&token),
            app(state),
            Method::GET,
            "/odata/Orders?$select=Name&$count=true",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["odata-version"], "4.0");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json;odata.metadata=minimal"
        );

        let body = json(response).await;
        assert_eq!(body["@odata.count"], 3);
        assert_eq!(body["value"][0], serde_json::json!({"Id": 1, "Name": "Gearbox"}));
        assert_eq!(
            body["@odata.nextLink"],
            "http://localhost:8080/odata/Orders?%24select=Name&%24count=true&%24skip=2"
        );
    }

    #[tokio::test]
    async fn test_odata_resources() {
        let state = test_utils::state();
        let token = test_utils::user_token(&state, "editor", &[RoleName::Editor]).await;

        let response =
            make_request(Some(&token), app(state.clone()), Method::GET, "/odata", String::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["value"][1]["name"], "Products");

        let response =
            make_request(Some(&token), app(state.clone()), Method::GET, "/odata/$metadata", String::new())
                .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/xml");

        let response = make_request(
            Some(&token),
            app(state.clone()),
            Method::GET,
            "/odata/Products(2)/Description",
            String::new(),
        )
        .await;
        assert_eq!(json(response).await["value"], "Zinc plated");

        let response = make_request(
            Some(&token),
            app(state.clone()),
            Method::GET,
            "/odata/Orders(1)/Description/$value",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = make_request(
            Some(&token),
            app(state.clone()),
            Method::GET,
            "/odata/Orders/$count",
            String::new(),
        )
        .await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"3");
    }

    #[tokio::test]
    async fn test_odata_errors() {
        let state = test_utils::state();
        let token = test_utils::user_token(&state, "editor", &[RoleName::Editor]).await;

        let response = make_request(
            Some(&token),
            app(state.clone()),
            Method::GET,
            "/odata/Orders?$filter=Name%20eq%201",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        assert_eq!(body["error"]["code"], "400");
        assert_eq!(body["error"]["target"], "$filter");

        let response = make_request(
            Some(&token),
            app(state.clone()),
            Method::DELETE,
            "/odata/Orders(1)",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

        let response = make_request(
            Some(&token),
            app(state),
            Method::GET,
            "/odata/Orders(404)",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_odata_deeply_nested_filter() {
        let state = test_utils::state();
        let token = test_utils::user_token(&state, "operator", &[RoleName::Operator]).await;

        let uri = format!(
            "/odata/Orders?$filter={}Id%20eq%201{}",
            "(".repeat(20_000),
            ")".repeat(20_000)
        );
        let response = make_request(Some(&token), app(state), Method::GET, &uri, String::new()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"]["target"], "$filter");
    }

    #[tokio::test]
    async fn test_odata_top_above_page_size() {
        let state = test_utils::state();
        let token = test_utils::user_token(&state, "operator", &[RoleName::Operator]).await;

        let response = make_request(
            Some(&token),
            app(state),
            Method::GET,
            "/odata/Orders?$top=3",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["value"].as_array().unwrap().len(), 2);
        assert_eq!(
            body["@odata.nextLink"],
            "http://localhost:8080/odata/Orders?%24skip=2&%24top=1"
        );
    }
}

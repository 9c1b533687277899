//! Warden API - authentication and session REST server
//!
//! Provides HTTP endpoints for registration, login, token refresh, logout,
//! profile management, user administration and data records.
//!
//! Author: hephaex@gmail.com

pub mod audit;
pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full application router
///
/// `/api/*` carries the JSON API, `/api/docs` the Swagger UI and, when
/// `server.static_dir` is set, `/static/*` serves files from it.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.config.server.cors_origins);

    let mut router = Router::new()
        .nest("/api", routes::api_routes())
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()));

    if let Some(dir) = &state.config.server.static_dir {
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    router
        .layer(axum::middleware::from_fn(
            middleware::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS from the configured origin list
///
/// An empty list or `*` allows any origin without credentials.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().max_age(Duration::from_secs(3600));

    if allowed.is_empty() || origins.iter().any(|o| o == "*") {
        layer
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        layer
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
            .allow_credentials(true)
    }
}

/// Router over in-memory stores with cheap password hashing
///
/// Returns the state as well so tests can seed users directly.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> (Router, Arc<AppState>) {
    let mut config = warden_core::AppConfig::default();
    config.auth.password = warden_core::PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };

    match AppState::in_memory(config) {
        Ok(state) => {
            let state = Arc::new(state);
            (create_router(state.clone()), state)
        }
        Err(e) => panic!("in-memory state must build: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_route() {
        let (app, _) = create_router_for_testing();
        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn test_openapi_json_served() {
        let (app, _) = create_router_for_testing();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_cors_wildcard_and_list() {
        // Both shapes must build without panicking
        let _ = build_cors_layer(&[]);
        let _ = build_cors_layer(&["*".to_string()]);
        let _ = build_cors_layer(&["https://app.example.com".to_string()]);
    }
}

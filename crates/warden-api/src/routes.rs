//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::handlers::{auth, data, health, users};
use crate::middleware::security_headers_middleware;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Routes mounted under `/api`
///
/// Authentication is enforced per handler by the gate extractors, so public
/// and protected routes share one router.
pub fn api_routes() -> Router<Arc<AppState>> {
    let auth_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/logout-all", post(auth::logout_all_handler))
        .route(
            "/auth/me",
            get(auth::me_handler).put(auth::update_me_handler),
        )
        .route("/auth/change-password", post(auth::change_password_handler))
        .route("/auth/sessions", get(auth::sessions_handler));

    let admin_routes = Router::new()
        .route("/auth/users", get(users::list_users_handler))
        .route(
            "/auth/users/:id",
            get(users::get_user_handler).put(users::update_user_handler),
        )
        .route(
            "/auth/users/:id/revoke-tokens",
            post(users::revoke_user_tokens_handler),
        );

    let data_routes = Router::new()
        .route(
            "/data",
            get(data::list_data_handler).post(data::create_data_handler),
        )
        .route(
            "/data/:id",
            get(data::get_data_handler)
                .put(data::update_data_handler)
                .delete(data::delete_data_handler),
        );

    let health_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::prometheus_metrics));

    Router::new()
        .merge(auth_routes)
        .merge(admin_routes)
        .merge(data_routes)
        .merge(health_routes)
        .layer(middleware::from_fn(security_headers_middleware))
}

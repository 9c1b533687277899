//! OpenAPI document served at `/api/openapi.json`, browsable at `/api/docs`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::auth::models::{
    AdminUpdateUserRequest, ChangePasswordRequest, LoginRequest, LogoutRequest, MessageResponse,
    RefreshRequest, RegisterRequest, RevokedResponse, SessionView, TokenPair,
    UpdateProfileRequest, UserListResponse, UserProfile, UserResponse,
};
use crate::error::ApiError;
use crate::handlers::{auth, data, health, users};

/// Registers the `bearer_auth` scheme referenced by protected paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Warden API",
        description = "JWT authentication, session management and data records"
    ),
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::refresh_handler,
        auth::logout_handler,
        auth::logout_all_handler,
        auth::me_handler,
        auth::update_me_handler,
        auth::change_password_handler,
        auth::sessions_handler,
        users::list_users_handler,
        users::get_user_handler,
        users::update_user_handler,
        users::revoke_user_tokens_handler,
        data::list_data_handler,
        data::get_data_handler,
        data::create_data_handler,
        data::update_data_handler,
        data::delete_data_handler,
        health::health_check,
        health::readiness_check,
        health::prometheus_metrics,
    ),
    components(schemas(
        ApiError,
        RegisterRequest,
        LoginRequest,
        RefreshRequest,
        LogoutRequest,
        ChangePasswordRequest,
        UpdateProfileRequest,
        AdminUpdateUserRequest,
        TokenPair,
        UserResponse,
        UserProfile,
        UserListResponse,
        SessionView,
        MessageResponse,
        RevokedResponse,
        data::DataRecordResponse,
        data::DataListResponse,
        data::DeletedResponse,
        data::CreateDataRequest,
        data::UpdateDataRequest,
        health::HealthResponse,
        health::ReadinessResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login, tokens and profile"),
        (name = "users", description = "User administration (superuser only)"),
        (name = "data", description = "Data records"),
        (name = "health", description = "Liveness, readiness and metrics"),
    )
)]
pub struct ApiDoc;

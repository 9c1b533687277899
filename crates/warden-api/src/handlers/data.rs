//! Data record handlers
//!
//! Reads are public. Writes need the `data:write` permission, deletes need
//! the `admin` or `maintainer` role; superusers pass both.
//!
//! Author: hephaex@gmail.com

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};
use warden_core::records::{
    DataRecord, DataRecordChanges, NewDataRecord, RecordFilter, RecordStatus,
};

use crate::auth::{authorize, ActiveUser, ClientInfo, MaybeUser, Requirement};
use crate::error::AppError;
use crate::extract::{ValidatedJson, ValidatedQuery};
use crate::state::AppState;

/// Permission needed to create or update records
pub const WRITE_PERMISSION: &str = "data:write";

/// Roles allowed to delete records
pub const DELETE_ROLES: [&str; 2] = ["admin", "maintainer"];

/// Data record as returned by the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DataRecordResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub config: Option<serde_json::Value>,
    /// One of `active`, `inactive`, `pending`, `completed`
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DataRecord> for DataRecordResponse {
    fn from(record: DataRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            description: record.description,
            config: record.config,
            status: record.status.to_string(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Paged record listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DataListResponse {
    pub items: Vec<DataRecordResponse>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}

/// Result of a delete
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletedResponse {
    pub message: String,
    pub deleted_id: Uuid,
}

/// Listing filters and paging
#[derive(Debug, Deserialize, Validate, IntoParams)]
pub struct DataListQuery {
    #[serde(default)]
    #[validate(range(min = 0))]
    pub skip: i64,

    #[serde(default = "crate::auth::models::default_limit")]
    #[validate(range(min = 1, max = 1000))]
    pub limit: i64,

    /// Exact status match
    #[validate(custom(function = "validate_status"))]
    pub status: Option<String>,

    /// Case-insensitive substring of the name
    #[validate(length(max = 255))]
    pub name_search: Option<String>,
}

/// New record
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateDataRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[validate(length(max = 1000))]
    pub description: Option<String>,

    /// Must be a JSON object
    #[validate(custom(function = "validate_config"))]
    #[schema(value_type = Option<Object>)]
    pub config: Option<serde_json::Value>,

    /// Defaults to `active`
    #[validate(custom(function = "validate_status"))]
    pub status: Option<String>,
}

/// Partial record update
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateDataRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    #[validate(length(max = 1000))]
    pub description: Option<String>,

    #[validate(custom(function = "validate_config"))]
    #[schema(value_type = Option<Object>)]
    pub config: Option<serde_json::Value>,

    #[validate(custom(function = "validate_status"))]
    pub status: Option<String>,
}

fn validate_status(status: &str) -> Result<(), ValidationError> {
    RecordStatus::from_str(status).map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("record_status");
        err.message = Some("must be one of active, inactive, pending, completed".into());
        err
    })
}

fn validate_config(config: &serde_json::Value) -> Result<(), ValidationError> {
    if config.is_object() {
        Ok(())
    } else {
        let mut err = ValidationError::new("config_object");
        err.message = Some("must be a JSON object".into());
        Err(err)
    }
}

/// Parse an already validated status
fn parse_status(status: Option<&str>) -> Result<Option<RecordStatus>, AppError> {
    status
        .map(RecordStatus::from_str)
        .transpose()
        .map_err(AppError::from)
}

/// List data records
#[utoipa::path(
    get,
    path = "/api/data",
    tag = "data",
    params(DataListQuery),
    responses(
        (status = 200, description = "Page of records, newest first", body = DataListResponse),
        (status = 422, description = "Invalid filter or paging", body = crate::error::ApiError),
    )
)]
pub async fn list_data_handler(
    State(state): State<Arc<AppState>>,
    MaybeUser(viewer): MaybeUser,
    ValidatedQuery(query): ValidatedQuery<DataListQuery>,
) -> Result<Json<DataListResponse>, AppError> {
    let filter = RecordFilter {
        status: parse_status(query.status.as_deref())?,
        name_search: query.name_search.filter(|s| !s.trim().is_empty()),
    };

    let (records, total) = state
        .records
        .list(&filter, query.skip, query.limit)
        .await?;

    tracing::debug!(
        viewer = viewer.as_ref().map(|u| u.username.as_str()).unwrap_or("anonymous"),
        total,
        "Listed data records"
    );

    Ok(Json(DataListResponse {
        items: records.into_iter().map(DataRecordResponse::from).collect(),
        total,
        skip: query.skip,
        limit: query.limit,
    }))
}

/// Get a data record
#[utoipa::path(
    get,
    path = "/api/data/{id}",
    tag = "data",
    params(("id" = Uuid, Path, description = "Record id")),
    responses(
        (status = 200, description = "Record found", body = DataRecordResponse),
        (status = 404, description = "Record not found", body = crate::error::ApiError),
    )
)]
pub async fn get_data_handler(
    State(state): State<Arc<AppState>>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DataRecordResponse>, AppError> {
    let record = state.records.get(id).await?;

    tracing::debug!(
        record_id = %id,
        viewer = viewer.as_ref().map(|u| u.username.as_str()).unwrap_or("anonymous"),
        "Fetched data record"
    );

    Ok(Json(record.into()))
}

/// Create a data record
#[utoipa::path(
    post,
    path = "/api/data",
    tag = "data",
    request_body = CreateDataRequest,
    responses(
        (status = 201, description = "Record created", body = DataRecordResponse),
        (status = 400, description = "Name already taken", body = crate::error::ApiError),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Missing data:write permission", body = crate::error::ApiError),
        (status = 422, description = "Validation error", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_data_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    client: ClientInfo,
    ValidatedJson(request): ValidatedJson<CreateDataRequest>,
) -> Result<impl IntoResponse, AppError> {
    authorize(
        &Requirement::all_permissions([WRITE_PERMISSION]),
        &user,
        &client,
        "POST /api/data",
    )?;

    let record = state
        .records
        .create(NewDataRecord {
            name: request.name,
            description: request.description,
            config: request.config,
            status: parse_status(request.status.as_deref())?.unwrap_or_default(),
        })
        .await?;

    tracing::info!(record_id = %record.id, user_id = %user.id, "Data record created via API");
    Ok((StatusCode::CREATED, Json(DataRecordResponse::from(record))))
}

/// Update a data record
#[utoipa::path(
    put,
    path = "/api/data/{id}",
    tag = "data",
    params(("id" = Uuid, Path, description = "Record id")),
    request_body = UpdateDataRequest,
    responses(
        (status = 200, description = "Record updated", body = DataRecordResponse),
        (status = 400, description = "Name already taken", body = crate::error::ApiError),
        (status = 403, description = "Missing data:write permission", body = crate::error::ApiError),
        (status = 404, description = "Record not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_data_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    client: ClientInfo,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateDataRequest>,
) -> Result<Json<DataRecordResponse>, AppError> {
    authorize(
        &Requirement::all_permissions([WRITE_PERMISSION]),
        &user,
        &client,
        "PUT /api/data/:id",
    )?;

    let changes = DataRecordChanges {
        name: request.name,
        description: request.description,
        config: request.config,
        status: parse_status(request.status.as_deref())?,
    };

    let record = state.records.update(id, changes).await?;
    Ok(Json(record.into()))
}

/// Delete a data record
#[utoipa::path(
    delete,
    path = "/api/data/{id}",
    tag = "data",
    params(("id" = Uuid, Path, description = "Record id")),
    responses(
        (status = 200, description = "Record deleted", body = DeletedResponse),
        (status = 403, description = "Requires admin or maintainer role", body = crate::error::ApiError),
        (status = 404, description = "Record not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_data_handler(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    client: ClientInfo,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, AppError> {
    authorize(
        &Requirement::any_role(DELETE_ROLES),
        &user,
        &client,
        "DELETE /api/data/:id",
    )?;

    state.records.delete(id).await?;

    tracing::info!(record_id = %id, user_id = %user.id, "Data record deleted via API");
    Ok(Json(DeletedResponse {
        message: "Data record deleted".to_string(),
        deleted_id: id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_validation() {
        assert!(validate_status("pending").is_ok());
        assert!(validate_status("ACTIVE").is_ok());
        assert!(validate_status("archived").is_err());
    }

    #[test]
    fn test_config_must_be_object() {
        let ok = CreateDataRequest {
            name: "pipeline".to_string(),
            description: None,
            config: Some(json!({"retries": 3})),
            status: None,
        };
        assert!(ok.validate().is_ok());

        let bad = CreateDataRequest {
            config: Some(json!([1, 2, 3])),
            ..ok
        };
        let errors = bad.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("config"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let req = CreateDataRequest {
            name: String::new(),
            description: None,
            config: None,
            status: Some("inactive".to_string()),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_response_renders_status_lowercase() {
        let now = Utc::now();
        let response = DataRecordResponse::from(DataRecord {
            id: Uuid::new_v4(),
            name: "n".to_string(),
            description: None,
            config: None,
            status: RecordStatus::Completed,
            created_at: now,
            updated_at: now,
        });
        assert_eq!(response.status, "completed");
    }
}

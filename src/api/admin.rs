//! Admin API endpoints
//!
//! All routes sit behind `require_auth` and `require_admin`.
//! - PUT /api/v1/admin/reports/{id}/status
//! - DELETE /api/v1/admin/reports/{id}
//! - DELETE /api/v1/admin/comments/{id}
//! - PUT /api/v1/admin/profiles/{id}/admin

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::extract::{ApiJson, ApiPath};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::ReportResponse;
use crate::models::{Profile, ReportStatus};

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct SetAdminRequest {
    pub admin: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reports/{id}/status", put(update_report_status))
        .route("/reports/{id}", delete(delete_report))
        .route("/comments/{id}", delete(delete_comment))
        .route("/profiles/{id}/admin", put(set_admin))
}

/// PUT /api/v1/admin/reports/{id}/status
async fn update_report_status(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateStatusRequest>,
) -> Result<Json<ReportResponse>, ApiError> {
    let status: ReportStatus = body.status.parse().map_err(ApiError::validation_error)?;
    let report = state.reports.update_status(id, status).await?;
    Ok(Json(report.into()))
}

/// DELETE /api/v1/admin/reports/{id}
async fn delete_report(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.reports.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/admin/comments/{id}
async fn delete_comment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.comments.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/admin/profiles/{id}/admin
///
/// Admins cannot revoke their own flag, so at least one admin remains.
async fn set_admin(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    ApiPath(user_id): ApiPath<i64>,
    ApiJson(body): ApiJson<SetAdminRequest>,
) -> Result<Json<Profile>, ApiError> {
    if user_id == admin.id && !body.admin {
        return Err(ApiError::validation_error("You cannot revoke your own admin access"));
    }
    let profile = state.profiles.set_admin(user_id, body.admin).await?;
    Ok(Json(profile))
}

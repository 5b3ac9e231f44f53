//! Comment API endpoints
//!
//! - GET /api/v1/reports/{id}/comments - oldest first
//! - POST /api/v1/reports/{id}/comments - post (requires session)

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::api::extract::{ApiJson, ApiPath};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::CommentResponse;

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub text: String,
}

/// GET /api/v1/reports/{id}/comments
pub async fn list_comments(
    State(state): State<AppState>,
    ApiPath(report_id): ApiPath<i64>,
) -> Result<Json<Vec<CommentResponse>>, ApiError> {
    let comments = state.comments.list_for_report(report_id).await?;
    Ok(Json(CommentResponse::list(comments)))
}

/// POST /api/v1/reports/{id}/comments
pub async fn create_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(report_id): ApiPath<i64>,
    ApiJson(body): ApiJson<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state.comments.create(report_id, &body.text, &user).await?;
    Ok((StatusCode::CREATED, Json(CommentResponse::from(comment))))
}

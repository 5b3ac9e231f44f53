//! Report API endpoints
//!
//! - GET /api/v1/reports?status=&type= - list, newest first
//! - GET /api/v1/reports/markers - map pins
//! - GET /api/v1/reports/{id} - one report
//! - POST /api/v1/reports - submit (requires session)

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::ReportResponse;
use crate::models::{CreateReportInput, ReportFilter, ReportMarker, ReportStatus};

#[derive(Debug, Default, Deserialize)]
pub struct ListReportsQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub category: Option<String>,
}

impl ListReportsQuery {
    /// Blank values and `all` mean no filter
    pub fn into_filter(self) -> Result<ReportFilter, ApiError> {
        let status = match given(self.status) {
            Some(s) => Some(s.parse::<ReportStatus>().map_err(ApiError::validation_error)?),
            None => None,
        };
        Ok(ReportFilter {
            status,
            category: given(self.category),
        })
    }
}

fn given(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

/// GET /api/v1/reports
pub async fn list_reports(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListReportsQuery>,
) -> Result<Json<Vec<ReportResponse>>, ApiError> {
    let filter = query.into_filter()?;
    let reports = state.reports.list(&filter).await?;
    Ok(Json(ReportResponse::list(reports)))
}

/// GET /api/v1/reports/markers
pub async fn list_markers(State(state): State<AppState>) -> Result<Json<Vec<ReportMarker>>, ApiError> {
    Ok(Json(state.reports.markers().await?))
}

/// GET /api/v1/reports/{id}
pub async fn get_report(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ReportResponse>, ApiError> {
    let report = state.reports.get(id).await?;
    Ok(Json(report.into()))
}

/// POST /api/v1/reports
pub async fn create_report(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<CreateReportInput>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.reports.create(body, &user).await?;
    Ok((StatusCode::CREATED, Json(ReportResponse::from(report))))
}

//! Report service
//!
//! Report submission, listing and moderation. Reads are cache-aside under
//! the `reports:` keys; every write drops the whole prefix, since comment
//! counts and markers are derived from the same rows.

use crate::cache::{keys, Cache, CacheLayer};
use crate::db::repositories::ReportRepository;
use crate::models::{
    CreateReportInput, Report, ReportFilter, ReportMarker, ReportStatus, SessionUser,
};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

const MAX_TITLE_LENGTH: usize = 200;
const MAX_CATEGORY_LENGTH: usize = 100;
const MAX_DESCRIPTION_LENGTH: usize = 5000;
const MAX_LOCATION_LENGTH: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum ReportServiceError {
    #[error("Report not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ReportService {
    repo: Arc<dyn ReportRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl ReportService {
    pub fn new(repo: Arc<dyn ReportRepository>, cache: Arc<Cache>) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            repo,
            cache,
            cache_ttl,
        }
    }

    /// Reports matching `filter`, newest first
    pub async fn list(&self, filter: &ReportFilter) -> Result<Vec<Report>, ReportServiceError> {
        let cache_key = filter.cache_key();
        if let Some(reports) = self.cache.get::<Vec<Report>>(&cache_key).await.ok().flatten() {
            return Ok(reports);
        }

        let reports = self
            .repo
            .list(filter)
            .await
            .context("Failed to list reports")?;

        let _ = self.cache.set(&cache_key, &reports, self.cache_ttl).await;
        Ok(reports)
    }

    pub async fn get(&self, id: i64) -> Result<Report, ReportServiceError> {
        let cache_key = keys::report(id);
        if let Some(report) = self.cache.get::<Report>(&cache_key).await.ok().flatten() {
            return Ok(report);
        }

        let report = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get report")?
            .ok_or(ReportServiceError::NotFound(id))?;

        let _ = self.cache.set(&cache_key, &report, self.cache_ttl).await;
        Ok(report)
    }

    /// Map pins for every report
    pub async fn markers(&self) -> Result<Vec<ReportMarker>, ReportServiceError> {
        if let Some(markers) = self
            .cache
            .get::<Vec<ReportMarker>>(keys::REPORT_MARKERS)
            .await
            .ok()
            .flatten()
        {
            return Ok(markers);
        }

        let markers: Vec<ReportMarker> = self
            .list(&ReportFilter::default())
            .await?
            .iter()
            .map(ReportMarker::from)
            .collect();

        let _ = self
            .cache
            .set(keys::REPORT_MARKERS, &markers, self.cache_ttl)
            .await;
        Ok(markers)
    }

    /// Submit a report on behalf of `author`. New reports always start
    /// as pending.
    pub async fn create(
        &self,
        input: CreateReportInput,
        author: &SessionUser,
    ) -> Result<Report, ReportServiceError> {
        validate_report_input(&input)?;

        let report = Report {
            id: 0,
            category: input.category.trim().to_string(),
            user_id: author.id,
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            status: ReportStatus::Pending,
            priority: input.priority,
            location: input.location.trim().to_string(),
            coordinates: input.coordinates,
            date_submitted: Utc::now(),
            reported_by: author.display_name(),
            image_url: input
                .image_url
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            comment_count: 0,
        };

        let created = self
            .repo
            .create(&report)
            .await
            .context("Failed to create report")?;

        tracing::info!(report_id = created.id, user_id = author.id, "report submitted");
        self.invalidate().await;
        Ok(created)
    }

    pub async fn update_status(
        &self,
        id: i64,
        status: ReportStatus,
    ) -> Result<Report, ReportServiceError> {
        let updated = self
            .repo
            .update_status(id, status)
            .await
            .context("Failed to update report status")?;
        if !updated {
            return Err(ReportServiceError::NotFound(id));
        }

        tracing::info!(report_id = id, status = %status, "report status changed");
        self.invalidate().await;
        self.get(id).await
    }

    /// Delete a report together with its comments
    pub async fn delete(&self, id: i64) -> Result<(), ReportServiceError> {
        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete report")?;
        if !deleted {
            return Err(ReportServiceError::NotFound(id));
        }

        tracing::info!(report_id = id, "report deleted");
        self.invalidate().await;
        let _ = self.cache.delete(&keys::comments(id)).await;
        Ok(())
    }

    async fn invalidate(&self) {
        if let Err(e) = self.cache.delete_prefix(keys::REPORTS_PREFIX).await {
            tracing::warn!("Failed to invalidate report cache: {:#}", e);
        }
    }
}

/// Field checks for a new report
pub fn validate_report_input(input: &CreateReportInput) -> Result<(), ReportServiceError> {
    let required = [
        ("Title", &input.title),
        ("Type", &input.category),
        ("Description", &input.description),
        ("Location", &input.location),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(invalid(format!("{} is required", field)));
        }
    }

    let limits = [
        ("Title", &input.title, MAX_TITLE_LENGTH),
        ("Type", &input.category, MAX_CATEGORY_LENGTH),
        ("Description", &input.description, MAX_DESCRIPTION_LENGTH),
        ("Location", &input.location, MAX_LOCATION_LENGTH),
    ];
    for (field, value, max) in limits {
        if value.trim().chars().count() > max {
            return Err(invalid(format!("{} must be at most {} characters", field, max)));
        }
    }

    if !input.coordinates.is_valid() {
        return Err(invalid(
            "Coordinates must be [lat, lng] with lat in -90..=90 and lng in -180..=180",
        ));
    }

    if let Some(url) = input.image_url.as_deref().map(str::trim) {
        if !url.is_empty() && !is_http_url(url) {
            return Err(invalid("Image URL must start with http:// or https://"));
        }
    }
    Ok(())
}

fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    ["http://", "https://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
}

fn invalid(message: impl Into<String>) -> ReportServiceError {
    ReportServiceError::ValidationError(message.into())
}

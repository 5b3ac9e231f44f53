//! Comment service
//!
//! Comments hang off a report. Writing one changes the report's comment
//! count, so the report keys are dropped along with the comment list.

use crate::cache::{keys, Cache, CacheLayer};
use crate::db::repositories::{CommentRepository, ReportRepository};
use crate::models::{Comment, CreateCommentInput, SessionUser};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

pub const MAX_COMMENT_LENGTH: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Report not found: {0}")]
    ReportNotFound(i64),

    #[error("Comment not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    report_repo: Arc<dyn ReportRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl CommentService {
    pub fn new(
        repo: Arc<dyn CommentRepository>,
        report_repo: Arc<dyn ReportRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            repo,
            report_repo,
            cache,
            cache_ttl,
        }
    }

    /// Comments on a report, oldest first
    pub async fn list_for_report(&self, report_id: i64) -> Result<Vec<Comment>, CommentServiceError> {
        let cache_key = keys::comments(report_id);
        if let Some(comments) = self.cache.get::<Vec<Comment>>(&cache_key).await.ok().flatten() {
            return Ok(comments);
        }

        self.ensure_report(report_id).await?;
        let comments = self
            .repo
            .list_by_report(report_id)
            .await
            .context("Failed to list comments")?;

        let _ = self.cache.set(&cache_key, &comments, self.cache_ttl).await;
        Ok(comments)
    }

    pub async fn create(
        &self,
        report_id: i64,
        text: &str,
        author: &SessionUser,
    ) -> Result<Comment, CommentServiceError> {
        let text = validate_comment_text(text)?;
        self.ensure_report(report_id).await?;

        let comment = self
            .repo
            .create(&CreateCommentInput {
                report_id,
                user_id: author.id,
                user_name: author.display_name(),
                text: text.to_string(),
            })
            .await
            .context("Failed to create comment")?;

        tracing::debug!(comment_id = comment.id, report_id, "comment posted");
        self.invalidate(report_id).await;
        Ok(comment)
    }

    pub async fn delete(&self, id: i64) -> Result<(), CommentServiceError> {
        let comment = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get comment")?
            .ok_or(CommentServiceError::NotFound(id))?;

        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete comment")?;
        if !deleted {
            return Err(CommentServiceError::NotFound(id));
        }

        tracing::info!(comment_id = id, report_id = comment.report_id, "comment deleted");
        self.invalidate(comment.report_id).await;
        Ok(())
    }

    async fn ensure_report(&self, report_id: i64) -> Result<(), CommentServiceError> {
        let exists = self
            .report_repo
            .exists(report_id)
            .await
            .context("Failed to check report")?;
        if !exists {
            return Err(CommentServiceError::ReportNotFound(report_id));
        }
        Ok(())
    }

    async fn invalidate(&self, report_id: i64) {
        let _ = self.cache.delete(&keys::comments(report_id)).await;
        if let Err(e) = self.cache.delete_prefix(keys::REPORTS_PREFIX).await {
            tracing::warn!("Failed to invalidate report cache: {:#}", e);
        }
    }
}

/// Trimmed comment text, or a validation error when it is empty or too long
pub fn validate_comment_text(text: &str) -> Result<&str, CommentServiceError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CommentServiceError::ValidationError(
            "Comment text is required".to_string(),
        ));
    }
    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(CommentServiceError::ValidationError(format!(
            "Comment must be at most {} characters",
            MAX_COMMENT_LENGTH
        )));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::report::test_support::sample_report;
    use crate::db::repositories::{SqlxCommentRepository, SqlxReportRepository};
    use crate::db::{create_test_pool, migrations, sqlite_pool};
    use crate::models::Report;
    use chrono::Utc;
    use proptest::prelude::*;

    fn author(first_name: &str) -> SessionUser {
        SessionUser {
            id: 1,
            email: "ada@example.com".to_string(),
            first_name: first_name.to_string(),
            last_name: String::new(),
            admin: false,
        }
    }

    async fn setup() -> (CommentService, Arc<Cache>, i64) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at, updated_at) \
             VALUES (1, 'ada@example.com', 'hash', ?, ?)",
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(sqlite_pool(&pool).unwrap())
        .await
        .unwrap();

        let reports = SqlxReportRepository::boxed(pool.clone());
        let report = reports.create(&sample_report(1, "Pothole", 5)).await.unwrap();

        let cache = Arc::new(MemoryCache::new(100, Duration::from_secs(60)));
        let service = CommentService::new(
            SqlxCommentRepository::boxed(pool.clone()),
            reports,
            cache.clone(),
        );
        (service, cache, report.id)
    }

    #[tokio::test]
    async fn test_create_and_list_in_order() {
        let (service, _, report_id) = setup().await;

        service.create(report_id, " first ", &author("Ada")).await.unwrap();
        service.create(report_id, "second", &author("")).await.unwrap();

        let comments = service.list_for_report(report_id).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].text, "first");
        assert_eq!(comments[0].user_name, "Ada");
        assert_eq!(comments[1].user_name, "ada@example.com");
    }

    #[tokio::test]
    async fn test_missing_report() {
        let (service, _, _) = setup().await;

        assert!(matches!(
            service.list_for_report(999).await.unwrap_err(),
            CommentServiceError::ReportNotFound(999)
        ));
        assert!(matches!(
            service.create(999, "hello", &author("Ada")).await.unwrap_err(),
            CommentServiceError::ReportNotFound(999)
        ));
    }

    #[tokio::test]
    async fn test_create_invalidates_report_and_comment_keys() {
        let (service, cache, report_id) = setup().await;
        let ttl = cache.default_ttl();
        cache.set(&keys::report(report_id), &"stale", ttl).await.unwrap();
        service.list_for_report(report_id).await.unwrap();

        service.create(report_id, "hello", &author("Ada")).await.unwrap();

        assert!(cache.get::<String>(&keys::report(report_id)).await.unwrap().is_none());
        assert!(cache
            .get::<Vec<Comment>>(&keys::comments(report_id))
            .await
            .unwrap()
            .is_none());
        assert_eq!(service.list_for_report(report_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let (service, cache, report_id) = setup().await;
        let comment = service.create(report_id, "bye", &author("Ada")).await.unwrap();
        cache
            .set(&keys::report(report_id), &Option::<Report>::None, cache.default_ttl())
            .await
            .unwrap();

        service.delete(comment.id).await.unwrap();

        assert!(service.list_for_report(report_id).await.unwrap().is_empty());
        assert!(cache.get::<Option<Report>>(&keys::report(report_id)).await.unwrap().is_none());
        assert!(matches!(
            service.delete(comment.id).await.unwrap_err(),
            CommentServiceError::NotFound(_)
        ));
    }

    #[test]
    fn test_text_limits() {
        assert!(validate_comment_text("   ").is_err());
        assert!(validate_comment_text(&"a".repeat(MAX_COMMENT_LENGTH)).is_ok());
        assert!(validate_comment_text(&"a".repeat(MAX_COMMENT_LENGTH + 1)).is_err());
        assert_eq!(validate_comment_text("  hi  ").unwrap(), "hi");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn prop_valid_text_is_trimmed(body in "[a-zA-Z0-9 .,!?]{1,200}", pad in 0usize..5) {
            prop_assume!(!body.trim().is_empty());
            let padded = format!("{}{}{}", " ".repeat(pad), body, " ".repeat(pad));
            prop_assert_eq!(validate_comment_text(&padded).unwrap(), body.trim());
        }
    }
}

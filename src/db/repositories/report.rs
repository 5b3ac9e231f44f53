//! Report repository
//!
//! Reads always come back annotated with the number of comments on each
//! report, computed with a `LEFT JOIN` so reports without comments count 0.

use crate::config::DatabaseDriver;
use crate::db::{mysql_pool, sqlite_pool, DynDatabasePool};
use crate::models::{Coordinates, Report, ReportFilter, ReportStatus};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Insert `report`, ignoring its `id` and `comment_count`
    async fn create(&self, report: &Report) -> Result<Report>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Report>>;

    /// Newest first
    async fn list(&self, filter: &ReportFilter) -> Result<Vec<Report>>;

    /// Returns false when no report has this id
    async fn update_status(&self, id: i64, status: ReportStatus) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn exists(&self, id: i64) -> Result<bool>;
}

pub struct SqlxReportRepository {
    pool: DynDatabasePool,
}

impl SqlxReportRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReportRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: i64,
    user_id: i64,
    category: String,
    title: String,
    description: String,
    status: String,
    priority: String,
    location: String,
    lat: f64,
    lng: f64,
    reported_by: String,
    image_url: Option<String>,
    date_submitted: DateTime<Utc>,
    comment_count: i64,
}

impl TryFrom<ReportRow> for Report {
    type Error = anyhow::Error;

    fn try_from(row: ReportRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            category: row.category,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            status: row.status.parse().map_err(|e: String| anyhow!(e))?,
            priority: row.priority.parse().map_err(|e: String| anyhow!(e))?,
            location: row.location,
            coordinates: Coordinates::new(row.lat, row.lng),
            date_submitted: row.date_submitted,
            reported_by: row.reported_by,
            image_url: row.image_url,
            comment_count: row.comment_count,
        })
    }
}

const SELECT_REPORTS: &str = r#"
    SELECT r.id, r.user_id, r.category, r.title, r.description, r.status, r.priority,
           r.location, r.lat, r.lng, r.reported_by, r.image_url, r.date_submitted,
           COUNT(c.id) AS comment_count
    FROM reports r
    LEFT JOIN comments c ON c.report_id = r.id
"#;

const INSERT_REPORT: &str = r#"
    INSERT INTO reports (user_id, category, title, description, status, priority,
                         location, lat, lng, reported_by, image_url, date_submitted)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

fn list_sql() -> String {
    format!(
        "{} WHERE (? IS NULL OR r.status = ?) AND (? IS NULL OR r.category = ?) \
         GROUP BY r.id ORDER BY r.date_submitted DESC, r.id DESC",
        SELECT_REPORTS
    )
}

fn by_id_sql() -> String {
    format!("{} WHERE r.id = ? GROUP BY r.id", SELECT_REPORTS)
}

fn into_reports(rows: Vec<ReportRow>) -> Result<Vec<Report>> {
    rows.into_iter().map(Report::try_from).collect()
}

#[async_trait]
impl ReportRepository for SqlxReportRepository {
    async fn create(&self, report: &Report) -> Result<Report> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_REPORT)
                .bind(report.user_id)
                .bind(&report.category)
                .bind(&report.title)
                .bind(&report.description)
                .bind(report.status.as_str())
                .bind(report.priority.as_str())
                .bind(&report.location)
                .bind(report.coordinates.lat)
                .bind(report.coordinates.lng)
                .bind(&report.reported_by)
                .bind(&report.image_url)
                .bind(report.date_submitted)
                .execute(sqlite_pool(&self.pool)?)
                .await
                .map(|r| r.last_insert_rowid()),
            DatabaseDriver::Mysql => sqlx::query(INSERT_REPORT)
                .bind(report.user_id)
                .bind(&report.category)
                .bind(&report.title)
                .bind(&report.description)
                .bind(report.status.as_str())
                .bind(report.priority.as_str())
                .bind(&report.location)
                .bind(report.coordinates.lat)
                .bind(report.coordinates.lng)
                .bind(&report.reported_by)
                .bind(&report.image_url)
                .bind(report.date_submitted)
                .execute(mysql_pool(&self.pool)?)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create report")?;

        Ok(Report {
            id,
            comment_count: 0,
            ..report.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Report>> {
        let sql = by_id_sql();
        let row = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, ReportRow>(&sql)
                    .bind(id)
                    .fetch_optional(sqlite_pool(&self.pool)?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, ReportRow>(&sql)
                    .bind(id)
                    .fetch_optional(mysql_pool(&self.pool)?)
                    .await
            }
        }
        .context("Failed to get report by ID")?;

        row.map(Report::try_from).transpose()
    }

    async fn list(&self, filter: &ReportFilter) -> Result<Vec<Report>> {
        let sql = list_sql();
        let status = filter.status.map(|s| s.as_str().to_string());
        let category = filter.category.clone();

        let rows = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, ReportRow>(&sql)
                    .bind(&status)
                    .bind(&status)
                    .bind(&category)
                    .bind(&category)
                    .fetch_all(sqlite_pool(&self.pool)?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, ReportRow>(&sql)
                    .bind(&status)
                    .bind(&status)
                    .bind(&category)
                    .bind(&category)
                    .fetch_all(mysql_pool(&self.pool)?)
                    .await
            }
        }
        .context("Failed to list reports")?;

        into_reports(rows)
    }

    async fn update_status(&self, id: i64, status: ReportStatus) -> Result<bool> {
        let sql = "UPDATE reports SET status = ? WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(status.as_str())
                .bind(id)
                .execute(sqlite_pool(&self.pool)?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(status.as_str())
                .bind(id)
                .execute(mysql_pool(&self.pool)?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to update report status")?;

        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM reports WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(sqlite_pool(&self.pool)?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(mysql_pool(&self.pool)?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context("Failed to delete report")?;

        Ok(affected > 0)
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) FROM reports WHERE id = ?";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_scalar::<_, i64>(sql)
                    .bind(id)
                    .fetch_one(sqlite_pool(&self.pool)?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_scalar::<_, i64>(sql)
                    .bind(id)
                    .fetch_one(mysql_pool(&self.pool)?)
                    .await
            }
        }
        .context("Failed to check report existence")?;

        Ok(count > 0)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::sample_report;
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::NewUser;

    async fn setup() -> (DynDatabasePool, SqlxReportRepository, i64) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let user = SqlxUserRepository::new(pool.clone())
            .create(&NewUser {
                email: "r@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        (pool.clone(), SqlxReportRepository::new(pool), user.id)
    }

    async fn add_comment(pool: &DynDatabasePool, report_id: i64, user_id: i64) {
        sqlx::query(
            "INSERT INTO comments (report_id, user_id, user_name, text, date) VALUES (?, ?, 'x', 'y', ?)",
        )
        .bind(report_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(pool.as_sqlite().unwrap())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_and_get_report() {
        let (_, repo, user_id) = setup().await;
        let created = repo.create(&sample_report(user_id, "Pothole", 0)).await.unwrap();
        assert!(created.id > 0);

        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.title, "Pothole");
        assert_eq!(found.status, ReportStatus::Pending);
        assert_eq!(found.coordinates, Coordinates::new(47.6114, -122.3331));
        assert_eq!(found.comment_count, 0);
    }

    #[tokio::test]
    async fn test_get_missing_report() {
        let (_, repo, _) = setup().await;
        assert!(repo.get_by_id(404).await.unwrap().is_none());
        assert!(!repo.exists(404).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_comment_counts() {
        let (pool, repo, user_id) = setup().await;
        let old = repo.create(&sample_report(user_id, "Old", 60)).await.unwrap();
        let new = repo.create(&sample_report(user_id, "New", 1)).await.unwrap();
        add_comment(&pool, old.id, user_id).await;
        add_comment(&pool, old.id, user_id).await;

        let reports = repo.list(&ReportFilter::default()).await.unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].id, new.id);
        assert_eq!(reports[0].comment_count, 0);
        assert_eq!(reports[1].id, old.id);
        assert_eq!(reports[1].comment_count, 2);
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_category() {
        let (_, repo, user_id) = setup().await;
        let a = repo.create(&sample_report(user_id, "A", 3)).await.unwrap();
        let mut graffiti = sample_report(user_id, "B", 2);
        graffiti.category = "graffiti".to_string();
        repo.create(&graffiti).await.unwrap();
        repo.update_status(a.id, ReportStatus::Resolved).await.unwrap();

        let resolved = repo
            .list(&ReportFilter {
                status: Some(ReportStatus::Resolved),
                category: None,
            })
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, a.id);

        let graffiti_only = repo
            .list(&ReportFilter {
                status: None,
                category: Some("graffiti".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(graffiti_only.len(), 1);
        assert_eq!(graffiti_only[0].title, "B");
    }

    #[tokio::test]
    async fn test_update_status_missing_report() {
        let (_, repo, _) = setup().await;
        assert!(!repo.update_status(77, ReportStatus::Closed).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_cascades_comments() {
        let (pool, repo, user_id) = setup().await;
        let report = repo.create(&sample_report(user_id, "Gone", 0)).await.unwrap();
        add_comment(&pool, report.id, user_id).await;

        assert!(repo.delete(report.id).await.unwrap());
        assert!(!repo.delete(report.id).await.unwrap());

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}

//! Comment repository

use crate::config::DatabaseDriver;
use crate::db::{mysql_pool, sqlite_pool, DynDatabasePool};
use crate::models::{Comment, CreateCommentInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, input: &CreateCommentInput) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Oldest first, so a thread reads top to bottom
    async fn list_by_report(&self, report_id: i64) -> Result<Vec<Comment>>;

    async fn count_by_report(&self, report_id: i64) -> Result<i64>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    report_id: i64,
    user_id: i64,
    user_name: String,
    text: String,
    date: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            report_id: row.report_id,
            user_id: row.user_id,
            user_name: row.user_name,
            text: row.text,
            date: row.date,
        }
    }
}

const INSERT_COMMENT: &str =
    "INSERT INTO comments (report_id, user_id, user_name, text, date) VALUES (?, ?, ?, ?, ?)";

const SELECT_COMMENT: &str = "SELECT id, report_id, user_id, user_name, text, date FROM comments";

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, input: &CreateCommentInput) -> Result<Comment> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_COMMENT)
                .bind(input.report_id)
                .bind(input.user_id)
                .bind(&input.user_name)
                .bind(&input.text)
                .bind(now)
                .execute(sqlite_pool(&self.pool)?)
                .await
                .map(|r| r.last_insert_rowid()),
            DatabaseDriver::Mysql => sqlx::query(INSERT_COMMENT)
                .bind(input.report_id)
                .bind(input.user_id)
                .bind(&input.user_name)
                .bind(&input.text)
                .bind(now)
                .execute(mysql_pool(&self.pool)?)
                .await
                .map(|r| r.last_insert_id() as i64),
        }
        .context("Failed to create comment")?;

        Ok(Comment {
            id,
            report_id: input.report_id,
            user_id: input.user_id,
            user_name: input.user_name.clone(),
            text: input.text.clone(),
            date: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("{} WHERE id = ?", SELECT_COMMENT);
        let row = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, CommentRow>(&sql)
                    .bind(id)
                    .fetch_optional(sqlite_pool(&self.pool)?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, CommentRow>(&sql)
                    .bind(id)
                    .fetch_optional(mysql_pool(&self.pool)?)
                    .await
            }
        }
        .context("Failed to get comment by ID")?;

        Ok(row.map(Comment::from))
    }

    async fn list_by_report(&self, report_id: i64) -> Result<Vec<Comment>> {
        let sql = format!("{} WHERE report_id = ? ORDER BY date ASC, id ASC", SELECT_COMMENT);
        let rows = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, CommentRow>(&sql)
                    .bind(report_id)
                    .fetch_all(sqlite_pool(&self.pool)?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, CommentRow>(&sql)
                    .bind(report_id)
                    .fetch_all(mysql_pool(&self.pool)?)
                    .await
            }
        }
        .context("Failed to list comments")?;

        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn count_by_report(&self, report_id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) FROM comments WHERE report_id = ?";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_scalar::<_, i64>(sql)
                    .bind(report_id)
                    .fetch_one(sqlite_pool(&self.pool)?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_scalar::<_, i64>(sql)
                    .bind(report_id)
                    .fetch_one(mysql_pool(&self.pool)?)
                    .await
            }
        }
        .context("Failed to count comments")?;

        Ok(count)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM comments WHERE id = ?";
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
        .context("Failed to delete comment")?;

        Ok(affected > 0)
    }
}

//! Session repository
//!
//! Sessions are rows keyed by their opaque token.

use crate::config::DatabaseDriver;
use crate::db::{mysql_pool, sqlite_pool, DynDatabasePool};
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Sign the user out everywhere
    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;

    /// Returns the number of sessions removed
    async fn delete_expired(&self) -> Result<u64>;
}

pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }

    /// Run a single-parameter statement and report affected rows
    async fn execute_with<T>(&self, sql: &str, value: T, what: &'static str) -> Result<u64>
    where
        T: for<'q> sqlx::Encode<'q, sqlx::Sqlite>
            + sqlx::Type<sqlx::Sqlite>
            + for<'q> sqlx::Encode<'q, sqlx::MySql>
            + sqlx::Type<sqlx::MySql>
            + Send
            + 'static,
    {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(value)
                .execute(sqlite_pool(&self.pool)?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(value)
                .execute(mysql_pool(&self.pool)?)
                .await
                .map(|r| r.rows_affected()),
        }
        .context(what)?;
        Ok(affected)
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: i64,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

const INSERT_SESSION: &str =
    "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";

const SELECT_SESSION: &str =
    "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?";

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_SESSION)
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(sqlite_pool(&self.pool)?)
                .await
                .map(|_| ()),
            DatabaseDriver::Mysql => sqlx::query(INSERT_SESSION)
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(mysql_pool(&self.pool)?)
                .await
                .map(|_| ()),
        }
        .context("Failed to create session")?;

        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let row = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, SessionRow>(SELECT_SESSION)
                    .bind(id)
                    .fetch_optional(sqlite_pool(&self.pool)?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, SessionRow>(SELECT_SESSION)
                    .bind(id)
                    .fetch_optional(mysql_pool(&self.pool)?)
                    .await
            }
        }
        .context("Failed to get session by ID")?;

        Ok(row.map(Session::from))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.execute_with(
            "DELETE FROM sessions WHERE id = ?",
            id.to_string(),
            "Failed to delete session",
        )
        .await?;
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        self.execute_with(
            "DELETE FROM sessions WHERE user_id = ?",
            user_id,
            "Failed to delete sessions by user",
        )
        .await
    }

    async fn delete_expired(&self) -> Result<u64> {
        self.execute_with(
            "DELETE FROM sessions WHERE expires_at <= ?",
            Utc::now(),
            "Failed to delete expired sessions",
        )
        .await
    }
}

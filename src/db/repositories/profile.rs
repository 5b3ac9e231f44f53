//! Profile repository

use crate::config::DatabaseDriver;
use crate::db::{mysql_pool, sqlite_pool, DynDatabasePool};
use crate::models::Profile;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn create(&self, profile: &Profile) -> Result<Profile>;

    async fn get(&self, user_id: i64) -> Result<Option<Profile>>;

    /// Returns the updated profile, or `None` when the user has none
    async fn update_names(
        &self,
        user_id: i64,
        first_name: &str,
        last_name: &str,
    ) -> Result<Option<Profile>>;

    async fn set_admin(&self, user_id: i64, admin: bool) -> Result<Option<Profile>>;
}

pub struct SqlxProfileRepository {
    pool: DynDatabasePool,
}

impl SqlxProfileRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ProfileRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: i64,
    first_name: String,
    last_name: String,
    admin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            admin: row.admin,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(super) const INSERT_PROFILE: &str = r#"
    INSERT INTO profiles (id, first_name, last_name, admin, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?)
"#;

const SELECT_PROFILE: &str = r#"
    SELECT id, first_name, last_name, admin, created_at, updated_at
    FROM profiles
    WHERE id = ?
"#;

#[async_trait]
impl ProfileRepository for SqlxProfileRepository {
    async fn create(&self, profile: &Profile) -> Result<Profile> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(INSERT_PROFILE)
                    .bind(profile.id)
                    .bind(&profile.first_name)
                    .bind(&profile.last_name)
                    .bind(profile.admin)
                    .bind(profile.created_at)
                    .bind(profile.updated_at)
                    .execute(sqlite_pool(&self.pool)?)
                    .await
                    .map(|_| ())
            }
            DatabaseDriver::Mysql => {
                sqlx::query(INSERT_PROFILE)
                    .bind(profile.id)
                    .bind(&profile.first_name)
                    .bind(&profile.last_name)
                    .bind(profile.admin)
                    .bind(profile.created_at)
                    .bind(profile.updated_at)
                    .execute(mysql_pool(&self.pool)?)
                    .await
                    .map(|_| ())
            }
        }
        .context("Failed to create profile")?;

        Ok(profile.clone())
    }

    async fn get(&self, user_id: i64) -> Result<Option<Profile>> {
        let row = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, ProfileRow>(SELECT_PROFILE)
                    .bind(user_id)
                    .fetch_optional(sqlite_pool(&self.pool)?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, ProfileRow>(SELECT_PROFILE)
                    .bind(user_id)
                    .fetch_optional(mysql_pool(&self.pool)?)
                    .await
            }
        }
        .context("Failed to get profile")?;

        Ok(row.map(Profile::from))
    }

    async fn update_names(
        &self,
        user_id: i64,
        first_name: &str,
        last_name: &str,
    ) -> Result<Option<Profile>> {
        let sql = "UPDATE profiles SET first_name = ?, last_name = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(first_name)
                    .bind(last_name)
                    .bind(now)
                    .bind(user_id)
                    .execute(sqlite_pool(&self.pool)?)
                    .await
                    .map(|r| r.rows_affected())
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(first_name)
                    .bind(last_name)
                    .bind(now)
                    .bind(user_id)
                    .execute(mysql_pool(&self.pool)?)
                    .await
                    .map(|r| r.rows_affected())
            }
        }
        .context("Failed to update profile")?;

        if affected == 0 {
            return Ok(None);
        }
        self.get(user_id).await
    }

    async fn set_admin(&self, user_id: i64, admin: bool) -> Result<Option<Profile>> {
        let sql = "UPDATE profiles SET admin = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(admin)
                    .bind(now)
                    .bind(user_id)
                    .execute(sqlite_pool(&self.pool)?)
                    .await
                    .map(|r| r.rows_affected())
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(admin)
                    .bind(now)
                    .bind(user_id)
                    .execute(mysql_pool(&self.pool)?)
                    .await
                    .map(|r| r.rows_affected())
            }
        }
        .context("Failed to update admin flag")?;

        if affected == 0 {
            return Ok(None);
        }
        self.get(user_id).await
    }
}

//! User repository
//!
//! Account rows in `users`. Profile data is in [`super::profile`].

use crate::config::DatabaseDriver;
use crate::db::{mysql_pool, sqlite_pool, DynDatabasePool};
use super::profile::INSERT_PROFILE;
use crate::models::{NewUser, Profile, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &NewUser) -> Result<User>;

    /// Insert the user and its profile in one transaction.
    ///
    /// The profile is an admin exactly when the new row is the only user.
    async fn create_with_profile(
        &self,
        user: &NewUser,
        first_name: &str,
        last_name: &str,
    ) -> Result<(User, Profile)>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Exact match; callers normalize the email first
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;
}

pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SELECT_USER: &str =
    "SELECT id, email, password_hash, created_at, updated_at FROM users";

const INSERT_USER: &str =
    "INSERT INTO users (email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?)";

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &NewUser) -> Result<User> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(sqlite_pool(&self.pool)?, user, now).await?,
            DatabaseDriver::Mysql => create_user_mysql(mysql_pool(&self.pool)?, user, now).await?,
        };

        Ok(User {
            id,
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn create_with_profile(
        &self,
        user: &NewUser,
        first_name: &str,
        last_name: &str,
    ) -> Result<(User, Profile)> {
        let now = Utc::now();
        let draft = Profile::new(0, first_name, last_name, false);
        let (id, admin) = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                register_sqlite(sqlite_pool(&self.pool)?, user, &draft, now).await?
            }
            DatabaseDriver::Mysql => {
                register_mysql(mysql_pool(&self.pool)?, user, &draft, now).await?
            }
        };

        let user = User {
            id,
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            created_at: now,
            updated_at: now,
        };
        let profile = Profile {
            id,
            admin,
            created_at: now,
            updated_at: now,
            ..draft
        };
        Ok((user, profile))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("{} WHERE id = ?", SELECT_USER);
        let row: Option<UserRow> = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(id)
                    .fetch_optional(sqlite_pool(&self.pool)?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(id)
                    .fetch_optional(mysql_pool(&self.pool)?)
                    .await
            }
        }
        .context("Failed to get user by ID")?;

        Ok(row.map(User::from))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("{} WHERE email = ?", SELECT_USER);
        let row: Option<UserRow> = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(email)
                    .fetch_optional(sqlite_pool(&self.pool)?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(email)
                    .fetch_optional(mysql_pool(&self.pool)?)
                    .await
            }
        }
        .context("Failed to get user by email")?;

        Ok(row.map(User::from))
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let sql = "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(password_hash)
                    .bind(now)
                    .bind(id)
                    .execute(sqlite_pool(&self.pool)?)
                    .await
                    .map(|_| ())
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(password_hash)
                    .bind(now)
                    .bind(id)
                    .execute(mysql_pool(&self.pool)?)
                    .await
                    .map(|_| ())
            }
        }
        .context("Failed to update password")
    }
}

async fn create_user_sqlite(pool: &SqlitePool, user: &NewUser, now: DateTime<Utc>) -> Result<i64> {
    let result = sqlx::query(INSERT_USER)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;
    Ok(result.last_insert_rowid())
}

async fn create_user_mysql(pool: &MySqlPool, user: &NewUser, now: DateTime<Utc>) -> Result<i64> {
    let result = sqlx::query(INSERT_USER)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;
    Ok(result.last_insert_id() as i64)
}

const COUNT_USERS: &str = "SELECT COUNT(*) FROM users";

async fn register_sqlite(
    pool: &SqlitePool,
    user: &NewUser,
    profile: &Profile,
    now: DateTime<Utc>,
) -> Result<(i64, bool)> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(INSERT_USER)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create user")?
        .last_insert_rowid();

    let users: i64 = sqlx::query_scalar::<_, i64>(COUNT_USERS)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to count users")?;
    let admin = users == 1;

    sqlx::query(INSERT_PROFILE)
        .bind(id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(admin)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create profile")?;

    tx.commit().await.context("Failed to commit registration")?;
    Ok((id, admin))
}

async fn register_mysql(
    pool: &MySqlPool,
    user: &NewUser,
    profile: &Profile,
    now: DateTime<Utc>,
) -> Result<(i64, bool)> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(INSERT_USER)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create user")?
        .last_insert_id() as i64;

    let users: i64 = sqlx::query_scalar::<_, i64>(COUNT_USERS)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to count users")?;
    let admin = users == 1;

    sqlx::query(INSERT_PROFILE)
        .bind(id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(admin)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create profile")?;

    tx.commit().await.context("Failed to commit registration")?;
    Ok((id, admin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let repo = setup_test_repo().await;
        let created = repo.create(&new_user("ada@example.com")).await.unwrap();
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "ada@example.com");

        let by_email = repo.get_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
    }

    #[tokio::test]
    async fn test_missing_user_is_none() {
        let repo = setup_test_repo().await;
        assert!(repo.get_by_id(42).await.unwrap().is_none());
        assert!(repo.get_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let repo = setup_test_repo().await;
        repo.create(&new_user("dup@example.com")).await.unwrap();
        assert!(repo.create(&new_user("dup@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_create_with_profile_makes_only_first_user_admin() {
        let repo = setup_test_repo().await;

        let (first, first_profile) = repo
            .create_with_profile(&new_user("a@example.com"), " Ada ", "Lovelace")
            .await
            .unwrap();
        let (second, second_profile) = repo
            .create_with_profile(&new_user("b@example.com"), "", "")
            .await
            .unwrap();

        assert_eq!(first_profile.id, first.id);
        assert_eq!(first_profile.first_name, "Ada");
        assert!(first_profile.admin);
        assert_eq!(second_profile.id, second.id);
        assert!(!second_profile.admin);
    }

    #[tokio::test]
    async fn test_create_with_profile_duplicate_is_unique_violation() {
        let repo = setup_test_repo().await;
        repo.create_with_profile(&new_user("dup@example.com"), "", "")
            .await
            .unwrap();

        let err = repo
            .create_with_profile(&new_user("dup@example.com"), "", "")
            .await
            .unwrap_err();
        assert!(crate::db::repositories::is_unique_violation(&err));

        let (third, third_profile) = repo
            .create_with_profile(&new_user("c@example.com"), "", "")
            .await
            .unwrap();
        assert!(third.id > 0);
        assert!(!third_profile.admin);
    }

    #[tokio::test]
    async fn test_update_password() {
        let repo = setup_test_repo().await;
        let user = repo.create(&new_user("pw@example.com")).await.unwrap();

        repo.update_password(user.id, "new-hash").await.unwrap();

        let found = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found.password_hash, "new-hash");
    }
}

//! Profile service
//!
//! Display names and the admin flag. Users without a profile row (accounts
//! created before profiles existed) get one on their first name change.

use crate::db::repositories::ProfileRepository;
use crate::models::{check_name_length, Profile, UpdateProfileInput};
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ProfileServiceError {
    #[error("Profile not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ProfileService {
    repo: Arc<dyn ProfileRepository>,
}

impl ProfileService {
    pub fn new(repo: Arc<dyn ProfileRepository>) -> Self {
        Self { repo }
    }

    pub async fn get(&self, user_id: i64) -> Result<Profile, ProfileServiceError> {
        self.repo
            .get(user_id)
            .await
            .context("Failed to get profile")?
            .ok_or(ProfileServiceError::NotFound(user_id))
    }

    /// Apply the given name changes; omitted fields keep their value
    pub async fn update_names(
        &self,
        user_id: i64,
        input: UpdateProfileInput,
    ) -> Result<Profile, ProfileServiceError> {
        let first = input.first_name.as_deref().map(str::trim);
        let last = input.last_name.as_deref().map(str::trim);
        for name in [first, last].into_iter().flatten() {
            check_name_length(name).map_err(ProfileServiceError::ValidationError)?;
        }

        let current = self.repo.get(user_id).await.context("Failed to get profile")?;
        let Some(current) = current else {
            let profile = Profile::new(user_id, first.unwrap_or(""), last.unwrap_or(""), false);
            return Ok(self
                .repo
                .create(&profile)
                .await
                .context("Failed to create profile")?);
        };

        let first = first.unwrap_or(&current.first_name);
        let last = last.unwrap_or(&current.last_name);
        self.repo
            .update_names(user_id, first, last)
            .await
            .context("Failed to update profile")?
            .ok_or(ProfileServiceError::NotFound(user_id))
    }

    pub async fn set_admin(&self, user_id: i64, admin: bool) -> Result<Profile, ProfileServiceError> {
        let profile = self
            .repo
            .set_admin(user_id, admin)
            .await
            .context("Failed to update admin flag")?
            .ok_or(ProfileServiceError::NotFound(user_id))?;
        tracing::info!(user_id, admin, "admin flag changed");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxProfileRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::NewUser;

    async fn setup(with_profile: bool) -> (ProfileService, i64) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let user = SqlxUserRepository::new(pool.clone())
            .create(&NewUser {
                email: "ada@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        let repo = SqlxProfileRepository::boxed(pool);
        if with_profile {
            repo.create(&Profile::new(user.id, "Ada", "Lovelace", false))
                .await
                .unwrap();
        }
        (ProfileService::new(repo), user.id)
    }

    #[tokio::test]
    async fn test_get_missing_profile() {
        let (service, user_id) = setup(false).await;
        let err = service.get(user_id).await.unwrap_err();
        assert!(matches!(err, ProfileServiceError::NotFound(id) if id == user_id));
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_name() {
        let (service, user_id) = setup(true).await;

        let updated = service
            .update_names(
                user_id,
                UpdateProfileInput {
                    first_name: Some("  Augusta ".to_string()),
                    last_name: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.first_name, "Augusta");
        assert_eq!(updated.last_name, "Lovelace");
    }

    #[tokio::test]
    async fn test_update_creates_missing_profile() {
        let (service, user_id) = setup(false).await;

        let created = service
            .update_names(
                user_id,
                UpdateProfileInput {
                    first_name: Some("Ada".to_string()),
                    last_name: Some("L".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(created.id, user_id);
        assert!(!created.admin);
        assert_eq!(service.get(user_id).await.unwrap().first_name, "Ada");
    }

    #[tokio::test]
    async fn test_overlong_name_rejected() {
        let (service, user_id) = setup(true).await;
        let err = service
            .update_names(
                user_id,
                UpdateProfileInput {
                    first_name: Some("x".repeat(101)),
                    last_name: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_set_admin() {
        let (service, user_id) = setup(true).await;
        assert!(service.set_admin(user_id, true).await.unwrap().admin);
        assert!(!service.set_admin(user_id, false).await.unwrap().admin);
        assert!(matches!(
            service.set_admin(9999, true).await.unwrap_err(),
            ProfileServiceError::NotFound(9999)
        ));
    }
}

//! Authentication service
//!
//! Registration, login and opaque session tokens. A session resolves to a
//! [`SessionUser`], the user plus their profile, which is what the rest of
//! the application sees as "the signed-in user".

use crate::config::AuthConfig;
use crate::db::repositories::{
    is_unique_violation, ProfileRepository, SessionRepository, UserRepository,
};
use crate::models::{check_name_length, NewUser, Session, SessionUser, User};
use crate::services::password::{hash_password, verify_against_dummy, verify_password};
use anyhow::Context;
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("User not found")]
    UserNotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl RegisterInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

pub struct AuthService {
    user_repo: Arc<dyn UserRepository>,
    profile_repo: Arc<dyn ProfileRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_lifetime: Duration,
    min_password_length: usize,
    /// Serializes account inserts so the first-admin count is never shared
    register_lock: Mutex<()>,
}

impl AuthService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        profile_repo: Arc<dyn ProfileRepository>,
        session_repo: Arc<dyn SessionRepository>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            profile_repo,
            session_repo,
            session_lifetime: config.session_lifetime(),
            min_password_length: config.min_password_length,
            register_lock: Mutex::new(()),
        }
    }

    /// Create an account and sign it in.
    ///
    /// The first account ever registered is made an admin. The user and
    /// profile rows are written together, so a failed profile insert leaves
    /// no account behind.
    pub async fn register(
        &self,
        input: RegisterInput,
    ) -> Result<(SessionUser, Session), AuthServiceError> {
        let email = normalize_email(&input.email);
        validate_email(&email)?;
        self.validate_password(&input.password)?;
        for name in [&input.first_name, &input.last_name] {
            check_name_length(name).map_err(AuthServiceError::ValidationError)?;
        }

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to look up email")?
            .is_some()
        {
            return Err(AuthServiceError::EmailTaken);
        }

        let password_hash = hash_blocking(input.password).await?;

        let created = {
            let _guard = self.register_lock.lock().await;
            self.user_repo
                .create_with_profile(
                    &NewUser {
                        email,
                        password_hash,
                    },
                    &input.first_name,
                    &input.last_name,
                )
                .await
        };
        let (user, profile) = match created {
            Ok(created) => created,
            // Lost a race with another registration for the same email
            Err(e) if is_unique_violation(&e) => return Err(AuthServiceError::EmailTaken),
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        tracing::info!(user_id = user.id, admin = profile.admin, "registered new user");

        let session = self.create_session(user.id).await?;
        Ok((SessionUser::from_parts(&user, Some(&profile)), session))
    }

    /// Exchange email and password for a new session
    pub async fn login(&self, input: LoginInput) -> Result<(SessionUser, Session), AuthServiceError> {
        let email = normalize_email(&input.email);

        let user = match self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to look up user")?
        {
            Some(user) => user,
            None => {
                let password = input.password;
                let _ = tokio::task::spawn_blocking(move || verify_against_dummy(&password)).await;
                return Err(AuthServiceError::InvalidCredentials);
            }
        };

        if !verify_blocking(input.password, user.password_hash.clone()).await? {
            return Err(AuthServiceError::InvalidCredentials);
        }

        let session = self.create_session(user.id).await?;
        let session_user = self.session_user(&user).await?;
        Ok((session_user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a token to its user. Unknown and expired tokens yield `None`;
    /// expired sessions are deleted on the way.
    pub async fn validate_session(&self, token: &str) -> Result<Option<SessionUser>, AuthServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(session) => session,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        match self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get session user")?
        {
            Some(user) => Ok(Some(self.session_user(&user).await?)),
            None => Ok(None),
        }
    }

    pub async fn current_user(&self, user_id: i64) -> Result<SessionUser, AuthServiceError> {
        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(AuthServiceError::UserNotFound)?;
        self.session_user(&user).await
    }

    /// Replace the password and end every other session of the user
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
        keep_session: &str,
    ) -> Result<(), AuthServiceError> {
        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(AuthServiceError::UserNotFound)?;

        if !verify_blocking(current_password.to_string(), user.password_hash.clone()).await? {
            return Err(AuthServiceError::InvalidCredentials);
        }
        self.validate_password(new_password)?;

        let hash = hash_blocking(new_password.to_string()).await?;
        self.user_repo
            .update_password(user_id, &hash)
            .await
            .context("Failed to update password")?;

        // Re-issue the caller's session after clearing all of them
        let kept = self
            .session_repo
            .get_by_id(keep_session)
            .await
            .context("Failed to get session")?;
        self.session_repo
            .delete_by_user(user_id)
            .await
            .context("Failed to revoke sessions")?;
        if let Some(session) = kept {
            self.session_repo
                .create(&session)
                .await
                .context("Failed to restore session")?;
        }
        Ok(())
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64, AuthServiceError> {
        let removed = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(removed)
    }

    async fn session_user(&self, user: &User) -> Result<SessionUser, AuthServiceError> {
        let profile = self
            .profile_repo
            .get(user.id)
            .await
            .context("Failed to get profile")?;
        Ok(SessionUser::from_parts(user, profile.as_ref()))
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, AuthServiceError> {
        let session = self
            .session_repo
            .create(&Session::issue(user_id, self.session_lifetime))
            .await
            .context("Failed to create session")?;
        Ok(session)
    }

    fn validate_password(&self, password: &str) -> Result<(), AuthServiceError> {
        if password.chars().count() < self.min_password_length {
            return Err(AuthServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                self.min_password_length
            )));
        }
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal shape check: one `@`, non-empty local part, dotted domain
pub fn validate_email(email: &str) -> Result<(), AuthServiceError> {
    let invalid = || AuthServiceError::ValidationError("Invalid email format".to_string());

    if email.is_empty() || email.len() > 255 || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }
    Ok(())
}

// Runs on the blocking pool
async fn hash_blocking(password: String) -> Result<String, AuthServiceError> {
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("Password hashing task failed")??;
    Ok(hash)
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, AuthServiceError> {
    let ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("Password verification task failed")??;
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxProfileRepository, SqlxSessionRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use chrono::Utc;
    use proptest::prelude::*;

    async fn setup() -> (AuthService, Arc<dyn SessionRepository>) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let service = AuthService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxProfileRepository::boxed(pool.clone()),
            sessions.clone(),
            &AuthConfig::default(),
        );
        (service, sessions)
    }

    #[tokio::test]
    async fn test_first_user_is_admin_second_is_not() {
        let (service, _) = setup().await;

        let (first, _) = service
            .register(RegisterInput::new("first@example.com", "password123").with_name("Ada", "L"))
            .await
            .unwrap();
        let (second, _) = service
            .register(RegisterInput::new("second@example.com", "password123"))
            .await
            .unwrap();

        assert!(first.admin);
        assert_eq!(first.first_name, "Ada");
        assert!(!second.admin);
    }

    #[tokio::test]
    async fn test_register_normalizes_email_and_rejects_duplicates() {
        let (service, _) = setup().await;
        let (user, _) = service
            .register(RegisterInput::new("  Mixed@Example.COM ", "password123"))
            .await
            .unwrap();
        assert_eq!(user.email, "mixed@example.com");

        let err = service
            .register(RegisterInput::new("mixed@example.com", "password456"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthServiceError::EmailTaken));
    }

    #[tokio::test]
    async fn test_concurrent_registrations_yield_one_admin() {
        let (service, _) = setup().await;
        let service = Arc::new(service);

        let registrations: Vec<_> = ["a@example.com", "b@example.com", "c@example.com"]
            .into_iter()
            .map(|email| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .register(RegisterInput::new(email, "password123"))
                        .await
                })
            })
            .collect();

        let mut admins = 0;
        for registration in registrations {
            let (user, _) = registration.await.unwrap().unwrap();
            admins += usize::from(user.admin);
        }
        assert_eq!(admins, 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_email_is_email_taken() {
        let (service, _) = setup().await;
        let service = Arc::new(service);

        let registrations: Vec<_> = (0..2)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .register(RegisterInput::new("dup@example.com", "password123"))
                        .await
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for registration in registrations {
            outcomes.push(registration.await.unwrap());
        }
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(AuthServiceError::EmailTaken))));
    }

    #[tokio::test]
    async fn test_register_rejects_overlong_names() {
        let (service, _) = setup().await;

        let err = service
            .register(
                RegisterInput::new("long@example.com", "password123").with_name("x".repeat(500), "y"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthServiceError::ValidationError(_)));

        let name = "n".repeat(crate::models::MAX_NAME_LENGTH);
        let (user, _) = service
            .register(RegisterInput::new("ok@example.com", "password123").with_name(name.clone(), ""))
            .await
            .unwrap();
        assert_eq!(user.first_name, name);
        assert!(user.admin, "rejected registration must not leave a user row");
    }

    #[tokio::test]
    async fn test_oversized_session_days_do_not_panic() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let config = AuthConfig {
            session_expiration_days: 1_000_000_000_000,
            ..AuthConfig::default()
        };
        let service = AuthService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxProfileRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            &config,
        );

        let (_, session) = service
            .register(RegisterInput::new("ada@example.com", "password123"))
            .await
            .unwrap();
        assert!(!session.is_expired());
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (service, _) = setup().await;

        let err = service
            .register(RegisterInput::new("not-an-email", "password123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthServiceError::ValidationError(_)));

        let err = service
            .register(RegisterInput::new("ok@example.com", "short"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_login_and_validate_session() {
        let (service, _) = setup().await;
        service
            .register(RegisterInput::new("ada@example.com", "password123"))
            .await
            .unwrap();

        let (user, session) = service
            .login(LoginInput::new("ADA@example.com", "password123"))
            .await
            .unwrap();

        let resolved = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(resolved, user);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (service, _) = setup().await;
        service
            .register(RegisterInput::new("ada@example.com", "password123"))
            .await
            .unwrap();

        let wrong_password = service
            .login(LoginInput::new("ada@example.com", "wrong-password"))
            .await
            .unwrap_err();
        let unknown_email = service
            .login(LoginInput::new("nobody@example.com", "password123"))
            .await
            .unwrap_err();

        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
        assert!(matches!(unknown_email, AuthServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let (service, _) = setup().await;
        let (_, session) = service
            .register(RegisterInput::new("ada@example.com", "password123"))
            .await
            .unwrap();

        service.logout(&session.id).await.unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected_and_removed() {
        let (service, sessions) = setup().await;
        let (user, _) = service
            .register(RegisterInput::new("ada@example.com", "password123"))
            .await
            .unwrap();

        let mut stale = Session::issue(user.id, Duration::days(1));
        stale.expires_at = Utc::now() - Duration::minutes(1);
        sessions.create(&stale).await.unwrap();

        assert!(service.validate_session(&stale.id).await.unwrap().is_none());
        assert!(sessions.get_by_id(&stale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_password_keeps_only_current_session() {
        let (service, _) = setup().await;
        let (user, current) = service
            .register(RegisterInput::new("ada@example.com", "password123"))
            .await
            .unwrap();
        let (_, other) = service
            .login(LoginInput::new("ada@example.com", "password123"))
            .await
            .unwrap();

        service
            .change_password(user.id, "password123", "new-password-1", &current.id)
            .await
            .unwrap();

        assert!(service.validate_session(&current.id).await.unwrap().is_some());
        assert!(service.validate_session(&other.id).await.unwrap().is_none());
        assert!(service
            .login(LoginInput::new("ada@example.com", "new-password-1"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_change_password_requires_current_password() {
        let (service, _) = setup().await;
        let (user, session) = service
            .register(RegisterInput::new("ada@example.com", "password123"))
            .await
            .unwrap();

        let err = service
            .change_password(user.id, "not-it", "new-password-1", &session.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let (service, sessions) = setup().await;
        let (user, _) = service
            .register(RegisterInput::new("ada@example.com", "password123"))
            .await
            .unwrap();
        let mut stale = Session::issue(user.id, Duration::days(1));
        stale.expires_at = Utc::now() - Duration::days(2);
        sessions.create(&stale).await.unwrap();

        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 1);
    }

    #[test]
    fn test_validate_email_examples() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("first.last+tag@sub.example.org").is_ok());
        for bad in ["", "plain", "@example.com", "a@b", "a@@b.com", "a b@c.com", "a@.com", "a@b."] {
            assert!(validate_email(bad).is_err(), "{} should be rejected", bad);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn prop_well_formed_emails_validate(
            local in "[a-z0-9._]{1,20}",
            domain in "[a-z0-9]{1,15}",
            tld in "[a-z]{2,6}",
        ) {
            let email = format!("{}@{}.{}", local, domain, tld);
            prop_assert!(validate_email(&email).is_ok());
        }

        #[test]
        fn prop_emails_without_at_are_rejected(s in "[a-z0-9.]{0,30}") {
            prop_assert!(validate_email(&s).is_err());
        }
    }
}

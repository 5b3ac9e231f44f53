//! User, profile and session-user models
//!
//! Credentials live in `users`; the public-facing name and the admin flag
//! live in `profiles`, keyed by the same id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to insert a user row
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
}

/// Width of the `first_name` and `last_name` columns
pub const MAX_NAME_LENGTH: usize = 100;

/// Rejects a name whose trimmed length exceeds [`MAX_NAME_LENGTH`] characters
pub fn check_name_length(name: &str) -> Result<(), String> {
    if name.trim().chars().count() > MAX_NAME_LENGTH {
        return Err(format!("Names must be at most {} characters", MAX_NAME_LENGTH));
    }
    Ok(())
}

/// Per-user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(user_id: i64, first_name: &str, last_name: &str, admin: bool) -> Self {
        let now = Utc::now();
        Self {
            id: user_id,
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            admin,
            created_at: now,
            updated_at: now,
        }
    }

    /// "First Last", or `None` when both names are blank
    pub fn full_name(&self) -> Option<String> {
        full_name(&self.first_name, &self.last_name)
    }
}

fn full_name(first: &str, last: &str) -> Option<String> {
    let name = format!("{} {}", first.trim(), last.trim());
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Profile name changes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// The authenticated user context attached to a request.
///
/// `admin` is false when the user has no profile row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub admin: bool,
}

impl SessionUser {
    pub fn from_parts(user: &User, profile: Option<&Profile>) -> Self {
        match profile {
            Some(p) => Self {
                id: user.id,
                email: user.email.clone(),
                first_name: p.first_name.clone(),
                last_name: p.last_name.clone(),
                admin: p.admin,
            },
            None => Self {
                id: user.id,
                email: user.email.clone(),
                first_name: String::new(),
                last_name: String::new(),
                admin: false,
            },
        }
    }

    /// Name shown on reports and comments, falling back to the email
    pub fn display_name(&self) -> String {
        full_name(&self.first_name, &self.last_name).unwrap_or_else(|| self.email.clone())
    }
}

//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A login session. `id` is the opaque bearer token handed to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// New session with a random v4 UUID token
    pub fn issue(user_id: i64, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + lifetime,
            created_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Remaining lifetime in whole seconds, zero once expired
    pub fn max_age_seconds(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_sets_expiry() {
        let session = Session::issue(7, Duration::days(7));
        assert_eq!(session.user_id, 7);
        assert!(!session.is_expired());
        assert!(session.max_age_seconds() > 6 * 24 * 3600);
        assert_eq!(uuid::Uuid::parse_str(&session.id).unwrap().get_version_num(), 4);
    }

    #[test]
    fn test_expired_session() {
        let mut session = Session::issue(1, Duration::days(1));
        session.expires_at = Utc::now() - Duration::seconds(1);
        assert!(session.is_expired());
        assert_eq!(session.max_age_seconds(), 0);
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = Session::issue(1, Duration::hours(1));
        let b = Session::issue(1, Duration::hours(1));
        assert_ne!(a.id, b.id);
    }
}

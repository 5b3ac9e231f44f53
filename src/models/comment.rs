//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reply attached to a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub report_id: i64,
    pub user_id: i64,
    /// Author display name at the time of posting
    pub user_name: String,
    pub text: String,
    pub date: DateTime<Utc>,
}

/// Fields needed to insert a comment row
#[derive(Debug, Clone)]
pub struct CreateCommentInput {
    pub report_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub text: String,
}

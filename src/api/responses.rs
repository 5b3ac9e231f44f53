//! Shared API response types
//!
//! Entities are returned as-is plus a few display fields computed at
//! response time, so cached entities never carry stale relative ages.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Comment, Report, SessionUser};
use crate::services::format::{format_date, time_ago};

/// Report plus its display fields
#[derive(Debug, Serialize)]
pub struct ReportResponse {
    #[serde(flatten)]
    pub report: Report,
    pub status_label: &'static str,
    pub submitted_ago: String,
    pub date_display: String,
}

impl ReportResponse {
    pub fn new(report: Report, now: DateTime<Utc>) -> Self {
        Self {
            status_label: report.status.label(),
            submitted_ago: time_ago(report.date_submitted, now),
            date_display: format_date(report.date_submitted),
            report,
        }
    }

    pub fn list(reports: Vec<Report>) -> Vec<Self> {
        let now = Utc::now();
        reports.into_iter().map(|r| Self::new(r, now)).collect()
    }
}

impl From<Report> for ReportResponse {
    fn from(report: Report) -> Self {
        Self::new(report, Utc::now())
    }
}

/// Comment plus its relative age
#[derive(Debug, Serialize)]
pub struct CommentResponse {
    #[serde(flatten)]
    pub comment: Comment,
    pub posted_ago: String,
}

impl CommentResponse {
    pub fn new(comment: Comment, now: DateTime<Utc>) -> Self {
        Self {
            posted_ago: time_ago(comment.date, now),
            comment,
        }
    }

    pub fn list(comments: Vec<Comment>) -> Vec<Self> {
        let now = Utc::now();
        comments.into_iter().map(|c| Self::new(c, now)).collect()
    }
}

impl From<Comment> for CommentResponse {
    fn from(comment: Comment) -> Self {
        Self::new(comment, Utc::now())
    }
}

/// Body of a successful register or login
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: SessionUser,
    pub access_token: String,
    pub token_type: &'static str,
}

impl AuthResponse {
    pub fn bearer(user: SessionUser, token: String) -> Self {
        Self {
            user,
            access_token: token,
            token_type: "bearer",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::report::test_support::sample_report;
    use chrono::TimeZone;

    #[test]
    fn test_report_response_flattens_display_fields() {
        let mut report = sample_report(1, "Pothole", 0);
        report.id = 9;
        report.date_submitted = Utc.with_ymd_and_hms(2024, 1, 5, 15, 7, 0).unwrap();
        let now = report.date_submitted + chrono::Duration::hours(3);

        let json = serde_json::to_value(ReportResponse::new(report, now)).unwrap();

        assert_eq!(json["id"], 9);
        assert_eq!(json["type"], "pothole");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["status_label"], "Pending");
        assert_eq!(json["submitted_ago"], "3 hours ago");
        assert_eq!(json["date_display"], "Jan 5, 2024, 03:07 PM");
        assert_eq!(json["coordinates"], serde_json::json!([47.6114, -122.3331]));
    }

    #[test]
    fn test_comment_response_has_posted_ago() {
        let date = Utc.with_ymd_and_hms(2024, 1, 5, 15, 7, 0).unwrap();
        let comment = Comment {
            id: 1,
            report_id: 2,
            user_id: 3,
            user_name: "Ada".to_string(),
            text: "Seen it too".to_string(),
            date,
        };

        let json = serde_json::to_value(CommentResponse::new(comment, date)).unwrap();

        assert_eq!(json["user_name"], "Ada");
        assert_eq!(json["posted_ago"], "just now");
    }

    #[test]
    fn test_auth_response_shape() {
        let user = SessionUser {
            id: 1,
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: String::new(),
            admin: true,
        };
        let json = serde_json::to_value(AuthResponse::bearer(user, "tok".to_string())).unwrap();
        assert_eq!(json["access_token"], "tok");
        assert_eq!(json["token_type"], "bearer");
        assert_eq!(json["user"]["admin"], true);
    }
}

//! Report model
//!
//! A report is a civic issue submitted by a signed-in user: what kind of
//! problem it is, where it is, and how urgent. Its `status` moves through
//! `pending → in-progress → resolved/closed` as staff handle it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Handling state of a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    #[default]
    Pending,
    InProgress,
    Resolved,
    Closed,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 4] = [
        ReportStatus::Pending,
        ReportStatus::InProgress,
        ReportStatus::Resolved,
        ReportStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    /// Accepts the stored form plus `_`/space separated and any casing
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "in-progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Invalid report status: {}", s)),
        }
    }
}

/// Urgency of a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Latitude/longitude pair, serialized as `[lat, lng]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl From<[f64; 2]> for Coordinates {
    fn from([lat, lng]: [f64; 2]) -> Self {
        Self { lat, lng }
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(c: Coordinates) -> Self {
        [c.lat, c.lng]
    }
}

/// Report entity, annotated with its comment count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    #[serde(rename = "type")]
    pub category: String,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub status: ReportStatus,
    pub priority: Priority,
    pub location: String,
    pub coordinates: Coordinates,
    pub date_submitted: DateTime<Utc>,
    pub reported_by: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub comment_count: i64,
}

/// Input for a new report. Status, author and date are set by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReportInput {
    #[serde(rename = "type")]
    pub category: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    pub location: String,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Map pin for one report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMarker {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub category: String,
    pub status: ReportStatus,
    pub coordinates: Coordinates,
}

impl From<&Report> for ReportMarker {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id,
            title: report.title.clone(),
            category: report.category.clone(),
            status: report.status,
            coordinates: report.coordinates,
        }
    }
}

/// Optional narrowing of the report list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub category: Option<String>,
}

impl ReportFilter {
    /// Query-cache key for this filter
    pub fn cache_key(&self) -> String {
        format!(
            "reports:list:{}:{}",
            self.status.map(|s| s.as_str()).unwrap_or("all"),
            self.category.as_deref().unwrap_or("all"),
        )
    }
}

//! Services layer
//!
//! Business rules on top of the repositories: validation, cache handling
//! and the mapping from storage errors to domain errors.

pub mod auth;
pub mod comment;
pub mod format;
pub mod password;
pub mod profile;
pub mod rate_limiter;
pub mod report;

pub use auth::{AuthService, AuthServiceError, LoginInput, RegisterInput};
pub use comment::{CommentService, CommentServiceError};
pub use format::{format_date, format_status, time_ago};
pub use password::{hash_password, verify_password};
pub use profile::{ProfileService, ProfileServiceError};
pub use rate_limiter::LoginRateLimiter;
pub use report::{ReportService, ReportServiceError};

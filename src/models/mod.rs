//! Data models
//!
//! Plain records for the `users`, `profiles`, `sessions`, `reports` and
//! `comments` tables, plus the input types the services accept.

mod comment;
mod report;
mod session;
mod user;

pub use comment::{Comment, CreateCommentInput};
pub use report::{
    Coordinates, CreateReportInput, Priority, Report, ReportFilter, ReportMarker, ReportStatus,
};
pub use session::Session;
pub use user::{
    check_name_length, NewUser, Profile, SessionUser, UpdateProfileInput, User, MAX_NAME_LENGTH,
};

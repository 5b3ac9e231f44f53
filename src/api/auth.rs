//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - create an account and sign in
//! - POST /api/v1/auth/login - sign in
//! - POST /api/v1/auth/logout - end the current session
//! - GET /api/v1/auth/me - current user
//! - PUT /api/v1/auth/profile - change first/last name
//! - PUT /api/v1/auth/password - change password

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;

use crate::api::extract::ApiJson;
use crate::api::middleware::{client_ip, ApiError, AppState, AuthenticatedUser, SessionToken};
use crate::api::responses::{AuthResponse, MessageResponse};
use crate::models::{Session, SessionUser, UpdateProfileInput};
use crate::services::{AuthServiceError, LoginInput, RegisterInput};

const IP_RETRY_AFTER_SECS: u64 = 60;
const EMAIL_RETRY_AFTER_SECS: u64 = 15 * 60;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Routes that need no session
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
        .route("/profile", put(update_profile))
        .route("/password", put(change_password))
}

fn session_cookie(session: &Session) -> Result<HeaderValue, ApiError> {
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id,
        session.max_age_seconds()
    );
    HeaderValue::from_str(&cookie).map_err(ApiError::internal)
}

fn signed_in(user: SessionUser, session: Session) -> Result<(HeaderMap, Json<AuthResponse>), ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie(&session)?);
    Ok((headers, Json(AuthResponse::bearer(user, session.id))))
}

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = RegisterInput::new(body.email, body.password).with_name(body.first_name, body.last_name);
    let (user, session) = state.auth.register(input).await?;

    let (headers, body) = signed_in(user, session)?;
    Ok((StatusCode::CREATED, headers, body))
}

/// POST /api/v1/auth/login
///
/// Limited to 10 requests per minute per client IP and 5 failed attempts
/// per email in 15 minutes.
async fn login(
    State(state): State<AppState>,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let peer = peer.map(|Extension(ConnectInfo(addr))| addr);
    if let Some(ip) = client_ip(&headers, peer) {
        if !state.rate_limiter.allow_request(ip).await {
            tracing::warn!(%ip, "login rate limit exceeded");
            return Err(ApiError::rate_limited(
                "Too many login requests, try again later",
                IP_RETRY_AFTER_SECS,
            ));
        }
    }

    if state.rate_limiter.is_email_locked(&body.email).await {
        return Err(ApiError::rate_limited(
            "Too many failed login attempts, try again in 15 minutes",
            EMAIL_RETRY_AFTER_SECS,
        ));
    }

    let email = body.email.clone();
    match state.auth.login(LoginInput::new(body.email, body.password)).await {
        Ok((user, session)) => {
            state.rate_limiter.clear_failures(&email).await;
            signed_in(user, session)
        }
        Err(AuthServiceError::InvalidCredentials) => {
            state.rate_limiter.record_failure(&email).await;
            Err(AuthServiceError::InvalidCredentials.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.logout(&token).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok((StatusCode::NO_CONTENT, headers))
}

/// GET /api/v1/auth/me
async fn get_current_user(AuthenticatedUser(user): AuthenticatedUser) -> Json<SessionUser> {
    Json(user)
}

/// PUT /api/v1/auth/profile
async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<UpdateProfileInput>,
) -> Result<Json<SessionUser>, ApiError> {
    state.profiles.update_names(user.id, body).await?;
    let refreshed = state.auth.current_user(user.id).await?;
    Ok(Json(refreshed))
}

/// PUT /api/v1/auth/password
async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    SessionToken(token): SessionToken,
    ApiJson(body): ApiJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .auth
        .change_password(user.id, &body.current_password, &body.new_password, &token)
        .await
        .map_err(|e| match e {
            AuthServiceError::InvalidCredentials => {
                ApiError::validation_error("Current password is incorrect")
            }
            other => other.into(),
        })?;

    Ok(Json(MessageResponse::new("Password updated")))
}

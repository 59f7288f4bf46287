//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: registration, login, logout, password reset and
//! the current-session probe the client uses to restore its state.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;
use warga_core::accounts::RegistrationForm;

use crate::web::middleware::{clear_session_cookie, current_session, session_cookie, session_token};
use crate::web::reply::{reject, Rejection};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub full_name: String,
    pub house_number: String,
    /// 16-digit national identity number.
    pub nik: String,
    pub phone: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl From<RegisterRequest> for RegistrationForm {
    fn from(r: RegisterRequest) -> Self {
        RegistrationForm {
            full_name: r.full_name,
            house_number: r.house_number,
            nik: r.nik,
            phone: r.phone,
            email: r.email,
            password: r.password,
            confirm_password: r.confirm_password,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Serialize, ToSchema)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub full_name: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    /// `user` or `admin`.
    pub role: String,
    /// Where the client should navigate after signing in.
    pub redirect: String,
}

#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub authenticated: bool,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create an account and its resident profile
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created; the user must still log in", body = RegisterResponse),
        (status = 400, description = "Form validation failed"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let profile = state
        .accounts
        .register(req.into())
        .await
        .map_err(|e| reject("Registration", e))?;

    let response = RegisterResponse {
        user_id: profile.id,
        full_name: profile.full_name,
        message: "Registrasi berhasil! Silakan login.".to_string(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, Rejection> {
    // 1. Sign in and resolve the landing route from the role
    let outcome = state
        .accounts
        .login(&req.email, &req.password)
        .await
        .map_err(|e| reject("Login", e))?;

    // 2. Create session cookie
    let cookie = session_cookie(&outcome.session.token, outcome.session.expires_at);

    // 3. Return response with cookie
    let response = AuthResponse {
        user_id: outcome.session.user_id,
        email: outcome.session.email,
        role: outcome.role.as_str().to_string(),
        redirect: outcome.landing.to_string(),
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out; the cookie is cleared"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, Rejection> {
    // Logging out without a session is not an error.
    if let Some(token) = session_token(&headers) {
        state
            .accounts
            .logout(token)
            .await
            .map_err(|e| reject("Logout", e))?;
    }
    Ok((StatusCode::OK, [(header::SET_COOKIE, clear_session_cookie())]))
}

/// POST /auth/forgot-password - Email a password reset link
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset link sent if the account exists", body = MessageResponse),
        (status = 400, description = "Invalid email"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, Rejection> {
    state
        .accounts
        .request_password_reset(&req.email, &state.config.site_origin)
        .await
        .map_err(|e| reject("Password reset", e))?;
    info!("Password reset requested");
    Ok(Json(MessageResponse {
        message: "Link reset password telah dikirim ke email Anda.".to_string(),
    }))
}

/// GET /auth/session - The session behind the cookie, if still live
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Current session state", body = SessionResponse)
    )
)]
pub async fn session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let session = current_session(&state, &headers).await;
    if session.is_none() && session_token(&headers).is_some() {
        debug!("Stale session cookie presented");
    }
    Json(SessionResponse {
        authenticated: session.is_some(),
        user_id: session.as_ref().map(|s| s.user_id),
        email: session.as_ref().map(|s| s.email.clone()),
        expires_at: session.as_ref().map(|s| s.expires_at),
    })
}

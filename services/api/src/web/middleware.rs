//! services/api/src/web/middleware.rs
//!
//! The authorization gates as route middleware.
//!
//! `require_auth` resolves the session cookie and admits any signed-in caller;
//! `require_admin` is layered inside it and re-reads the caller's role before
//! every admin request. Denials carry the route the client should navigate to.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};
use warga_core::{Caller, GateDenied, GateTier, Session};

use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// The session token carried by the `session` cookie, if any.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|token| !token.is_empty())
}

pub fn session_cookie(token: &str, expires_at: DateTime<Utc>) -> String {
    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
    format!(
        "{SESSION_COOKIE}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        token, max_age
    )
}

pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0")
}

/// Resolves the live session behind the request's cookie.
///
/// A provider failure is logged and treated as "no session".
pub async fn current_session(state: &AppState, headers: &HeaderMap) -> Option<Session> {
    let token = session_token(headers)?;
    match state.accounts.session(token).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to resolve session: {}", e);
            None
        }
    }
}

/// The response sent when a gate turns a request away.
pub fn denial_response(denied: GateDenied) -> Response {
    match denied {
        GateDenied::Pending => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        GateDenied::SignInRequired => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "redirect": denied.redirect_target() })),
        )
            .into_response(),
        GateDenied::NotAuthorized { ref lookup_error } => {
            let body = match lookup_error {
                Some(error) => json!({ "redirect": denied.redirect_target(), "error": error }),
                None => json!({ "redirect": denied.redirect_target() }),
            };
            (StatusCode::FORBIDDEN, Json(body)).into_response()
        }
    }
}

async fn admit(state: &AppState, tiers: &[GateTier], session: Option<Session>) -> Result<Caller, Response> {
    match state.gate.require(tiers, session).await {
        Ok(Some(caller)) => Ok(caller),
        // Only an empty tier list admits without a caller.
        Ok(None) => Err(denial_response(GateDenied::SignInRequired)),
        Err(denied) => {
            warn!(?tiers, "Gate denied request: {}", denied);
            Err(denial_response(denied))
        }
    }
}

/// Middleware for the resident area.
///
/// If admitted, inserts the `Caller` into request extensions for handlers to use.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    // 1. Resolve the session from the cookie
    let session = current_session(&state, req.headers()).await;

    // 2. Evaluate the resident gate with a fresh profile read
    let caller = admit(&state, &[GateTier::Resident], session).await?;

    // 3. Hand the caller to the handler
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

/// Middleware for the admin area. Must run inside `require_auth`.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let session = req
        .extensions()
        .get::<Caller>()
        .map(|caller| caller.session.clone());
    let caller = admit(&state, &[GateTier::Admin], session).await?;

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_is_read_from_any_cookie_position() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc-123; lang=id"),
        );
        assert_eq!(session_token(&headers), Some("abc-123"));

        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(session_token(&headers), None);
        assert_eq!(session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn expired_cookie_has_zero_max_age() {
        let cookie = session_cookie("t", Utc::now() - chrono::Duration::minutes(1));
        assert!(cookie.ends_with("Max-Age=0"));
        assert!(cookie.starts_with("session=t;"));
    }
}

//! services/api/src/web/router.rs
//!
//! Assembles the HTTP surface: public, resident and admin route groups, the
//! static object store and the Swagger UI.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, patch, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::adapters::storage::PUBLIC_PREFIX;
use crate::error::ApiError;
use crate::web::{admin, auth, middleware, resident, rest, state::AppState};

pub fn build_router(state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = state
        .config
        .allowed_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid ALLOWED_ORIGIN: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/forgot-password", post(auth::forgot_password_handler))
        .route("/auth/session", get(auth::session_handler))
        .route("/routes/resolve", get(rest::resolve_route_handler))
        .route("/kegiatan", get(rest::list_activities_handler))
        .route("/kegiatan/{id}", get(rest::get_activity_handler))
        .route("/layanan", post(rest::submit_service_request_handler));

    // Resident area (signed in)
    let resident_routes = Router::new()
        .route(
            "/me/profile",
            get(resident::get_profile_handler).patch(resident::update_profile_handler),
        )
        .route("/me/invoices", get(resident::list_invoices_handler))
        .route("/me/invoices/receipt", post(resident::upload_receipt_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Admin area: the admin gate runs inside the resident gate.
    let admin_routes = Router::new()
        .route("/admin/stats", get(admin::stats_handler))
        .route("/admin/residents", get(admin::list_residents_handler))
        .route(
            "/admin/residents/{id}",
            patch(admin::update_resident_handler).delete(admin::delete_resident_handler),
        )
        .route("/admin/residents/{id}/role", put(admin::change_role_handler))
        .route(
            "/admin/activities",
            get(admin::list_activities_handler).post(admin::create_activity_handler),
        )
        .route(
            "/admin/activities/images",
            post(admin::upload_activity_images_handler).delete(admin::delete_activity_image_handler),
        )
        .route(
            "/admin/activities/{id}",
            put(admin::update_activity_handler).delete(admin::delete_activity_handler),
        )
        .route("/admin/services", get(admin::list_service_requests_handler))
        .route("/admin/services/{id}", patch(admin::respond_service_request_handler))
        .route(
            "/admin/invoices",
            get(admin::list_invoices_handler).post(admin::create_invoices_handler),
        )
        .route("/admin/invoices/{id}/status", patch(admin::set_invoice_status_handler))
        .route("/admin/notifications", get(admin::list_notifications_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(resident_routes)
        .merge(admin_routes)
        .nest_service(PUBLIC_PREFIX, ServeDir::new(&state.config.storage_root))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(cors)
        .with_state(state);

    // Merge the API router with the Swagger UI router for a complete application.
    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", rest::ApiDoc::openapi())))
}


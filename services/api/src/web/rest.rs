//! services/api/src/web/rest.rs
//!
//! Contains the public (no sign-in required) REST handlers and the master
//! definition for the OpenAPI specification.

use crate::web::form::FormParts;
use crate::web::middleware::current_session;
use crate::web::reply::{bad_request, reject, Rejection};
use crate::web::state::AppState;
use crate::web::{admin, auth, resident};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;
use warga_core::requests::ServiceRequestForm;
use warga_core::routes::route_tiers;
use warga_core::{GateDecision, ServiceCategory, ServiceStatus, SessionSnapshot};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::forgot_password_handler,
        auth::session_handler,
        resolve_route_handler,
        list_activities_handler,
        get_activity_handler,
        submit_service_request_handler,
        resident::get_profile_handler,
        resident::update_profile_handler,
        resident::list_invoices_handler,
        resident::upload_receipt_handler,
        admin::stats_handler,
        admin::list_residents_handler,
        admin::update_resident_handler,
        admin::delete_resident_handler,
        admin::change_role_handler,
        admin::list_activities_handler,
        admin::create_activity_handler,
        admin::update_activity_handler,
        admin::delete_activity_handler,
        admin::upload_activity_images_handler,
        admin::delete_activity_image_handler,
        admin::list_service_requests_handler,
        admin::respond_service_request_handler,
        admin::list_invoices_handler,
        admin::create_invoices_handler,
        admin::set_invoice_status_handler,
        admin::list_notifications_handler,
    ),
    components(
        schemas(
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::ForgotPasswordRequest,
            auth::RegisterResponse,
            auth::AuthResponse,
            auth::SessionResponse,
            auth::MessageResponse,
            RouteDecisionResponse,
            SubmittedResponse,
            resident::UpdateProfileRequest,
            resident::ReceiptResponse,
            admin::ResidentUpdateRequest,
            admin::RoleRequest,
            admin::ImageUploadResponse,
            admin::DeleteImageRequest,
            admin::RespondRequest,
            admin::CreateInvoicesRequest,
            admin::InvoiceStatusRequest,
        )
    ),
    tags(
        (name = "WargaSepuluh API", description = "Community portal: residents, IPL dues, service requests and activities.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResolveQuery {
    /// A client route such as `/admin/ipl`.
    pub path: String,
}

/// What the gates decide for a client route and the current cookie.
#[derive(Serialize, ToSchema)]
pub struct RouteDecisionResponse {
    pub path: String,
    /// `allow`, `redirect_login` or `redirect_not_authorized`.
    pub decision: String,
    pub redirect: Option<String>,
    pub error: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct SubmittedResponse {
    pub id: Uuid,
    pub status: String,
    pub attachment_url: Option<String>,
}

fn decision_name(decision: GateDecision) -> &'static str {
    match decision {
        GateDecision::Wait => "wait",
        GateDecision::Allow => "allow",
        GateDecision::RedirectLogin => "redirect_login",
        GateDecision::RedirectNotAuthorized => "redirect_not_authorized",
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Evaluate the gates guarding a client route for the current caller.
#[utoipa::path(
    get,
    path = "/routes/resolve",
    params(ResolveQuery),
    responses(
        (status = 200, description = "Gate decision for the route", body = RouteDecisionResponse),
        (status = 404, description = "Unknown route")
    )
)]
pub async fn resolve_route_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ResolveQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let tiers = route_tiers(&query.path)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Unknown route {}", query.path)))?;

    let snapshot = match current_session(&state, &headers).await {
        Some(session) => SessionSnapshot::signed_in(session),
        None => SessionSnapshot::anonymous(),
    };
    let outcome = state.gate.admit(tiers, &snapshot).await;

    Ok(Json(RouteDecisionResponse {
        path: query.path,
        decision: decision_name(outcome.decision).to_string(),
        redirect: outcome.decision.redirect_target().map(str::to_string),
        error: outcome.lookup_error,
    }))
}

/// List neighbourhood activities, newest first.
#[utoipa::path(
    get,
    path = "/kegiatan",
    responses(
        (status = 200, description = "All activities"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_activities_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, Rejection> {
    let activities = state
        .activities
        .list()
        .await
        .map_err(|e| reject("List activities", e))?;
    Ok(Json(activities))
}

/// Fetch one activity.
#[utoipa::path(
    get,
    path = "/kegiatan/{id}",
    params(("id" = Uuid, Path, description = "Activity id")),
    responses(
        (status = 200, description = "The activity"),
        (status = 404, description = "No such activity")
    )
)]
pub async fn get_activity_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Rejection> {
    let activity = state
        .activities
        .get(id)
        .await
        .map_err(|e| reject("Get activity", e))?;
    Ok(Json(activity))
}

/// Submit a service request (layanan), signed in or as a guest.
///
/// Accepts `multipart/form-data` with the text fields `category`, `title`,
/// `description`, optional `status`, the category-specific fields and an
/// optional `attachment` file.
#[utoipa::path(
    post,
    path = "/layanan",
    request_body(content_type = "multipart/form-data", description = "The request form and optional attachment."),
    responses(
        (status = 201, description = "Request filed", body = SubmittedResponse),
        (status = 400, description = "Bad request (e.g., missing title or unknown category)"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn submit_service_request_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, Rejection> {
    let mut parts = FormParts::read(multipart).await?;
    let category = parts
        .parsed::<ServiceCategory>("category")?
        .ok_or_else(|| bad_request("Field 'category' is required"))?;

    let form = ServiceRequestForm {
        category,
        title: parts.text("title").unwrap_or_default(),
        description: parts.text("description").unwrap_or_default(),
        status: parts.parsed::<ServiceStatus>("status")?,
        jenis_surat: parts.text("jenis_surat"),
        tujuan: parts.text("tujuan"),
        lokasi_kejadian: parts.text("lokasi_kejadian"),
        tanggal_kejadian: parts.text("tanggal_kejadian"),
    };
    let attachment = parts.take_file("attachment");

    // Signed-in residents are recorded as the submitter; everyone else is a guest.
    let submitter = current_session(&state, &headers)
        .await
        .map(|session| session.identity());
    let request = state
        .desk
        .submit(submitter.as_ref(), form, attachment)
        .await
        .map_err(|e| reject("Submit service request", e))?;

    Ok((
        StatusCode::CREATED,
        Json(SubmittedResponse {
            id: request.id,
            status: request.status.as_str().to_string(),
            attachment_url: request.attachment_url,
        }),
    ))
}

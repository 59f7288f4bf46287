//! services/api/src/web/resident.rs
//!
//! Handlers behind the resident gate: the caller's own profile and invoices.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use warga_core::accounts::ResidentProfileUpdate;
use warga_core::Caller;

use crate::web::form::FormParts;
use crate::web::reply::{bad_request, reject, Rejection};
use crate::web::state::AppState;

/// The fields a resident may change about themselves.
#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub house_number: Option<String>,
    pub phone: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ReceiptResponse {
    pub url: String,
}

/// The caller's own profile.
#[utoipa::path(
    get,
    path = "/me/profile",
    responses(
        (status = 200, description = "The caller's profile"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "No profile row for this account")
    )
)]
pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, Rejection> {
    let profile = state
        .accounts
        .own_profile(&caller)
        .await
        .map_err(|e| reject("Get profile", e))?;
    Ok(Json(profile))
}

#[utoipa::path(
    patch,
    path = "/me/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let update = ResidentProfileUpdate {
        full_name: req.full_name,
        house_number: req.house_number,
        phone: req.phone,
    };
    let profile = state
        .accounts
        .update_own_profile(&caller, update)
        .await
        .map_err(|e| reject("Update profile", e))?;
    Ok(Json(profile))
}

/// The caller's IPL invoices, newest period first.
#[utoipa::path(
    get,
    path = "/me/invoices",
    responses(
        (status = 200, description = "The caller's invoices"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn list_invoices_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, Rejection> {
    let invoices = state
        .dues
        .invoices_for_resident(&caller)
        .await
        .map_err(|e| reject("List own invoices", e))?;
    Ok(Json(invoices))
}

/// Upload a proof-of-payment file.
///
/// Accepts `multipart/form-data` with a single `file` part.
#[utoipa::path(
    post,
    path = "/me/invoices/receipt",
    request_body(content_type = "multipart/form-data", description = "The receipt image or PDF."),
    responses(
        (status = 201, description = "Receipt stored", body = ReceiptResponse),
        (status = 400, description = "Missing or empty file"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn upload_receipt_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    multipart: Multipart,
) -> Result<impl IntoResponse, Rejection> {
    let mut parts = FormParts::read(multipart).await?;
    let file = parts
        .take_file("file")
        .ok_or_else(|| bad_request("Multipart form must include a file"))?;
    let url = state
        .dues
        .upload_receipt(&caller, file)
        .await
        .map_err(|e| reject("Upload receipt", e))?;
    Ok((StatusCode::CREATED, Json(ReceiptResponse { url })))
}

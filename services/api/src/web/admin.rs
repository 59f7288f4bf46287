//! services/api/src/web/admin.rs
//!
//! Handlers behind the admin gate: dashboard, residents, activities, service
//! requests, IPL invoices and notifications.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use warga_core::activities::ActivityForm;
use warga_core::stats::dashboard_stats;
use warga_core::uploads::ACTIVITY_IMAGES_BUCKET;
use warga_core::{
    Caller, InvoiceFilter, InvoiceStatus, ProfilePatch, Role, ServiceCategory,
    ServiceRequestFilter, ServiceStatus,
};

use crate::web::form::FormParts;
use crate::web::reply::{bad_request, reject, Rejection};
use crate::web::state::AppState;

const DEFAULT_NOTIFICATION_LIMIT: i64 = 20;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct ResidentUpdateRequest {
    pub full_name: Option<String>,
    pub house_number: Option<String>,
    pub nik: Option<String>,
    pub phone: Option<String>,
    #[schema(value_type = Option<String>, example = "admin")]
    pub role: Option<Role>,
}

#[derive(Deserialize, ToSchema)]
pub struct RoleRequest {
    #[schema(value_type = String, example = "admin")]
    pub role: Role,
}

#[derive(Serialize, ToSchema)]
pub struct ImageUploadResponse {
    /// Object paths inside the activity image bucket.
    pub paths: Vec<String>,
    pub urls: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct DeleteImageRequest {
    pub url: String,
}

#[derive(Deserialize, ToSchema)]
pub struct RespondRequest {
    #[schema(value_type = String, example = "diproses")]
    pub status: ServiceStatus,
    pub admin_response: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateInvoicesRequest {
    pub month: u32,
    pub year: i32,
    pub amount: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct InvoiceStatusRequest {
    #[schema(value_type = String, example = "lunas")]
    pub status: InvoiceStatus,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ServiceRequestQuery {
    #[param(value_type = Option<String>)]
    pub category: Option<ServiceCategory>,
    #[param(value_type = Option<String>)]
    pub status: Option<ServiceStatus>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InvoiceQuery {
    /// Matches this month in every year unless `year` is also given.
    pub month: Option<u32>,
    pub year: Option<i32>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    pub limit: Option<i64>,
}

/// Accepts RFC 3339, a `datetime-local` value or a bare date (taken as midnight UTC).
fn parse_activity_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn activity_form(parts: &FormParts) -> Result<ActivityForm, Rejection> {
    let raw_date = parts.required("date")?;
    let date = parse_activity_date(&raw_date)
        .ok_or_else(|| bad_request(format!("Invalid date '{}'", raw_date)))?;
    Ok(ActivityForm {
        title: parts.text("title").unwrap_or_default(),
        description: parts.text("description").unwrap_or_default(),
        date,
        location: parts.text("location").unwrap_or_default(),
    })
}

//=========================================================================================
// Dashboard
//=========================================================================================

#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Headline counts for the dashboard"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, Rejection> {
    let stats = dashboard_stats(&state.db, &caller)
        .await
        .map_err(|e| reject("Dashboard stats", e))?;
    Ok(Json(stats))
}

//=========================================================================================
// Residents (warga)
//=========================================================================================

#[utoipa::path(
    get,
    path = "/admin/residents",
    responses(
        (status = 200, description = "All resident profiles"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn list_residents_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, Rejection> {
    let residents = state
        .accounts
        .list_residents(&caller)
        .await
        .map_err(|e| reject("List residents", e))?;
    Ok(Json(residents))
}

#[utoipa::path(
    patch,
    path = "/admin/residents/{id}",
    params(("id" = Uuid, Path, description = "Resident id")),
    request_body = ResidentUpdateRequest,
    responses(
        (status = 200, description = "Updated profile"),
        (status = 400, description = "Invalid NIK"),
        (status = 403, description = "Not an admin, or an admin changing their own role"),
        (status = 404, description = "No such resident")
    )
)]
pub async fn update_resident_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResidentUpdateRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let patch = ProfilePatch {
        full_name: req.full_name,
        house_number: req.house_number,
        nik: req.nik,
        phone: req.phone,
        role: req.role,
    };
    let profile = state
        .accounts
        .update_resident(&caller, id, patch)
        .await
        .map_err(|e| reject("Update resident", e))?;
    Ok(Json(profile))
}

#[utoipa::path(
    put,
    path = "/admin/residents/{id}/role",
    params(("id" = Uuid, Path, description = "Resident id")),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "Role changed"),
        (status = 403, description = "Not an admin, or changing one's own role")
    )
)]
pub async fn change_role_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(req): Json<RoleRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let profile = state
        .accounts
        .change_role(&caller, id, req.role)
        .await
        .map_err(|e| reject("Change role", e))?;
    Ok(Json(profile))
}

/// Deletes the resident's profile row. Their login account is kept.
#[utoipa::path(
    delete,
    path = "/admin/residents/{id}",
    params(("id" = Uuid, Path, description = "Resident id")),
    responses(
        (status = 204, description = "Profile deleted"),
        (status = 403, description = "Not an admin, or deleting oneself"),
        (status = 404, description = "No such resident")
    )
)]
pub async fn delete_resident_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Rejection> {
    state
        .accounts
        .delete_resident(&caller, id)
        .await
        .map_err(|e| reject("Delete resident", e))?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Activities (kegiatan)
//=========================================================================================

#[utoipa::path(
    get,
    path = "/admin/activities",
    responses((status = 200, description = "All activities"))
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

/// Create an activity from `title`, `description`, `date`, `location` and any `images` files.
#[utoipa::path(
    post,
    path = "/admin/activities",
    request_body(content_type = "multipart/form-data", description = "Activity fields and images."),
    responses(
        (status = 201, description = "Activity created"),
        (status = 400, description = "Missing title or bad date")
    )
)]
pub async fn create_activity_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    multipart: Multipart,
) -> Result<impl IntoResponse, Rejection> {
    let mut parts = FormParts::read(multipart).await?;
    let form = activity_form(&parts)?;
    let images = parts.take_files("images");
    let activity = state
        .activities
        .save(&caller, None, form, images)
        .await
        .map_err(|e| reject("Create activity", e))?;
    Ok((StatusCode::CREATED, Json(activity)))
}

/// Replace an activity's fields; new `images` are appended to the existing ones.
#[utoipa::path(
    put,
    path = "/admin/activities/{id}",
    params(("id" = Uuid, Path, description = "Activity id")),
    request_body(content_type = "multipart/form-data", description = "Activity fields and extra images."),
    responses(
        (status = 200, description = "Activity updated"),
        (status = 404, description = "No such activity")
    )
)]
pub async fn update_activity_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, Rejection> {
    let mut parts = FormParts::read(multipart).await?;
    let form = activity_form(&parts)?;
    let images = parts.take_files("images");
    let activity = state
        .activities
        .save(&caller, Some(id), form, images)
        .await
        .map_err(|e| reject("Update activity", e))?;
    Ok(Json(activity))
}

#[utoipa::path(
    delete,
    path = "/admin/activities/{id}",
    params(("id" = Uuid, Path, description = "Activity id")),
    responses(
        (status = 204, description = "Activity deleted"),
        (status = 404, description = "No such activity")
    )
)]
pub async fn delete_activity_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, Rejection> {
    state
        .activities
        .delete(&caller, id)
        .await
        .map_err(|e| reject("Delete activity", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Upload `images` files ahead of saving, optionally tagged with `activity_id`.
#[utoipa::path(
    post,
    path = "/admin/activities/images",
    request_body(content_type = "multipart/form-data", description = "One or more image files."),
    responses(
        (status = 201, description = "Images stored; failed files are skipped", body = ImageUploadResponse)
    )
)]
pub async fn upload_activity_images_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    multipart: Multipart,
) -> Result<impl IntoResponse, Rejection> {
    let mut parts = FormParts::read(multipart).await?;
    let activity_id = parts.parsed::<Uuid>("activity_id")?;
    let files = parts.take_files("images");
    if files.is_empty() {
        return Err(bad_request("Multipart form must include at least one image"));
    }

    let paths = state
        .activities
        .upload_images(&caller, activity_id, files)
        .await
        .map_err(|e| reject("Upload activity images", e))?;
    let urls = paths
        .iter()
        .map(|path| state.storage.public_url(ACTIVITY_IMAGES_BUCKET, path))
        .collect();
    Ok((StatusCode::CREATED, Json(ImageUploadResponse { paths, urls })))
}

#[utoipa::path(
    delete,
    path = "/admin/activities/images",
    request_body = DeleteImageRequest,
    responses(
        (status = 204, description = "Image removed"),
        (status = 400, description = "URL does not point into the image bucket")
    )
)]
pub async fn delete_activity_image_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<DeleteImageRequest>,
) -> Result<impl IntoResponse, Rejection> {
    state
        .activities
        .delete_image(&caller, &req.url)
        .await
        .map_err(|e| reject("Delete activity image", e))?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Service requests (layanan)
//=========================================================================================

#[utoipa::path(
    get,
    path = "/admin/services",
    params(ServiceRequestQuery),
    responses((status = 200, description = "Matching requests, newest first"))
)]
pub async fn list_service_requests_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ServiceRequestQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let filter = ServiceRequestFilter {
        category: query.category,
        status: query.status,
    };
    let requests = state
        .desk
        .list(&caller, filter)
        .await
        .map_err(|e| reject("List service requests", e))?;
    Ok(Json(requests))
}

#[utoipa::path(
    patch,
    path = "/admin/services/{id}",
    params(("id" = Uuid, Path, description = "Service request id")),
    request_body = RespondRequest,
    responses(
        (status = 200, description = "Request updated"),
        (status = 404, description = "No such request")
    )
)]
pub async fn respond_service_request_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let request = state
        .desk
        .respond(&caller, id, req.status, req.admin_response.as_deref())
        .await
        .map_err(|e| reject("Respond to service request", e))?;
    Ok(Json(request))
}

//=========================================================================================
// IPL invoices
//=========================================================================================

#[utoipa::path(
    get,
    path = "/admin/invoices",
    params(InvoiceQuery),
    responses((status = 200, description = "Matching invoices with resident names, newest period first"))
)]
pub async fn list_invoices_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<InvoiceQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let filter = InvoiceFilter {
        month: query.month,
        year: query.year,
    };
    let invoices = state
        .dues
        .list_invoices(&caller, filter)
        .await
        .map_err(|e| reject("List invoices", e))?;
    Ok(Json(invoices))
}

/// Bill every resident for a month. Residents already billed for it are skipped.
#[utoipa::path(
    post,
    path = "/admin/invoices",
    request_body = CreateInvoicesRequest,
    responses(
        (status = 201, description = "Invoices created"),
        (status = 400, description = "Bad month, year or amount")
    )
)]
pub async fn create_invoices_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateInvoicesRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let batch = state
        .dues
        .create_monthly_invoices(&caller, req.month, req.year, req.amount)
        .await
        .map_err(|e| reject("Create invoices", e))?;
    Ok((StatusCode::CREATED, Json(batch)))
}

#[utoipa::path(
    patch,
    path = "/admin/invoices/{id}/status",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = InvoiceStatusRequest,
    responses(
        (status = 200, description = "Status changed; paid date stamped or cleared"),
        (status = 404, description = "No such invoice")
    )
)]
pub async fn set_invoice_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(req): Json<InvoiceStatusRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let invoice = state
        .dues
        .set_payment_status(&caller, id, req.status)
        .await
        .map_err(|e| reject("Set invoice status", e))?;
    Ok(Json(invoice))
}

//=========================================================================================
// Notifications
//=========================================================================================

#[utoipa::path(
    get,
    path = "/admin/notifications",
    params(NotificationQuery),
    responses((status = 200, description = "Most recent notifications first"))
)]
pub async fn list_notifications_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<NotificationQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let notifications = state
        .desk
        .recent_notifications(&caller, query.limit.unwrap_or(DEFAULT_NOTIFICATION_LIMIT))
        .await
        .map_err(|e| reject("List notifications", e))?;
    Ok(Json(notifications))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn activity_dates_in_common_shapes() {
        let rfc = parse_activity_date("2025-08-17T07:30:00+07:00").unwrap();
        assert_eq!(rfc.hour(), 0);
        assert_eq!(rfc.minute(), 30);

        let local = parse_activity_date("2025-08-17T07:30").unwrap();
        assert_eq!((local.day(), local.hour()), (17, 7));

        let bare = parse_activity_date("2025-08-17").unwrap();
        assert_eq!((bare.month(), bare.hour()), (8, 0));

        assert!(parse_activity_date("17/08/2025").is_none());
    }
}

//! crates/warga_core/src/ports.rs
//!
//! Defines the contracts (traits) the portal requires from its hosted backend.
//! These traits form the boundary of the hexagonal architecture: persistence,
//! identity and object storage are external collaborators reached only through
//! them, so the core stays independent of any concrete backend.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{
    Activity, ActivityInput, Identity, Invoice, InvoiceFilter, InvoiceStatus, InvoiceWithResident,
    NewInvoice, NewNotification, NewProfile, NewServiceRequest, Notification, Profile,
    ProfilePatch, ServiceRequest, ServiceRequestFilter, ServiceRequestWithResident, ServiceStatus,
    Session, SignUpMetadata,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (database, network, disk).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Identity Provider
//=========================================================================================

/// A change in authentication state, broadcast to anyone following the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut { token: String },
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchanges credentials for a fresh session.
    async fn sign_in(&self, email: &str, password: &str) -> PortResult<Session>;

    /// Creates an account. Does not sign in.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> PortResult<Identity>;

    async fn sign_out(&self, token: &str) -> PortResult<()>;

    /// Starts a password reset; the emailed link points at `redirect_url`.
    async fn reset_password_for_email(&self, email: &str, redirect_url: &str) -> PortResult<()>;

    /// Looks up a live session. Unknown and expired tokens are `Ok(None)`.
    async fn get_session(&self, token: &str) -> PortResult<Option<Session>>;

    /// Removes an account and its sessions. Used to compensate a failed registration.
    async fn delete_identity(&self, user_id: Uuid) -> PortResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

//=========================================================================================
// Table Store
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- profiles ---
    async fn list_profiles(&self) -> PortResult<Vec<Profile>>;

    async fn get_profile(&self, user_id: Uuid) -> PortResult<Option<Profile>>;

    async fn insert_profile(&self, profile: NewProfile) -> PortResult<Profile>;

    async fn update_profile(&self, user_id: Uuid, patch: &ProfilePatch) -> PortResult<Profile>;

    async fn delete_profile(&self, user_id: Uuid) -> PortResult<()>;

    async fn count_profiles(&self) -> PortResult<i64>;

    // --- ipl_payments ---
    /// Ordered by year descending, then month descending.
    async fn list_invoices(&self, filter: InvoiceFilter) -> PortResult<Vec<InvoiceWithResident>>;

    async fn list_invoices_for_user(&self, user_id: Uuid) -> PortResult<Vec<Invoice>>;

    /// Inserts every row or none of them.
    async fn insert_invoices(&self, rows: Vec<NewInvoice>) -> PortResult<Vec<Invoice>>;

    async fn update_invoice_status(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
        paid_date: Option<DateTime<Utc>>,
    ) -> PortResult<Invoice>;

    /// Sum of `amount` over invoices with status `lunas`.
    async fn sum_paid_invoices(&self) -> PortResult<i64>;

    // --- layanan_warga ---
    async fn insert_service_request(&self, request: NewServiceRequest) -> PortResult<ServiceRequest>;

    /// Ordered by creation time, newest first.
    async fn list_service_requests(
        &self,
        filter: ServiceRequestFilter,
    ) -> PortResult<Vec<ServiceRequestWithResident>>;

    /// Sets the status and, when `admin_response` is `Some`, overwrites the response.
    async fn update_service_request(
        &self,
        request_id: Uuid,
        status: ServiceStatus,
        admin_response: Option<&str>,
    ) -> PortResult<ServiceRequest>;

    async fn count_service_requests(&self, status: Option<ServiceStatus>) -> PortResult<i64>;

    // --- kegiatan ---
    /// Ordered by activity date, newest first.
    async fn list_activities(&self) -> PortResult<Vec<Activity>>;

    async fn get_activity(&self, activity_id: Uuid) -> PortResult<Activity>;

    async fn create_activity(&self, input: &ActivityInput) -> PortResult<Activity>;

    async fn update_activity(&self, activity_id: Uuid, input: &ActivityInput) -> PortResult<Activity>;

    async fn delete_activity(&self, activity_id: Uuid) -> PortResult<()>;

    async fn count_activities(&self) -> PortResult<i64>;

    // --- notifications ---
    async fn insert_notification(&self, notification: NewNotification) -> PortResult<Notification>;

    async fn list_notifications(&self, limit: i64) -> PortResult<Vec<Notification>>;
}

//=========================================================================================
// Object Storage
//=========================================================================================

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, bucket: &str, path: &str, data: Bytes) -> PortResult<()>;

    /// The URL under which an uploaded object is publicly readable.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn remove(&self, bucket: &str, paths: &[String]) -> PortResult<()>;
}

//! crates/warga_core/src/domain.rs
//!
//! Defines the pure, core data structures for the portal.
//! These structs are independent of any database or transport; serde derives
//! are only present on the types that travel over the wire as-is.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Roles and Capabilities
//=========================================================================================

/// The only authorization signal a profile carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Something a caller may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ResidentArea,
    AdminArea,
    ManageResidents,
    ManageActivities,
    ManageServiceRequests,
    ManageDues,
    ChangeRoles,
}

impl Role {
    /// Whether this role carries the given capability.
    pub fn grants(self, capability: Capability) -> bool {
        match self {
            Role::Admin => true,
            Role::User => matches!(capability, Capability::ResidentArea),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored enum value has an unknown string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

//=========================================================================================
// Identity and Sessions
//=========================================================================================

/// A signed-in browser context, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id,
            email: self.email.clone(),
        }
    }
}

/// An account known to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}

/// Extra data stored alongside a new identity-provider account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignUpMetadata {
    pub full_name: String,
    pub house_number: String,
}

//=========================================================================================
// Profiles
//=========================================================================================

/// A validated national identity number: exactly 16 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nik(String);

impl Nik {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        (raw.len() == 16 && raw.bytes().all(|b| b.is_ascii_digit())).then(|| Nik(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// A resident record, keyed 1:1 with an identity-provider user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub house_number: String,
    pub nik: String,
    pub phone: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: Uuid,
    pub full_name: String,
    pub house_number: String,
    pub nik: Nik,
    pub phone: String,
    pub role: Role,
}

/// A partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub full_name: Option<String>,
    pub house_number: Option<String>,
    pub nik: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self == &ProfilePatch::default()
    }

    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(v) = &self.full_name {
            profile.full_name = v.clone();
        }
        if let Some(v) = &self.house_number {
            profile.house_number = v.clone();
        }
        if let Some(v) = &self.nik {
            profile.nik = v.clone();
        }
        if let Some(v) = &self.phone {
            profile.phone = v.clone();
        }
        if let Some(v) = self.role {
            profile.role = v;
        }
    }
}

/// The slice of a profile embedded into joined rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentSummary {
    pub full_name: String,
    pub house_number: String,
}

impl From<&Profile> for ResidentSummary {
    fn from(p: &Profile) -> Self {
        Self {
            full_name: p.full_name.clone(),
            house_number: p.house_number.clone(),
        }
    }
}

//=========================================================================================
// IPL Invoices
//=========================================================================================

/// A billing month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    month: u32,
    year: i32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> Option<Self> {
        ((1..=12).contains(&month) && year > 0).then_some(Self { month, year })
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    BelumBayar,
    Lunas,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::BelumBayar => "belum_bayar",
            InvoiceStatus::Lunas => "lunas",
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "belum_bayar" => Ok(InvoiceStatus::BelumBayar),
            "lunas" => Ok(InvoiceStatus::Lunas),
            other => Err(UnknownVariant {
                kind: "invoice status",
                value: other.to_string(),
            }),
        }
    }
}

/// One month of IPL dues for one resident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub month: u32,
    pub year: i32,
    pub amount: i64,
    pub status: InvoiceStatus,
    pub paid_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn period(&self) -> Option<Period> {
        Period::new(self.month, self.year)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub user_id: Uuid,
    pub period: Period,
    pub amount: i64,
    pub status: InvoiceStatus,
    pub paid_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceFilter {
    pub month: Option<u32>,
    pub year: Option<i32>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.month.map_or(true, |m| invoice.month == m) && self.year.map_or(true, |y| invoice.year == y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceWithResident {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub resident: Option<ResidentSummary>,
}

//=========================================================================================
// Service Requests (layanan warga)
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Administrasi,
    Surat,
    Pengaduan,
    Saran,
}

impl ServiceCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceCategory::Administrasi => "administrasi",
            ServiceCategory::Surat => "surat",
            ServiceCategory::Pengaduan => "pengaduan",
            ServiceCategory::Saran => "saran",
        }
    }

    /// Human-readable label shown to residents and admins.
    pub fn label(self) -> &'static str {
        match self {
            ServiceCategory::Administrasi => "Administrasi Umum",
            ServiceCategory::Surat => "Pengajuan Surat",
            ServiceCategory::Pengaduan => "Pengaduan / Laporan",
            ServiceCategory::Saran => "Saran & Masukan",
        }
    }
}

impl FromStr for ServiceCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "administrasi" => Ok(ServiceCategory::Administrasi),
            "surat" => Ok(ServiceCategory::Surat),
            "pengaduan" => Ok(ServiceCategory::Pengaduan),
            "saran" => Ok(ServiceCategory::Saran),
            other => Err(UnknownVariant {
                kind: "service category",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    #[default]
    Menunggu,
    Diproses,
    Selesai,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Menunggu => "menunggu",
            ServiceStatus::Diproses => "diproses",
            ServiceStatus::Selesai => "selesai",
        }
    }
}

impl FromStr for ServiceStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "menunggu" => Ok(ServiceStatus::Menunggu),
            "diproses" => Ok(ServiceStatus::Diproses),
            "selesai" => Ok(ServiceStatus::Selesai),
            other => Err(UnknownVariant {
                kind: "service status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: String,
    pub category: ServiceCategory,
    pub status: ServiceStatus,
    pub title: String,
    pub description: String,
    pub admin_response: Option<String>,
    pub attachment_url: Option<String>,
    pub form_data: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewServiceRequest {
    pub user_id: Option<Uuid>,
    pub email: String,
    pub category: ServiceCategory,
    pub status: ServiceStatus,
    pub title: String,
    pub description: String,
    pub attachment_url: Option<String>,
    pub form_data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequestFilter {
    pub category: Option<ServiceCategory>,
    pub status: Option<ServiceStatus>,
}

impl ServiceRequestFilter {
    pub fn matches(&self, request: &ServiceRequest) -> bool {
        self.category.map_or(true, |c| request.category == c)
            && self.status.map_or(true, |s| request.status == s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequestWithResident {
    #[serde(flatten)]
    pub request: ServiceRequest,
    pub resident: Option<ResidentSummary>,
}

//=========================================================================================
// Activities (kegiatan), Notifications, Stats
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInput {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub location: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub kind: String,
    pub message: String,
}

/// Headline numbers on the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_citizens: i64,
    pub total_activities: i64,
    pub pending_services: i64,
    pub total_ipl_paid: i64,
}

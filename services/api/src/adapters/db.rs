//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `warga_core` crate. It handles all
//! interactions with the PostgreSQL tables using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use warga_core::domain::{
    Activity, ActivityInput, Invoice, InvoiceFilter, InvoiceStatus, InvoiceWithResident,
    NewInvoice, NewNotification, NewProfile, NewServiceRequest, Notification, Profile,
    ProfilePatch, ResidentSummary, Role, ServiceCategory, ServiceRequest, ServiceRequestFilter,
    ServiceRequestWithResident, ServiceStatus,
};
use warga_core::ports::{DatabaseService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// Translates a `sqlx` failure into a port error, keeping not-found and
/// unique-violation cases distinguishable.
fn db_error(e: sqlx::Error, what: impl FnOnce() -> String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} not found", what())),
        sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23505") => {
            PortError::Conflict(format!("{} already exists", what()))
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

fn parse_column<T: std::str::FromStr>(value: &str) -> PortResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| PortError::Unexpected(format!("Corrupt column value: {e}")))
}

fn month_from_column(month: i32) -> PortResult<u32> {
    u32::try_from(month).map_err(|_| PortError::Unexpected(format!("Corrupt month value: {month}")))
}

fn resident_summary(full_name: Option<String>, house_number: Option<String>) -> Option<ResidentSummary> {
    Some(ResidentSummary {
        full_name: full_name?,
        house_number: house_number.unwrap_or_default(),
    })
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProfileRecord {
    id: Uuid,
    full_name: String,
    house_number: String,
    nik: String,
    phone: String,
    role: String,
    created_at: DateTime<Utc>,
}
impl ProfileRecord {
    fn to_domain(self) -> PortResult<Profile> {
        Ok(Profile {
            id: self.id,
            full_name: self.full_name,
            house_number: self.house_number,
            nik: self.nik,
            phone: self.phone,
            role: parse_column::<Role>(&self.role)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct InvoiceRecord {
    id: Uuid,
    user_id: Uuid,
    month: i32,
    year: i32,
    amount: i64,
    status: String,
    paid_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}
impl InvoiceRecord {
    fn to_domain(self) -> PortResult<Invoice> {
        Ok(Invoice {
            id: self.id,
            user_id: self.user_id,
            month: month_from_column(self.month)?,
            year: self.year,
            amount: self.amount,
            status: parse_column::<InvoiceStatus>(&self.status)?,
            paid_date: self.paid_date,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct InvoiceJoinRecord {
    #[sqlx(flatten)]
    invoice: InvoiceRecord,
    resident_full_name: Option<String>,
    resident_house_number: Option<String>,
}
impl InvoiceJoinRecord {
    fn to_domain(self) -> PortResult<InvoiceWithResident> {
        Ok(InvoiceWithResident {
            invoice: self.invoice.to_domain()?,
            resident: resident_summary(self.resident_full_name, self.resident_house_number),
        })
    }
}

#[derive(FromRow)]
struct ServiceRequestRecord {
    id: Uuid,
    user_id: Option<Uuid>,
    email: String,
    category: String,
    status: String,
    title: String,
    description: String,
    admin_response: Option<String>,
    attachment_url: Option<String>,
    form_data: Json<Value>,
    created_at: DateTime<Utc>,
}
impl ServiceRequestRecord {
    fn to_domain(self) -> PortResult<ServiceRequest> {
        let form_data = match self.form_data.0 {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(ServiceRequest {
            id: self.id,
            user_id: self.user_id,
            email: self.email,
            category: parse_column::<ServiceCategory>(&self.category)?,
            status: parse_column::<ServiceStatus>(&self.status)?,
            title: self.title,
            description: self.description,
            admin_response: self.admin_response,
            attachment_url: self.attachment_url,
            form_data,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ServiceRequestJoinRecord {
    #[sqlx(flatten)]
    request: ServiceRequestRecord,
    resident_full_name: Option<String>,
    resident_house_number: Option<String>,
}
impl ServiceRequestJoinRecord {
    fn to_domain(self) -> PortResult<ServiceRequestWithResident> {
        Ok(ServiceRequestWithResident {
            request: self.request.to_domain()?,
            resident: resident_summary(self.resident_full_name, self.resident_house_number),
        })
    }
}

#[derive(FromRow)]
struct ActivityRecord {
    id: Uuid,
    title: String,
    description: String,
    date: DateTime<Utc>,
    location: String,
    images: Vec<String>,
    created_at: DateTime<Utc>,
}
impl ActivityRecord {
    fn to_domain(self) -> Activity {
        Activity {
            id: self.id,
            title: self.title,
            description: self.description,
            date: self.date,
            location: self.location,
            images: self.images,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct NotificationRecord {
    id: Uuid,
    kind: String,
    message: String,
    created_at: DateTime<Utc>,
}
impl NotificationRecord {
    fn to_domain(self) -> Notification {
        Notification {
            id: self.id,
            kind: self.kind,
            message: self.message,
            created_at: self.created_at,
        }
    }
}

const PROFILE_COLUMNS: &str = "id, full_name, house_number, nik, phone, role, created_at";
const INVOICE_COLUMNS: &str = "id, user_id, month, year, amount, status, paid_date, created_at";
const REQUEST_COLUMNS: &str = "id, user_id, email, category, status, title, description, \
     admin_response, attachment_url, form_data, created_at";
const ACTIVITY_COLUMNS: &str = "id, title, description, date, location, images, created_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for PgDatabase {
    // --- profiles ---

    async fn list_profiles(&self) -> PortResult<Vec<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY full_name ASC");
        sqlx::query_as::<_, ProfileRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into_iter()
            .map(ProfileRecord::to_domain)
            .collect()
    }

    async fn get_profile(&self, user_id: Uuid) -> PortResult<Option<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
        sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .map(ProfileRecord::to_domain)
            .transpose()
    }

    async fn insert_profile(&self, profile: NewProfile) -> PortResult<Profile> {
        let sql = format!(
            "INSERT INTO profiles (id, full_name, house_number, nik, phone, role) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {PROFILE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(profile.id)
            .bind(&profile.full_name)
            .bind(&profile.house_number)
            .bind(profile.nik.as_str())
            .bind(&profile.phone)
            .bind(profile.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, || format!("Profile {}", profile.id)))?;
        record.to_domain()
    }

    async fn update_profile(&self, user_id: Uuid, patch: &ProfilePatch) -> PortResult<Profile> {
        let sql = format!(
            "UPDATE profiles SET \
                 full_name = COALESCE($2, full_name), \
                 house_number = COALESCE($3, house_number), \
                 nik = COALESCE($4, nik), \
                 phone = COALESCE($5, phone), \
                 role = COALESCE($6, role) \
             WHERE id = $1 RETURNING {PROFILE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(user_id)
            .bind(patch.full_name.as_deref())
            .bind(patch.house_number.as_deref())
            .bind(patch.nik.as_deref())
            .bind(patch.phone.as_deref())
            .bind(patch.role.map(Role::as_str))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, || format!("Profile {}", user_id)))?;
        record.to_domain()
    }

    async fn delete_profile(&self, user_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Profile {} not found", user_id)));
        }
        Ok(())
    }

    async fn count_profiles(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    // --- ipl_payments ---

    async fn list_invoices(&self, filter: InvoiceFilter) -> PortResult<Vec<InvoiceWithResident>> {
        let month = filter.month.map(|m| m as i32);
        sqlx::query_as::<_, InvoiceJoinRecord>(
            "SELECT i.id, i.user_id, i.month, i.year, i.amount, i.status, i.paid_date, i.created_at, \
                    p.full_name AS resident_full_name, p.house_number AS resident_house_number \
             FROM ipl_payments i \
             LEFT JOIN profiles p ON p.id = i.user_id \
             WHERE ($1::INTEGER IS NULL OR i.month = $1) \
               AND ($2::INTEGER IS NULL OR i.year = $2) \
             ORDER BY i.year DESC, i.month DESC, i.created_at DESC",
        )
        .bind(month)
        .bind(filter.year)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into_iter()
        .map(InvoiceJoinRecord::to_domain)
        .collect()
    }

    async fn list_invoices_for_user(&self, user_id: Uuid) -> PortResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM ipl_payments WHERE user_id = $1 \
             ORDER BY year DESC, month DESC"
        );
        sqlx::query_as::<_, InvoiceRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into_iter()
            .map(InvoiceRecord::to_domain)
            .collect()
    }

    async fn insert_invoices(&self, rows: Vec<NewInvoice>) -> PortResult<Vec<Invoice>> {
        let sql = format!(
            "INSERT INTO ipl_payments (id, user_id, month, year, amount, status, paid_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {INVOICE_COLUMNS}"
        );
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let mut created = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = sqlx::query_as::<_, InvoiceRecord>(&sql)
                .bind(Uuid::new_v4())
                .bind(row.user_id)
                .bind(row.period.month() as i32)
                .bind(row.period.year())
                .bind(row.amount)
                .bind(row.status.as_str())
                .bind(row.paid_date)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    db_error(e, || {
                        format!(
                            "Invoice for {} in {}/{}",
                            row.user_id,
                            row.period.month(),
                            row.period.year()
                        )
                    })
                })?;
            created.push(record.to_domain()?);
        }

        // Dropping `tx` on an early return above rolls the whole batch back.
        tx.commit()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(created)
    }

    async fn update_invoice_status(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
        paid_date: Option<DateTime<Utc>>,
    ) -> PortResult<Invoice> {
        let sql = format!(
            "UPDATE ipl_payments SET status = $2, paid_date = $3 WHERE id = $1 \
             RETURNING {INVOICE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, InvoiceRecord>(&sql)
            .bind(invoice_id)
            .bind(status.as_str())
            .bind(paid_date)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, || format!("Invoice {}", invoice_id)))?;
        record.to_domain()
    }

    async fn sum_paid_invoices(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM ipl_payments WHERE status = 'lunas'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    // --- layanan_warga ---

    async fn insert_service_request(&self, request: NewServiceRequest) -> PortResult<ServiceRequest> {
        let sql = format!(
            "INSERT INTO layanan_warga \
                 (id, user_id, email, category, status, title, description, attachment_url, form_data) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {REQUEST_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ServiceRequestRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(request.user_id)
            .bind(&request.email)
            .bind(request.category.as_str())
            .bind(request.status.as_str())
            .bind(&request.title)
            .bind(&request.description)
            .bind(request.attachment_url.as_deref())
            .bind(Json(Value::Object(request.form_data)))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        record.to_domain()
    }

    async fn list_service_requests(
        &self,
        filter: ServiceRequestFilter,
    ) -> PortResult<Vec<ServiceRequestWithResident>> {
        sqlx::query_as::<_, ServiceRequestJoinRecord>(
            "SELECT l.id, l.user_id, l.email, l.category, l.status, l.title, l.description, \
                    l.admin_response, l.attachment_url, l.form_data, l.created_at, \
                    p.full_name AS resident_full_name, p.house_number AS resident_house_number \
             FROM layanan_warga l \
             LEFT JOIN profiles p ON p.id = l.user_id \
             WHERE ($1::TEXT IS NULL OR l.category = $1) \
               AND ($2::TEXT IS NULL OR l.status = $2) \
             ORDER BY l.created_at DESC",
        )
        .bind(filter.category.map(ServiceCategory::as_str))
        .bind(filter.status.map(ServiceStatus::as_str))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into_iter()
        .map(ServiceRequestJoinRecord::to_domain)
        .collect()
    }

    async fn update_service_request(
        &self,
        request_id: Uuid,
        status: ServiceStatus,
        admin_response: Option<&str>,
    ) -> PortResult<ServiceRequest> {
        let sql = format!(
            "UPDATE layanan_warga SET status = $2, admin_response = COALESCE($3, admin_response) \
             WHERE id = $1 RETURNING {REQUEST_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ServiceRequestRecord>(&sql)
            .bind(request_id)
            .bind(status.as_str())
            .bind(admin_response)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, || format!("Service request {}", request_id)))?;
        record.to_domain()
    }

    async fn count_service_requests(&self, status: Option<ServiceStatus>) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM layanan_warga WHERE ($1::TEXT IS NULL OR status = $1)",
        )
        .bind(status.map(ServiceStatus::as_str))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    // --- kegiatan ---

    async fn list_activities(&self) -> PortResult<Vec<Activity>> {
        let sql = format!("SELECT {ACTIVITY_COLUMNS} FROM kegiatan ORDER BY date DESC");
        let records = sqlx::query_as::<_, ActivityRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(records.into_iter().map(ActivityRecord::to_domain).collect())
    }

    async fn get_activity(&self, activity_id: Uuid) -> PortResult<Activity> {
        let sql = format!("SELECT {ACTIVITY_COLUMNS} FROM kegiatan WHERE id = $1");
        let record = sqlx::query_as::<_, ActivityRecord>(&sql)
            .bind(activity_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, || format!("Activity {}", activity_id)))?;
        Ok(record.to_domain())
    }

    async fn create_activity(&self, input: &ActivityInput) -> PortResult<Activity> {
        let sql = format!(
            "INSERT INTO kegiatan (id, title, description, date, location, images) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {ACTIVITY_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ActivityRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.date)
            .bind(&input.location)
            .bind(&input.images)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.to_domain())
    }

    async fn update_activity(&self, activity_id: Uuid, input: &ActivityInput) -> PortResult<Activity> {
        let sql = format!(
            "UPDATE kegiatan SET title = $2, description = $3, date = $4, location = $5, images = $6 \
             WHERE id = $1 RETURNING {ACTIVITY_COLUMNS}"
        );
        let record = sqlx::query_as::<_, ActivityRecord>(&sql)
            .bind(activity_id)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.date)
            .bind(&input.location)
            .bind(&input.images)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, || format!("Activity {}", activity_id)))?;
        Ok(record.to_domain())
    }

    async fn delete_activity(&self, activity_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM kegiatan WHERE id = $1")
            .bind(activity_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Activity {} not found", activity_id)));
        }
        Ok(())
    }

    async fn count_activities(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM kegiatan")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    // --- notifications ---

    async fn insert_notification(&self, notification: NewNotification) -> PortResult<Notification> {
        let record = sqlx::query_as::<_, NotificationRecord>(
            "INSERT INTO notifications (id, kind, message) VALUES ($1, $2, $3) \
             RETURNING id, kind, message, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&notification.kind)
        .bind(&notification.message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.to_domain())
    }

    async fn list_notifications(&self, limit: i64) -> PortResult<Vec<Notification>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            "SELECT id, kind, message, created_at FROM notifications \
             ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(records.into_iter().map(NotificationRecord::to_domain).collect())
    }
}

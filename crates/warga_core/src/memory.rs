//! crates/warga_core/src/memory.rs
//!
//! In-process implementations of every port. They back the unit and
//! integration tests and can run the portal without a database. Each adapter
//! can be told to fail selected operations, to exercise the error paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{
    Activity, ActivityInput, Identity, Invoice, InvoiceFilter, InvoiceStatus, InvoiceWithResident,
    NewInvoice, NewNotification, NewProfile, NewServiceRequest, Notification, Profile,
    ProfilePatch, ResidentSummary, Role, ServiceRequest, ServiceRequestFilter,
    ServiceRequestWithResident, ServiceStatus, Session, SignUpMetadata,
};
use crate::ports::{
    AuthEvent, DatabaseService, IdentityProvider, ObjectStorage, PortError, PortResult,
};

//=========================================================================================
// Failure Injection
//=========================================================================================

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    GetProfile,
    ListProfiles,
    InsertProfile,
    InsertInvoices,
    InsertServiceRequest,
    InsertNotification,
    CreateActivity,
    UpdateActivity,
    SignUp,
    DeleteIdentity,
    Upload,
    Remove,
}

#[derive(Debug, Default)]
struct Failures(Mutex<HashMap<FailPoint, usize>>);

impl Failures {
    fn arm(&self, point: FailPoint, times: usize) {
        lock(&self.0).insert(point, times);
    }

    fn check(&self, point: FailPoint) -> PortResult<()> {
        let mut armed = lock(&self.0);
        match armed.get_mut(&point) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(PortError::Unexpected(format!("injected failure at {point:?}")))
            }
            _ => Ok(()),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock cannot leave the tables half-written,
    // so a poisoned lock is still safe to use.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

//=========================================================================================
// Tables
//=========================================================================================

#[derive(Debug, Default)]
struct Tables {
    profiles: BTreeMap<Uuid, Profile>,
    invoices: Vec<Invoice>,
    service_requests: Vec<ServiceRequest>,
    activities: Vec<Activity>,
    notifications: Vec<Notification>,
}

impl Tables {
    fn summary(&self, user_id: Option<Uuid>) -> Option<ResidentSummary> {
        user_id
            .and_then(|id| self.profiles.get(&id))
            .map(ResidentSummary::from)
    }
}

/// Table store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: Mutex<Tables>,
    failures: Failures,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` calls of `point` fail.
    pub fn fail(&self, point: FailPoint, times: usize) {
        self.failures.arm(point, times);
    }

    /// Inserts a profile directly, bypassing registration.
    pub fn seed_profile(&self, full_name: &str, house_number: &str, role: Role) -> Profile {
        let profile = Profile {
            id: Uuid::new_v4(),
            full_name: full_name.to_string(),
            house_number: house_number.to_string(),
            nik: "3201000000000000".to_string(),
            phone: "08123456789".to_string(),
            role,
            created_at: Utc::now(),
        };
        lock(&self.tables)
            .profiles
            .insert(profile.id, profile.clone());
        profile
    }

    pub fn invoice_count(&self) -> usize {
        lock(&self.tables).invoices.len()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.tables).notifications.clone()
    }
}

fn sort_invoices_newest_period_first(invoices: &mut [Invoice]) {
    invoices.sort_by(|a, b| b.year.cmp(&a.year).then(b.month.cmp(&a.month)));
}

#[async_trait]
impl DatabaseService for MemoryDatabase {
    async fn list_profiles(&self) -> PortResult<Vec<Profile>> {
        self.failures.check(FailPoint::ListProfiles)?;
        let mut profiles: Vec<Profile> = lock(&self.tables).profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(profiles)
    }

    async fn get_profile(&self, user_id: Uuid) -> PortResult<Option<Profile>> {
        self.failures.check(FailPoint::GetProfile)?;
        Ok(lock(&self.tables).profiles.get(&user_id).cloned())
    }

    async fn insert_profile(&self, profile: NewProfile) -> PortResult<Profile> {
        self.failures.check(FailPoint::InsertProfile)?;
        let mut tables = lock(&self.tables);
        if tables.profiles.contains_key(&profile.id) {
            return Err(PortError::Conflict(format!("Profile {} already exists", profile.id)));
        }
        let row = Profile {
            id: profile.id,
            full_name: profile.full_name,
            house_number: profile.house_number,
            nik: profile.nik.into_inner(),
            phone: profile.phone,
            role: profile.role,
            created_at: Utc::now(),
        };
        tables.profiles.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_profile(&self, user_id: Uuid, patch: &ProfilePatch) -> PortResult<Profile> {
        let mut tables = lock(&self.tables);
        let profile = tables
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("Profile {user_id} not found")))?;
        patch.apply_to(profile);
        Ok(profile.clone())
    }

    async fn delete_profile(&self, user_id: Uuid) -> PortResult<()> {
        lock(&self.tables)
            .profiles
            .remove(&user_id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("Profile {user_id} not found")))
    }

    async fn count_profiles(&self) -> PortResult<i64> {
        Ok(lock(&self.tables).profiles.len() as i64)
    }

    async fn list_invoices(&self, filter: InvoiceFilter) -> PortResult<Vec<InvoiceWithResident>> {
        let tables = lock(&self.tables);
        let mut invoices: Vec<Invoice> = tables
            .invoices
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        sort_invoices_newest_period_first(&mut invoices);
        Ok(invoices
            .into_iter()
            .map(|invoice| InvoiceWithResident {
                resident: tables.summary(Some(invoice.user_id)),
                invoice,
            })
            .collect())
    }

    async fn list_invoices_for_user(&self, user_id: Uuid) -> PortResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = lock(&self.tables)
            .invoices
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        sort_invoices_newest_period_first(&mut invoices);
        Ok(invoices)
    }

    async fn insert_invoices(&self, rows: Vec<NewInvoice>) -> PortResult<Vec<Invoice>> {
        self.failures.check(FailPoint::InsertInvoices)?;
        let mut tables = lock(&self.tables);

        // Validate the whole batch before touching the table.
        for (idx, row) in rows.iter().enumerate() {
            let key = (row.user_id, row.period.month(), row.period.year());
            let clash_existing = tables
                .invoices
                .iter()
                .any(|i| (i.user_id, i.month, i.year) == key);
            let clash_batch = rows[..idx]
                .iter()
                .any(|r| (r.user_id, r.period.month(), r.period.year()) == key);
            if clash_existing || clash_batch {
                return Err(PortError::Conflict(format!(
                    "Invoice for user {} in {}/{} already exists",
                    row.user_id,
                    row.period.month(),
                    row.period.year()
                )));
            }
        }

        let now = Utc::now();
        let inserted: Vec<Invoice> = rows
            .into_iter()
            .map(|row| Invoice {
                id: Uuid::new_v4(),
                user_id: row.user_id,
                month: row.period.month(),
                year: row.period.year(),
                amount: row.amount,
                status: row.status,
                paid_date: row.paid_date,
                created_at: now,
            })
            .collect();
        tables.invoices.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn update_invoice_status(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
        paid_date: Option<DateTime<Utc>>,
    ) -> PortResult<Invoice> {
        let mut tables = lock(&self.tables);
        let invoice = tables
            .invoices
            .iter_mut()
            .find(|i| i.id == invoice_id)
            .ok_or_else(|| PortError::NotFound(format!("Invoice {invoice_id} not found")))?;
        invoice.status = status;
        invoice.paid_date = paid_date;
        Ok(invoice.clone())
    }

    async fn sum_paid_invoices(&self) -> PortResult<i64> {
        Ok(lock(&self.tables)
            .invoices
            .iter()
            .filter(|i| i.status == InvoiceStatus::Lunas)
            .map(|i| i.amount)
            .sum())
    }

    async fn insert_service_request(&self, request: NewServiceRequest) -> PortResult<ServiceRequest> {
        self.failures.check(FailPoint::InsertServiceRequest)?;
        let row = ServiceRequest {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            email: request.email,
            category: request.category,
            status: request.status,
            title: request.title,
            description: request.description,
            admin_response: None,
            attachment_url: request.attachment_url,
            form_data: request.form_data,
            created_at: Utc::now(),
        };
        lock(&self.tables).service_requests.push(row.clone());
        Ok(row)
    }

    async fn list_service_requests(
        &self,
        filter: ServiceRequestFilter,
    ) -> PortResult<Vec<ServiceRequestWithResident>> {
        let tables = lock(&self.tables);
        let mut rows: Vec<ServiceRequest> = tables
            .service_requests
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .map(|request| ServiceRequestWithResident {
                resident: tables.summary(request.user_id),
                request,
            })
            .collect())
    }

    async fn update_service_request(
        &self,
        request_id: Uuid,
        status: ServiceStatus,
        admin_response: Option<&str>,
    ) -> PortResult<ServiceRequest> {
        let mut tables = lock(&self.tables);
        let row = tables
            .service_requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or_else(|| PortError::NotFound(format!("Service request {request_id} not found")))?;
        row.status = status;
        if let Some(response) = admin_response {
            row.admin_response = Some(response.to_string());
        }
        Ok(row.clone())
    }

    async fn count_service_requests(&self, status: Option<ServiceStatus>) -> PortResult<i64> {
        Ok(lock(&self.tables)
            .service_requests
            .iter()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .count() as i64)
    }

    async fn list_activities(&self) -> PortResult<Vec<Activity>> {
        let mut rows = lock(&self.tables).activities.clone();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }

    async fn get_activity(&self, activity_id: Uuid) -> PortResult<Activity> {
        lock(&self.tables)
            .activities
            .iter()
            .find(|a| a.id == activity_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Activity {activity_id} not found")))
    }

    async fn create_activity(&self, input: &ActivityInput) -> PortResult<Activity> {
        self.failures.check(FailPoint::CreateActivity)?;
        let row = Activity {
            id: Uuid::new_v4(),
            title: input.title.clone(),
            description: input.description.clone(),
            date: input.date,
            location: input.location.clone(),
            images: input.images.clone(),
            created_at: Utc::now(),
        };
        lock(&self.tables).activities.push(row.clone());
        Ok(row)
    }

    async fn update_activity(&self, activity_id: Uuid, input: &ActivityInput) -> PortResult<Activity> {
        self.failures.check(FailPoint::UpdateActivity)?;
        let mut tables = lock(&self.tables);
        let row = tables
            .activities
            .iter_mut()
            .find(|a| a.id == activity_id)
            .ok_or_else(|| PortError::NotFound(format!("Activity {activity_id} not found")))?;
        row.title = input.title.clone();
        row.description = input.description.clone();
        row.date = input.date;
        row.location = input.location.clone();
        row.images = input.images.clone();
        Ok(row.clone())
    }

    async fn delete_activity(&self, activity_id: Uuid) -> PortResult<()> {
        let mut tables = lock(&self.tables);
        let before = tables.activities.len();
        tables.activities.retain(|a| a.id != activity_id);
        if tables.activities.len() == before {
            return Err(PortError::NotFound(format!("Activity {activity_id} not found")));
        }
        Ok(())
    }

    async fn count_activities(&self) -> PortResult<i64> {
        Ok(lock(&self.tables).activities.len() as i64)
    }

    async fn insert_notification(&self, notification: NewNotification) -> PortResult<Notification> {
        self.failures.check(FailPoint::InsertNotification)?;
        let row = Notification {
            id: Uuid::new_v4(),
            kind: notification.kind,
            message: notification.message,
            created_at: Utc::now(),
        };
        lock(&self.tables).notifications.push(row.clone());
        Ok(row)
    }

    async fn list_notifications(&self, limit: i64) -> PortResult<Vec<Notification>> {
        let mut rows = lock(&self.tables).notifications.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }
}

//=========================================================================================
// Identity Provider
//=========================================================================================

#[derive(Debug)]
struct Account {
    identity: Identity,
    // Plain text is acceptable here: this provider never leaves the process.
    password: String,
}

#[derive(Debug, Default)]
struct IdentityTables {
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, Session>,
    reset_requests: Vec<(String, String)>,
}

/// Identity provider kept in memory.
#[derive(Debug)]
pub struct MemoryIdentityProvider {
    tables: Mutex<IdentityTables>,
    events: broadcast::Sender<AuthEvent>,
    session_ttl: Duration,
    failures: Failures,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new(Duration::days(30))
    }
}

impl MemoryIdentityProvider {
    pub fn new(session_ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            tables: Mutex::new(IdentityTables::default()),
            events,
            session_ttl,
            failures: Failures::default(),
        }
    }

    pub fn fail(&self, point: FailPoint, times: usize) {
        self.failures.arm(point, times);
    }

    /// Creates an account directly and returns its identity.
    pub fn seed_account(&self, email: &str, password: &str) -> Identity {
        let identity = Identity {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
        };
        lock(&self.tables).accounts.insert(
            email.to_string(),
            Account {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        identity
    }

    /// Creates an account with a fixed user id, e.g. to match a seeded profile.
    pub fn seed_account_with_id(&self, user_id: Uuid, email: &str, password: &str) -> Identity {
        let identity = Identity {
            user_id,
            email: email.to_string(),
        };
        lock(&self.tables).accounts.insert(
            email.to_string(),
            Account {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        identity
    }

    pub fn has_account(&self, email: &str) -> bool {
        lock(&self.tables).accounts.contains_key(email)
    }

    pub fn reset_requests(&self) -> Vec<(String, String)> {
        lock(&self.tables).reset_requests.clone()
    }

    /// Ages a session past its expiry.
    pub fn expire_session(&self, token: &str) {
        if let Some(session) = lock(&self.tables).sessions.get_mut(token) {
            session.expires_at = Utc::now() - Duration::seconds(1);
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> PortResult<Session> {
        let session = {
            let mut tables = lock(&self.tables);
            let account = tables
                .accounts
                .get(email)
                .filter(|a| a.password == password)
                .ok_or(PortError::InvalidCredentials)?;
            let session = Session {
                user_id: account.identity.user_id,
                email: account.identity.email.clone(),
                token: Uuid::new_v4().to_string(),
                expires_at: Utc::now() + self.session_ttl,
            };
            tables.sessions.insert(session.token.clone(), session.clone());
            session
        };
        // Nobody listening is fine.
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _metadata: &SignUpMetadata,
    ) -> PortResult<Identity> {
        self.failures.check(FailPoint::SignUp)?;
        if lock(&self.tables).accounts.contains_key(email) {
            return Err(PortError::Conflict("User already registered".to_string()));
        }
        Ok(self.seed_account(email, password))
    }

    async fn sign_out(&self, token: &str) -> PortResult<()> {
        lock(&self.tables).sessions.remove(token);
        let _ = self.events.send(AuthEvent::SignedOut {
            token: token.to_string(),
        });
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_url: &str) -> PortResult<()> {
        lock(&self.tables)
            .reset_requests
            .push((email.to_string(), redirect_url.to_string()));
        Ok(())
    }

    async fn get_session(&self, token: &str) -> PortResult<Option<Session>> {
        let now = Utc::now();
        Ok(lock(&self.tables)
            .sessions
            .get(token)
            .filter(|s| !s.is_expired(now))
            .cloned())
    }

    async fn delete_identity(&self, user_id: Uuid) -> PortResult<()> {
        self.failures.check(FailPoint::DeleteIdentity)?;
        let mut tables = lock(&self.tables);
        tables.accounts.retain(|_, a| a.identity.user_id != user_id);
        tables.sessions.retain(|_, s| s.user_id != user_id);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

//=========================================================================================
// Object Storage
//=========================================================================================

/// Object storage kept in memory.
#[derive(Debug, Default)]
pub struct MemoryObjectStorage {
    objects: Mutex<HashMap<(String, String), Bytes>>,
    failures: Failures,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, point: FailPoint, times: usize) {
        self.failures.arm(point, times);
    }

    pub fn contains(&self, bucket: &str, path: &str) -> bool {
        lock(&self.objects).contains_key(&(bucket.to_string(), path.to_string()))
    }

    pub fn object_count(&self) -> usize {
        lock(&self.objects).len()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(&self, bucket: &str, path: &str, data: Bytes) -> PortResult<()> {
        self.failures.check(FailPoint::Upload)?;
        let key = (bucket.to_string(), path.to_string());
        let mut objects = lock(&self.objects);
        if objects.contains_key(&key) {
            return Err(PortError::Conflict(format!("Object {bucket}/{path} already exists")));
        }
        objects.insert(key, data);
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> PortResult<()> {
        self.failures.check(FailPoint::Remove)?;
        let mut objects = lock(&self.objects);
        for path in paths {
            objects.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }
}

//=========================================================================================
// Bundle
//=========================================================================================

/// The three in-memory adapters, wired together.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    pub db: Arc<MemoryDatabase>,
    pub identity: Arc<MemoryIdentityProvider>,
    pub storage: Arc<MemoryObjectStorage>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a profile plus a matching account that can sign in.
    pub fn seed_resident(&self, email: &str, password: &str, full_name: &str, role: Role) -> Profile {
        let profile = self.db.seed_profile(full_name, "A-01", role);
        self.identity.seed_account_with_id(profile.id, email, password);
        profile
    }
}

//! crates/warga_core/src/requests.rs
//!
//! Resident service requests (layanan warga): submission, listing and the
//! admin response workflow. Any status may be set from any status.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::accounts::require;
use crate::domain::{
    Capability, Identity, NewNotification, NewServiceRequest, Notification, ServiceCategory,
    ServiceRequest, ServiceRequestFilter, ServiceRequestWithResident, ServiceStatus,
};
use crate::error::{PortalError, PortalResult};
use crate::gate::Caller;
use crate::ports::{DatabaseService, ObjectStorage};
use crate::uploads::{self, Attachment, SERVICE_UPLOADS_BUCKET};

pub const NEW_REQUEST_NOTIFICATION: &str = "layanan_new";

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRequestForm {
    pub category: ServiceCategory,
    pub title: String,
    pub description: String,
    /// Defaults to `menunggu` when omitted.
    #[serde(default)]
    pub status: Option<ServiceStatus>,
    #[serde(default)]
    pub jenis_surat: Option<String>,
    #[serde(default)]
    pub tujuan: Option<String>,
    #[serde(default)]
    pub lokasi_kejadian: Option<String>,
    #[serde(default)]
    pub tanggal_kejadian: Option<String>,
}

/// The category-specific fields stored next to the request.
pub fn build_form_data(form: &ServiceRequestForm) -> Map<String, Value> {
    let pick = |wanted: ServiceCategory, value: &Option<String>| -> Value {
        match value {
            Some(v) if form.category == wanted => Value::String(v.clone()),
            _ => Value::Null,
        }
    };

    let mut data = Map::new();
    data.insert("jenis_surat".into(), pick(ServiceCategory::Surat, &form.jenis_surat));
    data.insert("tujuan".into(), pick(ServiceCategory::Surat, &form.tujuan));
    data.insert(
        "lokasi_kejadian".into(),
        pick(ServiceCategory::Pengaduan, &form.lokasi_kejadian),
    );
    data.insert(
        "tanggal_kejadian".into(),
        pick(ServiceCategory::Pengaduan, &form.tanggal_kejadian),
    );
    data.insert(
        "category_label".into(),
        Value::String(form.category.label().to_string()),
    );
    data
}

#[derive(Clone)]
pub struct ServiceDesk {
    db: Arc<dyn DatabaseService>,
    storage: Arc<dyn ObjectStorage>,
}

impl ServiceDesk {
    pub fn new(db: Arc<dyn DatabaseService>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { db, storage }
    }

    /// Files a request for a resident, or for a guest when `submitter` is `None`.
    ///
    /// An attachment is uploaded first; if the request row cannot be written the
    /// upload is removed again.
    pub async fn submit(
        &self,
        submitter: Option<&Identity>,
        form: ServiceRequestForm,
        attachment: Option<Attachment>,
    ) -> PortalResult<ServiceRequest> {
        if form.title.trim().is_empty() {
            return Err(PortalError::validation("Judul wajib diisi"));
        }

        let uploaded = match attachment {
            Some(file) => Some(self.upload_attachment(submitter, file).await?),
            None => None,
        };

        let request = NewServiceRequest {
            user_id: submitter.map(|s| s.user_id),
            email: submitter.map_or_else(|| "guest".to_string(), |s| s.email.clone()),
            category: form.category,
            status: form.status.unwrap_or_default(),
            title: form.title.clone(),
            description: form.description.clone(),
            attachment_url: uploaded
                .as_ref()
                .map(|path| self.storage.public_url(SERVICE_UPLOADS_BUCKET, path)),
            form_data: build_form_data(&form),
        };

        let row = match self.db.insert_service_request(request).await {
            Ok(row) => row,
            Err(e) => {
                let paths: Vec<String> = uploaded.into_iter().collect();
                if !uploads::discard_uploads(self.storage.as_ref(), SERVICE_UPLOADS_BUCKET, &paths).await {
                    return Err(PortalError::Orphaned {
                        step: format!("Service request insert ({e})"),
                        resource: format!("attachment {}", paths.join(", ")),
                    });
                }
                return Err(e.into());
            }
        };
        info!(request_id = %row.id, category = row.category.as_str(), "Service request submitted");

        let who = submitter.map_or("Guest", |s| s.email.as_str());
        let notification = NewNotification {
            kind: NEW_REQUEST_NOTIFICATION.to_string(),
            message: format!("Layanan baru diajukan: {} ({who})", row.title),
        };
        if let Err(e) = self.db.insert_notification(notification).await {
            warn!(request_id = %row.id, error = %e, "Failed to record notification");
        }

        Ok(row)
    }

    async fn upload_attachment(
        &self,
        submitter: Option<&Identity>,
        file: Attachment,
    ) -> PortalResult<String> {
        let owner = submitter.map_or_else(|| "guest".to_string(), |s| s.user_id.to_string());
        let path = format!("layanan/{owner}/{}", uploads::unique_name(&file.file_name));
        self.storage
            .upload(SERVICE_UPLOADS_BUCKET, &path, file.data)
            .await?;
        Ok(path)
    }

    pub async fn list(
        &self,
        actor: &Caller,
        filter: ServiceRequestFilter,
    ) -> PortalResult<Vec<ServiceRequestWithResident>> {
        require(actor, Capability::ManageServiceRequests)?;
        Ok(self.db.list_service_requests(filter).await?)
    }

    /// Sets the status; a non-blank response replaces the stored one.
    pub async fn respond(
        &self,
        actor: &Caller,
        request_id: Uuid,
        status: ServiceStatus,
        admin_response: Option<&str>,
    ) -> PortalResult<ServiceRequest> {
        require(actor, Capability::ManageServiceRequests)?;
        let response = admin_response.map(str::trim).filter(|r| !r.is_empty());
        let row = self
            .db
            .update_service_request(request_id, status, response)
            .await?;
        info!(request_id = %request_id, status = status.as_str(), "Service request updated");
        Ok(row)
    }

    pub async fn recent_notifications(&self, actor: &Caller, limit: i64) -> PortalResult<Vec<Notification>> {
        require(actor, Capability::ManageServiceRequests)?;
        Ok(self.db.list_notifications(limit.clamp(1, 200)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::memory::{FailPoint, MemoryBackend};
    use crate::test_support::caller_for;
    use bytes::Bytes;

    fn form(category: ServiceCategory) -> ServiceRequestForm {
        ServiceRequestForm {
            category,
            title: "Surat pengantar".to_string(),
            description: "Untuk keperluan KTP".to_string(),
            status: None,
            jenis_surat: Some("Domisili".to_string()),
            tujuan: Some("Kelurahan".to_string()),
            lokasi_kejadian: Some("Blok C".to_string()),
            tanggal_kejadian: None,
        }
    }

    fn desk(backend: &MemoryBackend) -> ServiceDesk {
        ServiceDesk::new(backend.db.clone(), backend.storage.clone())
    }

    fn attachment() -> Attachment {
        Attachment {
            file_name: "ktp.pdf".to_string(),
            data: Bytes::from_static(b"%PDF"),
        }
    }

    #[test]
    fn form_data_keeps_only_category_fields() {
        let data = build_form_data(&form(ServiceCategory::Surat));
        assert_eq!(data["jenis_surat"], "Domisili");
        assert_eq!(data["tujuan"], "Kelurahan");
        assert_eq!(data["lokasi_kejadian"], Value::Null);
        assert_eq!(data["category_label"], "Pengajuan Surat");

        let data = build_form_data(&form(ServiceCategory::Pengaduan));
        assert_eq!(data["jenis_surat"], Value::Null);
        assert_eq!(data["lokasi_kejadian"], "Blok C");
    }

    #[tokio::test]
    async fn omitted_status_defaults_to_menunggu() {
        let backend = MemoryBackend::new();
        let row = desk(&backend)
            .submit(None, form(ServiceCategory::Saran), None)
            .await
            .unwrap();
        assert_eq!(row.status, ServiceStatus::Menunggu);
        assert_eq!(row.email, "guest");
        assert_eq!(row.user_id, None);

        let notes = backend.db.notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].message, "Layanan baru diajukan: Surat pengantar (Guest)");
    }

    #[tokio::test]
    async fn attachment_url_is_stored() {
        let backend = MemoryBackend::new();
        let who = Identity {
            user_id: Uuid::new_v4(),
            email: "budi@example.com".to_string(),
        };
        let row = desk(&backend)
            .submit(Some(&who), form(ServiceCategory::Surat), Some(attachment()))
            .await
            .unwrap();
        let url = row.attachment_url.expect("attachment url");
        assert!(url.starts_with(&format!("memory://layanan-uploads/layanan/{}/", who.user_id)));
        assert!(url.ends_with(".pdf"));
    }

    #[tokio::test]
    async fn failed_insert_removes_the_upload() {
        let backend = MemoryBackend::new();
        backend.db.fail(FailPoint::InsertServiceRequest, 1);
        let result = desk(&backend)
            .submit(None, form(ServiceCategory::Surat), Some(attachment()))
            .await;
        assert!(matches!(result, Err(PortalError::Port(_))));
        assert_eq!(backend.storage.object_count(), 0);
    }

    #[tokio::test]
    async fn failed_cleanup_reports_the_orphan() {
        let backend = MemoryBackend::new();
        backend.db.fail(FailPoint::InsertServiceRequest, 1);
        backend.storage.fail(FailPoint::Remove, 1);
        let result = desk(&backend)
            .submit(None, form(ServiceCategory::Surat), Some(attachment()))
            .await;
        assert!(matches!(result, Err(PortalError::Orphaned { .. })));
        assert_eq!(backend.storage.object_count(), 1);
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_submission() {
        let backend = MemoryBackend::new();
        backend.db.fail(FailPoint::InsertNotification, 1);
        let row = desk(&backend)
            .submit(None, form(ServiceCategory::Administrasi), None)
            .await;
        assert!(row.is_ok());
    }

    #[tokio::test]
    async fn admin_response_and_status_persist_together() {
        let backend = MemoryBackend::new();
        let admin = backend.db.seed_profile("Siti", "B-02", Role::Admin);
        let desk = desk(&backend);
        let row = desk
            .submit(None, form(ServiceCategory::Pengaduan), None)
            .await
            .unwrap();

        desk.respond(&caller_for(&admin), row.id, ServiceStatus::Selesai, Some("Sudah ditangani"))
            .await
            .unwrap();
        let listed = desk
            .list(&caller_for(&admin), ServiceRequestFilter::default())
            .await
            .unwrap();
        assert_eq!(listed[0].request.status, ServiceStatus::Selesai);
        assert_eq!(listed[0].request.admin_response.as_deref(), Some("Sudah ditangani"));

        // Blank responses keep the previous text; any transition is allowed.
        let back = desk
            .respond(&caller_for(&admin), row.id, ServiceStatus::Menunggu, Some("  "))
            .await
            .unwrap();
        assert_eq!(back.status, ServiceStatus::Menunggu);
        assert_eq!(back.admin_response.as_deref(), Some("Sudah ditangani"));
    }

    #[tokio::test]
    async fn filter_by_category_and_status() {
        let backend = MemoryBackend::new();
        let admin = backend.db.seed_profile("Siti", "B-02", Role::Admin);
        let desk = desk(&backend);
        desk.submit(None, form(ServiceCategory::Surat), None).await.unwrap();
        let complaint = desk
            .submit(None, form(ServiceCategory::Pengaduan), None)
            .await
            .unwrap();
        desk.respond(&caller_for(&admin), complaint.id, ServiceStatus::Diproses, None)
            .await
            .unwrap();

        let filter = ServiceRequestFilter {
            category: Some(ServiceCategory::Pengaduan),
            status: Some(ServiceStatus::Diproses),
        };
        let rows = desk.list(&caller_for(&admin), filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].request.id, complaint.id);
    }
}

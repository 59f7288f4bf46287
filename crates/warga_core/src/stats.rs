//! crates/warga_core/src/stats.rs
//!
//! Headline numbers for the admin dashboard.

use std::sync::Arc;

use crate::accounts::require;
use crate::domain::{Capability, DashboardStats, ServiceStatus};
use crate::error::PortalResult;
use crate::gate::Caller;
use crate::ports::DatabaseService;

/// Counts are fetched concurrently; any failure fails the whole call.
pub async fn dashboard_stats(db: &Arc<dyn DatabaseService>, actor: &Caller) -> PortalResult<DashboardStats> {
    require(actor, Capability::AdminArea)?;
    let (total_citizens, total_activities, pending_services, total_ipl_paid) = futures::try_join!(
        db.count_profiles(),
        db.count_activities(),
        db.count_service_requests(Some(ServiceStatus::Menunggu)),
        db.sum_paid_invoices(),
    )?;
    Ok(DashboardStats {
        total_citizens,
        total_activities,
        pending_services,
        total_ipl_paid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InvoiceStatus, Role, ServiceCategory};
    use crate::dues::DuesEngine;
    use crate::memory::MemoryBackend;
    use crate::requests::{ServiceDesk, ServiceRequestForm};
    use crate::test_support::caller_for;

    #[tokio::test]
    async fn counts_pending_requests_and_paid_dues() {
        let backend = MemoryBackend::new();
        let admin = caller_for(&backend.db.seed_profile("Siti", "B-02", Role::Admin));
        backend.db.seed_profile("Budi", "A-01", Role::User);

        let dues = DuesEngine::new(backend.db.clone(), backend.storage.clone());
        let batch = dues
            .create_monthly_invoices(&admin, 12, 2024, 150_000)
            .await
            .unwrap();
        dues.set_payment_status(&admin, batch.created[0].id, InvoiceStatus::Lunas)
            .await
            .unwrap();

        let desk = ServiceDesk::new(backend.db.clone(), backend.storage.clone());
        let form = ServiceRequestForm {
            category: ServiceCategory::Saran,
            title: "Lampu jalan".to_string(),
            description: "Mohon ditambah".to_string(),
            status: None,
            jenis_surat: None,
            tujuan: None,
            lokasi_kejadian: None,
            tanggal_kejadian: None,
        };
        desk.submit(None, form, None).await.unwrap();

        let db: Arc<dyn DatabaseService> = backend.db.clone();
        let stats = dashboard_stats(&db, &admin).await.unwrap();
        assert_eq!(
            stats,
            DashboardStats {
                total_citizens: 2,
                total_activities: 0,
                pending_services: 1,
                total_ipl_paid: 150_000,
            }
        );
    }

    #[tokio::test]
    async fn residents_get_no_stats() {
        let backend = MemoryBackend::new();
        let warga = caller_for(&backend.db.seed_profile("Budi", "A-01", Role::User));
        let db: Arc<dyn DatabaseService> = backend.db.clone();
        assert!(dashboard_stats(&db, &warga).await.is_err());
    }
}

//! crates/warga_core/src/dues.rs
//!
//! The IPL (monthly dues) invoice engine.
//!
//! Invoices are generated in one batch per billing month, one per resident
//! known at that moment. A resident never holds two invoices for the same
//! month: generation skips residents that are already billed, so running it
//! twice for a month is harmless.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::accounts::require;
use crate::domain::{
    Capability, Invoice, InvoiceFilter, InvoiceStatus, InvoiceWithResident, NewInvoice, Period,
    Profile,
};
use crate::error::{PortalError, PortalResult};
use crate::gate::Caller;
use crate::ports::{DatabaseService, ObjectStorage};
use crate::uploads::{self, Attachment, RECEIPTS_BUCKET};

/// Result of a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceBatch {
    pub created: Vec<Invoice>,
    /// Residents that already had an invoice for the period.
    pub skipped: Vec<Uuid>,
}

/// Builds one unpaid invoice per profile not in `already_billed`.
pub fn plan_invoices(
    profiles: &[Profile],
    already_billed: &HashSet<Uuid>,
    period: Period,
    amount: i64,
) -> (Vec<NewInvoice>, Vec<Uuid>) {
    let (billed, fresh): (Vec<&Profile>, Vec<&Profile>) =
        profiles.iter().partition(|p| already_billed.contains(&p.id));
    let rows = fresh
        .into_iter()
        .map(|p| NewInvoice {
            user_id: p.id,
            period,
            amount,
            status: InvoiceStatus::BelumBayar,
            paid_date: None,
        })
        .collect();
    (rows, billed.into_iter().map(|p| p.id).collect())
}

/// The paid date that goes with a status: set on `lunas`, cleared otherwise.
pub fn paid_date_for(status: InvoiceStatus, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match status {
        InvoiceStatus::Lunas => Some(now),
        InvoiceStatus::BelumBayar => None,
    }
}

#[derive(Clone)]
pub struct DuesEngine {
    db: Arc<dyn DatabaseService>,
    storage: Arc<dyn ObjectStorage>,
}

impl DuesEngine {
    pub fn new(db: Arc<dyn DatabaseService>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { db, storage }
    }

    /// Bills every current resident for `month`/`year` in a single batch insert.
    pub async fn create_monthly_invoices(
        &self,
        actor: &Caller,
        month: u32,
        year: i32,
        amount: i64,
    ) -> PortalResult<InvoiceBatch> {
        require(actor, Capability::ManageDues)?;
        let period = Period::new(month, year)
            .ok_or_else(|| PortalError::validation("Bulan harus 1-12 dan tahun harus positif"))?;
        if amount <= 0 {
            return Err(PortalError::validation("Nominal IPL harus lebih dari 0"));
        }

        let profiles = self.db.list_profiles().await?;
        let already_billed: HashSet<Uuid> = self
            .db
            .list_invoices(InvoiceFilter {
                month: Some(month),
                year: Some(year),
            })
            .await?
            .into_iter()
            .map(|row| row.invoice.user_id)
            .collect();

        let (rows, skipped) = plan_invoices(&profiles, &already_billed, period, amount);
        if !skipped.is_empty() {
            warn!(month, year, skipped = skipped.len(), "Residents already billed for this period");
        }

        let created = if rows.is_empty() {
            Vec::new()
        } else {
            self.db.insert_invoices(rows).await?
        };
        info!(month, year, amount, created = created.len(), "Generated IPL invoices");
        Ok(InvoiceBatch { created, skipped })
    }

    /// Marks an invoice paid (stamping the paid date) or unpaid (clearing it).
    pub async fn set_payment_status(
        &self,
        actor: &Caller,
        invoice_id: Uuid,
        status: InvoiceStatus,
    ) -> PortalResult<Invoice> {
        require(actor, Capability::ManageDues)?;
        let paid_date = paid_date_for(status, Utc::now());
        let invoice = self
            .db
            .update_invoice_status(invoice_id, status, paid_date)
            .await?;
        info!(invoice_id = %invoice_id, status = status.as_str(), "Updated payment status");
        Ok(invoice)
    }

    /// All matching invoices, newest period first. Not paginated.
    pub async fn list_invoices(
        &self,
        actor: &Caller,
        filter: InvoiceFilter,
    ) -> PortalResult<Vec<InvoiceWithResident>> {
        require(actor, Capability::ManageDues)?;
        Ok(self.db.list_invoices(filter).await?)
    }

    pub async fn invoices_for_resident(&self, caller: &Caller) -> PortalResult<Vec<Invoice>> {
        Ok(self.db.list_invoices_for_user(caller.user_id()).await?)
    }

    /// Stores a proof-of-payment file and returns its public URL.
    pub async fn upload_receipt(&self, caller: &Caller, receipt: Attachment) -> PortalResult<String> {
        if receipt.data.is_empty() {
            return Err(PortalError::validation("File bukti pembayaran kosong"));
        }
        let path = format!("{}/{}", caller.user_id(), uploads::unique_name(&receipt.file_name));
        self.storage.upload(RECEIPTS_BUCKET, &path, receipt.data).await?;
        info!(user_id = %caller.user_id(), path, "Stored payment receipt");
        Ok(self.storage.public_url(RECEIPTS_BUCKET, &path))
    }
}

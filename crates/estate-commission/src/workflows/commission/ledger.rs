use serde::Serialize;

use super::domain::{
    CommissionInvoice, InvoiceDraft, InvoiceId, InvoiceStatus, ListingSnapshot, PropertyId,
    SellerId,
};

/// Result of committing a sale: the property's invoice and whether this call created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleReceipt {
    pub invoice: CommissionInvoice,
    pub created: bool,
}

/// Filter used by the invoice listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvoiceQuery {
    pub seller_id: Option<SellerId>,
    pub status: Option<InvoiceStatus>,
}

impl InvoiceQuery {
    pub fn matches(&self, invoice: &CommissionInvoice) -> bool {
        self.seller_id.map_or(true, |id| invoice.seller_id == id)
            && self.status.map_or(true, |status| invoice.status == status)
    }
}

/// Authoritative invoice store.
///
/// Every write is a single unit: `commit_sale` flips the listing to sold and issues the
/// invoice together, and `update` only succeeds when the caller saw the latest `version`.
pub trait InvoiceLedger: Send + Sync {
    fn listing(&self, id: PropertyId) -> Result<Option<ListingSnapshot>, LedgerError>;

    fn register_listing(&self, listing: ListingSnapshot) -> Result<(), LedgerError>;

    /// Marks an available listing sold and issues its invoice unless one already exists.
    fn commit_sale(&self, draft: InvoiceDraft) -> Result<SaleReceipt, LedgerError>;

    fn fetch(&self, id: InvoiceId) -> Result<Option<CommissionInvoice>, LedgerError>;

    fn find_by_tran_id(&self, tran_id: &str) -> Result<Option<CommissionInvoice>, LedgerError>;

    /// Compare-and-set on `invoice.version`; returns the stored copy with the bumped version.
    fn update(&self, invoice: CommissionInvoice) -> Result<CommissionInvoice, LedgerError>;

    /// Matching invoices, newest first.
    fn list(&self, query: InvoiceQuery) -> Result<Vec<CommissionInvoice>, LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("invoice {invoice_id} was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        invoice_id: InvoiceId,
        expected: u64,
        found: u64,
    },
    #[error("invoice {0} not found")]
    InvoiceNotFound(InvoiceId),
    #[error("property {0} not found")]
    PropertyNotFound(PropertyId),
    #[error("property {0} is no longer available for sale")]
    ListingUnavailable(PropertyId),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

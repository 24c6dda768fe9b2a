use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    CommissionInvoice, InvoiceDraft, InvoiceId, ListingSnapshot, ListingStatus, PropertyId,
};
use super::ledger::{InvoiceLedger, InvoiceQuery, LedgerError, SaleReceipt};

#[derive(Debug, Default)]
struct LedgerState {
    listings: HashMap<PropertyId, ListingSnapshot>,
    invoices: HashMap<InvoiceId, CommissionInvoice>,
    by_property: HashMap<PropertyId, InvoiceId>,
    next_invoice_id: u64,
}

/// Process-local ledger. A single mutex covers listings and invoices so a sale and its
/// invoice are visible together or not at all.
#[derive(Debug, Default, Clone)]
pub struct InMemoryInvoiceLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryInvoiceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listings(listings: impl IntoIterator<Item = ListingSnapshot>) -> Self {
        let ledger = Self::default();
        {
            let mut state = ledger.state.lock().unwrap_or_else(|p| p.into_inner());
            for listing in listings {
                state.listings.insert(listing.property_id, listing);
            }
        }
        ledger
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, LedgerError> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger mutex poisoned".to_string()))
    }
}

impl InvoiceLedger for InMemoryInvoiceLedger {
    fn listing(&self, id: PropertyId) -> Result<Option<ListingSnapshot>, LedgerError> {
        Ok(self.lock()?.listings.get(&id).cloned())
    }

    fn register_listing(&self, listing: ListingSnapshot) -> Result<(), LedgerError> {
        self.lock()?.listings.insert(listing.property_id, listing);
        Ok(())
    }

    fn commit_sale(&self, draft: InvoiceDraft) -> Result<SaleReceipt, LedgerError> {
        let mut state = self.lock()?;
        let property_id = draft.property_id;

        let listing = state
            .listings
            .get(&property_id)
            .ok_or(LedgerError::PropertyNotFound(property_id))?;
        if listing.status != ListingStatus::Available {
            return Err(LedgerError::ListingUnavailable(property_id));
        }

        let existing = state
            .by_property
            .get(&property_id)
            .and_then(|id| state.invoices.get(id))
            .cloned();

        let receipt = match existing {
            Some(invoice) => SaleReceipt {
                invoice,
                created: false,
            },
            None => {
                state.next_invoice_id += 1;
                let invoice = CommissionInvoice::issue(InvoiceId(state.next_invoice_id), draft);
                state.by_property.insert(property_id, invoice.invoice_id);
                state.invoices.insert(invoice.invoice_id, invoice.clone());
                SaleReceipt {
                    invoice,
                    created: true,
                }
            }
        };

        if let Some(listing) = state.listings.get_mut(&property_id) {
            listing.status = ListingStatus::Sold;
        }

        Ok(receipt)
    }

    fn fetch(&self, id: InvoiceId) -> Result<Option<CommissionInvoice>, LedgerError> {
        Ok(self.lock()?.invoices.get(&id).cloned())
    }

    fn find_by_tran_id(&self, tran_id: &str) -> Result<Option<CommissionInvoice>, LedgerError> {
        let state = self.lock()?;
        Ok(state
            .invoices
            .values()
            .find(|invoice| invoice.gateway_tran_id.as_deref() == Some(tran_id))
            .cloned())
    }

    fn update(&self, invoice: CommissionInvoice) -> Result<CommissionInvoice, LedgerError> {
        let mut state = self.lock()?;
        let stored = state
            .invoices
            .get_mut(&invoice.invoice_id)
            .ok_or(LedgerError::InvoiceNotFound(invoice.invoice_id))?;

        if stored.version != invoice.version {
            return Err(LedgerError::VersionConflict {
                invoice_id: invoice.invoice_id,
                expected: invoice.version,
                found: stored.version,
            });
        }

        let mut next = invoice;
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    fn list(&self, query: InvoiceQuery) -> Result<Vec<CommissionInvoice>, LedgerError> {
        let state = self.lock()?;
        let mut invoices: Vec<CommissionInvoice> = state
            .invoices
            .values()
            .filter(|invoice| query.matches(invoice))
            .cloned()
            .collect();
        invoices.sort_by(|a, b| {
            b.created_date
                .cmp(&a.created_date)
                .then(b.invoice_id.cmp(&a.invoice_id))
        });
        Ok(invoices)
    }
}

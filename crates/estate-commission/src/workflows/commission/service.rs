use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{GatewayConfig, NotificationConfig};

use super::domain::{
    CommissionInvoice, CommissionRate, InvoiceDraft, InvoiceId, InvoiceStatus, ListingStatus,
    Principal, PropertyId, RateOutOfRange,
};
use super::gateway::{GatewayError, PaymentGateway};
use super::ledger::{InvoiceLedger, InvoiceQuery, LedgerError, SaleReceipt};
use super::notify::{Notification, NotificationDispatcher};
use super::validator::Mismatch;

const MAX_WRITE_ATTEMPTS: usize = 3;

/// Settings the workflows read on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Currency the gateway must report back when confirming a payment.
    pub currency: String,
    pub admin_email: Option<String>,
}

impl WorkflowSettings {
    pub fn from_config(gateway: &GatewayConfig, notifications: &NotificationConfig) -> Self {
        Self {
            currency: gateway.currency.clone(),
            admin_email: notifications.admin_email.clone(),
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            currency: "BDT".to_string(),
            admin_email: None,
        }
    }
}

/// Outcome shown to the caller of an action endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    pub redirect_target: Option<String>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            redirect_target: None,
        }
    }

    pub fn redirect(message: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            redirect_target: Some(target.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            redirect_target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.redirect_target = Some(target.into());
        self
    }
}

/// Proof of payment for a settled invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptView {
    pub invoice_id: InvoiceId,
    pub property_id: PropertyId,
    pub property_title: Option<String>,
    pub transaction_id: Option<String>,
    pub payment_method: String,
    pub amount_paid: Decimal,
    pub payment_date: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevenueSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub invoice_count: usize,
    pub total_commission: Decimal,
}

#[derive(Debug, thiserror::Error)]
pub enum CommissionError {
    #[error("payment gateway is not configured: {0} is not set")]
    Configuration(&'static str),
    #[error("payment gateway unreachable: {0}")]
    Network(String),
    #[error("payment gateway timed out")]
    Timeout,
    #[error("payment gateway returned an unexpected response: {0}")]
    MalformedResponse(String),
    #[error("payment gateway refused the session: {0}")]
    SessionRejected(String),
    #[error("payment could not be verified: {0}")]
    ValidationMismatch(Mismatch),
    #[error("cannot {action} an invoice that is {from}")]
    InvalidStateTransition {
        action: &'static str,
        from: InvoiceStatus,
    },
    #[error(transparent)]
    InvalidRate(#[from] RateOutOfRange),
    #[error("commission amount {0} must be positive")]
    InvalidAmount(Decimal),
    #[error("{0}")]
    InvalidSubmission(String),
    #[error("invoice {0} not found")]
    InvoiceNotFound(InvoiceId),
    #[error("property {0} not found")]
    PropertyNotFound(PropertyId),
    #[error("property {0} is not available for sale")]
    ListingNotAvailable(PropertyId),
    #[error("not allowed: {0}")]
    Forbidden(&'static str),
    #[error(transparent)]
    Ledger(LedgerError),
}

impl CommissionError {
    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CommissionError::Network(_)
            | CommissionError::Timeout
            | CommissionError::MalformedResponse(_)
            | CommissionError::SessionRejected(_) => true,
            CommissionError::Ledger(error) => matches!(
                error,
                LedgerError::VersionConflict { .. } | LedgerError::Unavailable(_)
            ),
            _ => false,
        }
    }

    /// Text safe to show to the seller or admin; gateway details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            CommissionError::Configuration(_) => {
                "Online payment is not available right now. Please contact the admin.".to_string()
            }
            CommissionError::Network(_) => {
                "Payment gateway is currently unavailable. Please try again later.".to_string()
            }
            CommissionError::Timeout => "Payment gateway timeout. Please try again.".to_string(),
            CommissionError::MalformedResponse(_) | CommissionError::SessionRejected(_) => {
                "Payment gateway initialization failed. Please try again later.".to_string()
            }
            CommissionError::ValidationMismatch(_) => {
                "Payment could not be verified. Please contact the admin.".to_string()
            }
            CommissionError::Ledger(LedgerError::VersionConflict { .. }) => {
                "The invoice changed while saving. Please retry.".to_string()
            }
            CommissionError::Ledger(_) => {
                "Invoice storage is unavailable. Please try again later.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<LedgerError> for CommissionError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::InvoiceNotFound(id) => CommissionError::InvoiceNotFound(id),
            LedgerError::PropertyNotFound(id) => CommissionError::PropertyNotFound(id),
            LedgerError::ListingUnavailable(id) => CommissionError::ListingNotAvailable(id),
            other => CommissionError::Ledger(other),
        }
    }
}

impl From<GatewayError> for CommissionError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::Configuration { key } => CommissionError::Configuration(key),
            GatewayError::Timeout => CommissionError::Timeout,
            GatewayError::Network(detail) => CommissionError::Network(detail),
            GatewayError::HttpStatus(code) => {
                CommissionError::Network(format!("gateway answered with HTTP {code}"))
            }
            GatewayError::Malformed(detail) => CommissionError::MalformedResponse(detail),
            GatewayError::SessionRejected { status, reason } => {
                CommissionError::SessionRejected(format!("{status}: {reason}"))
            }
        }
    }
}

/// What a transition closure decided after looking at the freshest invoice.
pub(super) enum Step {
    Write,
    Skip,
}

pub(super) struct Applied {
    pub invoice: CommissionInvoice,
    pub written: bool,
}

/// Commission workflows over a ledger, a payment gateway, and a notifier.
pub struct CommissionService<L, G, N> {
    pub(super) ledger: Arc<L>,
    pub(super) gateway: Arc<G>,
    pub(super) notifier: Arc<N>,
    pub(super) settings: WorkflowSettings,
}

impl<L, G, N> CommissionService<L, G, N>
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(ledger: Arc<L>, gateway: Arc<G>, notifier: Arc<N>, settings: WorkflowSettings) -> Self {
        Self {
            ledger,
            gateway,
            notifier,
            settings,
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Flips an available listing to sold and issues its commission invoice.
    pub fn mark_sold(
        &self,
        principal: &Principal,
        property_id: PropertyId,
    ) -> Result<SaleReceipt, CommissionError> {
        let listing = self
            .ledger
            .listing(property_id)?
            .ok_or(CommissionError::PropertyNotFound(property_id))?;

        if !principal.acts_for(listing.seller_id) {
            return Err(CommissionError::Forbidden("only the owner can mark a property sold"));
        }
        if listing.status != ListingStatus::Available {
            return Err(CommissionError::ListingNotAvailable(property_id));
        }

        let commission_rate =
            CommissionRate::new(listing.commission_rate_percent).unwrap_or_else(|error| {
                tracing::warn!(
                    property_id = %property_id,
                    %error,
                    "listing carries an out-of-range rate; using the platform default"
                );
                CommissionRate::default()
            });

        let receipt = self.ledger.commit_sale(InvoiceDraft {
            property_id,
            seller_id: listing.seller_id,
            listing_price: listing.price,
            commission_rate,
            created_date: Utc::now(),
        })?;

        tracing::info!(
            property_id = %property_id,
            invoice_id = %receipt.invoice.invoice_id,
            created = receipt.created,
            amount = %receipt.invoice.commission_amount,
            "property marked sold"
        );
        Ok(receipt)
    }

    pub fn get(
        &self,
        principal: &Principal,
        invoice_id: InvoiceId,
    ) -> Result<CommissionInvoice, CommissionError> {
        let invoice = self.load(invoice_id)?;
        authorize(principal, &invoice)?;
        Ok(invoice)
    }

    /// Admins see every invoice; sellers only their own. Newest first.
    pub fn list(
        &self,
        principal: &Principal,
        status: Option<InvoiceStatus>,
    ) -> Result<Vec<CommissionInvoice>, CommissionError> {
        let query = InvoiceQuery {
            seller_id: principal.seller_scope(),
            status,
        };
        Ok(self.ledger.list(query)?)
    }

    pub fn receipt(
        &self,
        principal: &Principal,
        invoice_id: InvoiceId,
    ) -> Result<ReceiptView, CommissionError> {
        let invoice = self.get(principal, invoice_id)?;
        if !invoice.is_paid() {
            return Err(CommissionError::InvalidStateTransition {
                action: "issue a receipt for",
                from: invoice.status,
            });
        }

        let property_title = self
            .ledger
            .listing(invoice.property_id)?
            .map(|listing| listing.title);
        let payment_method = match invoice.payment_method {
            Some(method) => method.label().to_string(),
            None if invoice.gateway_val_id.is_some() => "Online".to_string(),
            None => "Unknown".to_string(),
        };

        Ok(ReceiptView {
            invoice_id: invoice.invoice_id,
            property_id: invoice.property_id,
            property_title,
            transaction_id: invoice.transaction_id,
            payment_method,
            amount_paid: invoice.commission_amount,
            payment_date: invoice.verified_date,
        })
    }

    /// Commission collected from paid invoices verified within `[from, to)`.
    pub fn revenue(
        &self,
        principal: &Principal,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RevenueSummary, CommissionError> {
        if !principal.is_admin() {
            return Err(CommissionError::Forbidden("revenue reports are admin only"));
        }
        if to < from {
            return Err(CommissionError::InvalidSubmission(
                "`to` must not be earlier than `from`".to_string(),
            ));
        }

        let start = from.and_time(NaiveTime::MIN).and_utc();
        let end = to.and_time(NaiveTime::MIN).and_utc();
        let paid = self.ledger.list(InvoiceQuery {
            seller_id: None,
            status: Some(InvoiceStatus::Paid),
        })?;

        let (invoice_count, total_commission) = paid
            .iter()
            .filter(|invoice| {
                invoice
                    .verified_date
                    .map_or(false, |verified| verified >= start && verified < end)
            })
            .fold((0usize, Decimal::ZERO), |(count, total), invoice| {
                (count + 1, total + invoice.commission_amount)
            });

        Ok(RevenueSummary {
            from,
            to,
            invoice_count,
            total_commission,
        })
    }

    pub(super) fn load(&self, invoice_id: InvoiceId) -> Result<CommissionInvoice, CommissionError> {
        self.ledger
            .fetch(invoice_id)?
            .ok_or(CommissionError::InvoiceNotFound(invoice_id))
    }

    /// Re-reads the invoice, lets `change` decide on the fresh copy, and writes it back,
    /// retrying when another writer got there first.
    pub(super) fn apply<F>(
        &self,
        invoice_id: InvoiceId,
        mut change: F,
    ) -> Result<Applied, CommissionError>
    where
        F: FnMut(&mut CommissionInvoice) -> Result<Step, CommissionError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.load(invoice_id)?;
            let mut next = current.clone();
            match change(&mut next)? {
                Step::Skip => {
                    return Ok(Applied {
                        invoice: current,
                        written: false,
                    })
                }
                Step::Write => match self.ledger.update(next) {
                    Ok(stored) => {
                        return Ok(Applied {
                            invoice: stored,
                            written: true,
                        })
                    }
                    Err(LedgerError::VersionConflict { found, .. })
                        if attempt < MAX_WRITE_ATTEMPTS =>
                    {
                        tracing::debug!(
                            invoice_id = %invoice_id,
                            attempt,
                            found,
                            "invoice changed underneath; re-reading"
                        );
                    }
                    Err(error) => return Err(error.into()),
                },
            }
        }
    }

    pub(super) fn seller_email(&self, invoice: &CommissionInvoice) -> Option<String> {
        match self.ledger.listing(invoice.property_id) {
            Ok(listing) => listing.and_then(|listing| listing.seller_email),
            Err(error) => {
                tracing::warn!(invoice_id = %invoice.invoice_id, %error, "seller lookup failed");
                None
            }
        }
    }

    /// Best effort: a failed or unaddressed notification is logged and dropped.
    pub(super) fn notify(&self, to: Option<String>, subject: String, body: String) {
        let Some(to) = to else {
            tracing::debug!(%subject, "no recipient configured; notification skipped");
            return;
        };
        if let Err(error) = self.notifier.send(Notification {
            to: to.clone(),
            subject,
            body,
        }) {
            tracing::warn!(%to, %error, "notification failed");
        }
    }

    pub(super) fn notify_seller_paid(&self, invoice: &CommissionInvoice) {
        self.notify(
            self.seller_email(invoice),
            format!("Commission payment confirmed for invoice #{}", invoice.invoice_id),
            format!(
                "Your commission payment of {} {} for property #{} has been received. Transaction: {}.",
                invoice.commission_amount,
                self.settings.currency,
                invoice.property_id,
                invoice.transaction_id.as_deref().unwrap_or("n/a"),
            ),
        );
    }
}

pub(super) fn authorize(
    principal: &Principal,
    invoice: &CommissionInvoice,
) -> Result<(), CommissionError> {
    if principal.acts_for(invoice.seller_id) {
        Ok(())
    } else {
        Err(CommissionError::Forbidden("invoice belongs to another seller"))
    }
}

pub(super) fn require_admin(principal: &Principal) -> Result<(), CommissionError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(CommissionError::Forbidden("admin role required"))
    }
}

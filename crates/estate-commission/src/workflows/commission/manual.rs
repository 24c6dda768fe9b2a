use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::domain::{CommissionInvoice, CommissionRate, InvoiceId, InvoiceStatus, PaymentMethod, Principal};
use super::gateway::PaymentGateway;
use super::ledger::InvoiceLedger;
use super::notify::NotificationDispatcher;
use super::service::{authorize, require_admin, CommissionError, CommissionService, Step};

/// Seller's report of an offline commission payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSubmission {
    pub commission_rate_percent: u8,
    pub payment_method: PaymentMethod,
    pub transaction_id: String,
    pub proof_image_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminDecision {
    #[serde(default)]
    pub admin_note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Approve,
    Reject,
}

impl Verdict {
    fn action(self) -> &'static str {
        match self {
            Verdict::Approve => "approve",
            Verdict::Reject => "reject",
        }
    }

    fn status(self) -> InvoiceStatus {
        match self {
            Verdict::Approve => InvoiceStatus::Paid,
            Verdict::Reject => InvoiceStatus::Rejected,
        }
    }
}

fn required_text(value: &str, field: &str) -> Result<String, CommissionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CommissionError::InvalidSubmission(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

impl<L, G, N> CommissionService<L, G, N>
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    /// Records proof of an offline payment and queues the invoice for admin review.
    pub fn submit_proof(
        &self,
        principal: &Principal,
        invoice_id: InvoiceId,
        submission: ProofSubmission,
    ) -> Result<CommissionInvoice, CommissionError> {
        let rate = CommissionRate::new(submission.commission_rate_percent)?;
        let transaction_id = required_text(&submission.transaction_id, "transaction_id")?;
        let proof_image_url = required_text(&submission.proof_image_url, "proof_image_url")?;

        let applied = self.apply(invoice_id, |invoice| {
            authorize(principal, invoice)?;
            if !invoice.status.accepts_payment() {
                return Err(CommissionError::InvalidStateTransition {
                    action: "submit payment proof for",
                    from: invoice.status,
                });
            }
            invoice.reprice(rate);
            invoice.payment_method = Some(submission.payment_method);
            invoice.transaction_id = Some(transaction_id.clone());
            invoice.proof_image_url = Some(proof_image_url.clone());
            invoice.submitted_date = Some(Utc::now());
            invoice.status = InvoiceStatus::PendingVerification;
            Ok(Step::Write)
        })?;
        let invoice = applied.invoice;

        tracing::info!(
            invoice_id = %invoice_id,
            status = %invoice.status,
            method = invoice.payment_method.map(PaymentMethod::label),
            "payment proof submitted"
        );
        self.notify(
            self.settings.admin_email.clone(),
            format!("Commission proof submitted for invoice #{invoice_id}"),
            format!(
                "Seller #{} submitted a {} payment of {} {} for property #{} (transaction {}). Proof: {}.",
                invoice.seller_id,
                submission.payment_method.label(),
                invoice.commission_amount,
                self.settings.currency,
                invoice.property_id,
                transaction_id,
                proof_image_url,
            ),
        );
        Ok(invoice)
    }

    pub fn approve(
        &self,
        principal: &Principal,
        invoice_id: InvoiceId,
        decision: AdminDecision,
    ) -> Result<CommissionInvoice, CommissionError> {
        self.decide(principal, invoice_id, decision, Verdict::Approve)
    }

    pub fn reject(
        &self,
        principal: &Principal,
        invoice_id: InvoiceId,
        decision: AdminDecision,
    ) -> Result<CommissionInvoice, CommissionError> {
        self.decide(principal, invoice_id, decision, Verdict::Reject)
    }

    fn decide(
        &self,
        principal: &Principal,
        invoice_id: InvoiceId,
        decision: AdminDecision,
        verdict: Verdict,
    ) -> Result<CommissionInvoice, CommissionError> {
        require_admin(principal)?;
        let note = decision
            .admin_note
            .map(|note| note.trim().to_string())
            .filter(|note| !note.is_empty());

        let applied = self.apply(invoice_id, |invoice| {
            if invoice.status != InvoiceStatus::PendingVerification {
                return Err(CommissionError::InvalidStateTransition {
                    action: verdict.action(),
                    from: invoice.status,
                });
            }
            invoice.status = verdict.status();
            invoice.admin_note = note.clone();
            invoice.verified_date = Some(Utc::now());
            Ok(Step::Write)
        })?;
        let invoice = applied.invoice;

        tracing::info!(invoice_id = %invoice_id, status = %invoice.status, "manual payment reviewed");
        let (subject, outcome) = match verdict {
            Verdict::Approve => ("Commission payment approved", "approved"),
            Verdict::Reject => ("Commission payment rejected", "rejected"),
        };
        self.notify(
            self.seller_email(&invoice),
            format!("{subject} for invoice #{invoice_id}"),
            format!(
                "Your commission payment of {} {} for property #{} was {outcome}.{}",
                invoice.commission_amount,
                self.settings.currency,
                invoice.property_id,
                invoice
                    .admin_note
                    .as_deref()
                    .map(|note| format!(" Note: {note}"))
                    .unwrap_or_default(),
            ),
        );
        Ok(invoice)
    }
}

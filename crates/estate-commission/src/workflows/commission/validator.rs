use chrono::Utc;
use rust_decimal::Decimal;

use super::domain::{CommissionInvoice, GatewayStatus, InvoiceId, InvoiceStatus};
use super::gateway::{PaymentGateway, ValidationReport};
use super::ledger::InvoiceLedger;
use super::notify::NotificationDispatcher;
use super::service::{CommissionError, CommissionService, Step};

/// The first check a validation report failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Mismatch {
    #[error("gateway status `{found}` is not a confirmed payment")]
    Status { found: String },
    #[error("currency {found:?} does not match {expected}")]
    Currency {
        expected: String,
        found: Option<String>,
    },
    #[error("amount {found:?} does not match the invoiced {expected}")]
    Amount {
        expected: Decimal,
        found: Option<Decimal>,
    },
    #[error("transaction {found} belongs to another payment session")]
    Transaction { found: String },
}

/// Checks a validation report against the invoice it claims to pay.
///
/// All checks must pass together; the first failing one is reported.
pub fn check_report(
    report: &ValidationReport,
    invoice: &CommissionInvoice,
    currency: &str,
) -> Result<GatewayStatus, Mismatch> {
    let confirmed = GatewayStatus::confirmed(&report.status).ok_or_else(|| Mismatch::Status {
        found: report.status.clone(),
    })?;

    let currency_matches = report
        .currency
        .as_deref()
        .map_or(false, |found| found.trim().eq_ignore_ascii_case(currency));
    if !currency_matches {
        return Err(Mismatch::Currency {
            expected: currency.to_string(),
            found: report.currency.clone(),
        });
    }

    let expected = invoice.commission_amount.round_dp(2);
    if report.amount.map(|amount| amount.round_dp(2)) != Some(expected) {
        return Err(Mismatch::Amount {
            expected,
            found: report.amount,
        });
    }

    if let Some(found) = report.tran_id.as_deref() {
        if invoice.gateway_tran_id.as_deref() != Some(found) {
            return Err(Mismatch::Transaction {
                found: found.to_string(),
            });
        }
    }

    Ok(confirmed)
}

/// Result of a validation round trip that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// This call moved the invoice to paid.
    Paid(CommissionInvoice),
    /// The invoice was already paid; nothing was written.
    AlreadyPaid(CommissionInvoice),
    /// The invoice moved on to another session or out of the gateway path; nothing was written.
    Superseded(CommissionInvoice),
}

impl ValidationOutcome {
    pub fn invoice(&self) -> &CommissionInvoice {
        match self {
            ValidationOutcome::Paid(invoice)
            | ValidationOutcome::AlreadyPaid(invoice)
            | ValidationOutcome::Superseded(invoice) => invoice,
        }
    }
}

/// Whether `tran_id` is still the live gateway session of an invoice awaiting payment.
fn session_is_current(invoice: &CommissionInvoice, tran_id: &str) -> bool {
    invoice.status.accepts_payment() && invoice.gateway_tran_id.as_deref() == Some(tran_id)
}

/// What the write closure found on the freshest copy when it declined to credit.
enum Held {
    Paid,
    Superseded,
    Mismatch(Mismatch),
}

impl<L, G, N> CommissionService<L, G, N>
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    /// Confirms `val_id` for session `tran_id` with the gateway and credits the invoice
    /// when every check passes against the invoice as it is at write time.
    pub async fn validate_and_mark_paid(
        &self,
        invoice_id: InvoiceId,
        tran_id: &str,
        val_id: &str,
    ) -> Result<ValidationOutcome, CommissionError> {
        let invoice = self.load(invoice_id)?;
        if invoice.is_paid() {
            tracing::info!(invoice_id = %invoice_id, "invoice already paid; validation skipped");
            return Ok(ValidationOutcome::AlreadyPaid(invoice));
        }
        if !session_is_current(&invoice, tran_id) {
            tracing::warn!(invoice_id = %invoice_id, tran_id, "confirmation for a superseded session");
            return Ok(ValidationOutcome::Superseded(invoice));
        }

        let report = self.gateway.validate(val_id).await.map_err(|error| {
            tracing::warn!(invoice_id = %invoice_id, %error, "validation call failed; invoice untouched");
            CommissionError::from(error)
        })?;

        match check_report(&report, &invoice, &self.settings.currency) {
            Ok(_) => self.credit(invoice_id, tran_id, val_id, &report),
            Err(mismatch) => self.record_mismatch(invoice_id, tran_id, mismatch),
        }
    }

    fn credit(
        &self,
        invoice_id: InvoiceId,
        tran_id: &str,
        val_id: &str,
        report: &ValidationReport,
    ) -> Result<ValidationOutcome, CommissionError> {
        let mut held = None;
        let applied = self.apply(invoice_id, |invoice| {
            held = None;
            let bank_tran_id = report
                .bank_tran_id
                .clone()
                .or_else(|| invoice.gateway_tran_id.clone());

            if invoice.is_paid() {
                if invoice.transaction_id != bank_tran_id {
                    tracing::warn!(
                        invoice_id = %invoice_id,
                        recorded = ?invoice.transaction_id,
                        ignored = ?bank_tran_id,
                        "conflicting bank transaction for a paid invoice; first confirmation kept"
                    );
                }
                held = Some(Held::Paid);
                return Ok(Step::Skip);
            }
            if !session_is_current(invoice, tran_id) {
                held = Some(Held::Superseded);
                return Ok(Step::Skip);
            }
            let confirmed = match check_report(report, invoice, &self.settings.currency) {
                Ok(confirmed) => confirmed,
                Err(mismatch) => {
                    held = Some(Held::Mismatch(mismatch));
                    return Ok(Step::Skip);
                }
            };

            invoice.gateway_val_id = Some(val_id.to_string());
            invoice.gateway_status = Some(confirmed);
            invoice.transaction_id = bank_tran_id;
            invoice.status = InvoiceStatus::Paid;
            invoice.verified_date = Some(Utc::now());
            Ok(Step::Write)
        })?;

        match held {
            Some(Held::Paid) => return Ok(ValidationOutcome::AlreadyPaid(applied.invoice)),
            Some(Held::Superseded) => {
                tracing::warn!(
                    invoice_id = %invoice_id,
                    tran_id,
                    current = ?applied.invoice.gateway_tran_id,
                    status = %applied.invoice.status,
                    "invoice changed during validation; confirmation not applied"
                );
                return Ok(ValidationOutcome::Superseded(applied.invoice));
            }
            Some(Held::Mismatch(mismatch)) => {
                return self.record_mismatch(invoice_id, tran_id, mismatch)
            }
            None => {}
        }

        tracing::info!(
            invoice_id = %invoice_id,
            tran_id,
            status = %applied.invoice.status,
            "commission paid through gateway"
        );
        self.notify_seller_paid(&applied.invoice);
        Ok(ValidationOutcome::Paid(applied.invoice))
    }

    fn record_mismatch(
        &self,
        invoice_id: InvoiceId,
        tran_id: &str,
        mismatch: Mismatch,
    ) -> Result<ValidationOutcome, CommissionError> {
        tracing::warn!(invoice_id = %invoice_id, tran_id, %mismatch, "gateway validation mismatch");

        let applied = self.apply(invoice_id, |invoice| {
            if invoice.is_paid() || !session_is_current(invoice, tran_id) {
                return Ok(Step::Skip);
            }
            invoice.gateway_status = Some(GatewayStatus::ValidationFailed);
            Ok(Step::Write)
        })?;

        if applied.invoice.is_paid() {
            return Ok(ValidationOutcome::AlreadyPaid(applied.invoice));
        }
        if !applied.written {
            tracing::info!(invoice_id = %invoice_id, tran_id, "mismatch for a superseded session; marker not stored");
            return Ok(ValidationOutcome::Superseded(applied.invoice));
        }
        Err(CommissionError::ValidationMismatch(mismatch))
    }
}

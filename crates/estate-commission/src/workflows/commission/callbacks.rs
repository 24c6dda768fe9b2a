use serde::Deserialize;

use super::domain::{GatewayStatus, InvoiceId};
use super::gateway::PaymentGateway;
use super::ledger::InvoiceLedger;
use super::notify::NotificationDispatcher;
use super::service::{CommissionError, CommissionService, Step};
use super::validator::ValidationOutcome;

/// Fields the gateway posts back to every callback URL. All are untrusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub tran_id: Option<String>,
    #[serde(default)]
    pub val_id: Option<String>,
}

impl CallbackParams {
    fn tran_id(&self) -> Option<&str> {
        non_blank(self.tran_id.as_deref())
    }

    fn val_id(&self) -> Option<&str> {
        non_blank(self.val_id.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
    MissingFields,
    UnknownTransaction,
}

/// What a callback did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Paid { invoice_id: InvoiceId },
    /// Duplicate or late confirmation of an invoice that is already paid.
    AlreadyPaid { invoice_id: InvoiceId },
    /// A non-terminal gateway marker was stored.
    Recorded {
        invoice_id: InvoiceId,
        gateway_status: GatewayStatus,
    },
    /// The callback belongs to a session the invoice has since moved away from.
    Superseded { invoice_id: InvoiceId },
    Ignored(IgnoredReason),
}

impl CallbackOutcome {
    pub fn invoice_id(&self) -> Option<InvoiceId> {
        match self {
            CallbackOutcome::Paid { invoice_id }
            | CallbackOutcome::AlreadyPaid { invoice_id }
            | CallbackOutcome::Recorded { invoice_id, .. }
            | CallbackOutcome::Superseded { invoice_id } => Some(*invoice_id),
            CallbackOutcome::Ignored(_) => None,
        }
    }
}

impl<L, G, N> CommissionService<L, G, N>
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    /// Browser redirect after a completed payment.
    pub async fn handle_success(
        &self,
        params: &CallbackParams,
    ) -> Result<CallbackOutcome, CommissionError> {
        self.confirm("success", params).await
    }

    /// Server-to-server notification; may arrive before, after, or instead of the redirect.
    pub async fn handle_ipn(
        &self,
        params: &CallbackParams,
    ) -> Result<CallbackOutcome, CommissionError> {
        self.confirm("ipn", params).await
    }

    pub fn handle_fail(&self, params: &CallbackParams) -> Result<CallbackOutcome, CommissionError> {
        self.record_marker(params, GatewayStatus::Failed)
    }

    pub fn handle_cancel(
        &self,
        params: &CallbackParams,
    ) -> Result<CallbackOutcome, CommissionError> {
        self.record_marker(params, GatewayStatus::Cancelled)
    }

    async fn confirm(
        &self,
        source: &'static str,
        params: &CallbackParams,
    ) -> Result<CallbackOutcome, CommissionError> {
        let (Some(tran_id), Some(val_id)) = (params.tran_id(), params.val_id()) else {
            tracing::warn!(source, "callback without tran_id or val_id");
            return Ok(CallbackOutcome::Ignored(IgnoredReason::MissingFields));
        };

        let Some(invoice) = self.ledger.find_by_tran_id(tran_id)? else {
            tracing::warn!(source, tran_id, "callback for an unknown transaction");
            return Ok(CallbackOutcome::Ignored(IgnoredReason::UnknownTransaction));
        };
        let invoice_id = invoice.invoice_id;
        if invoice.is_paid() {
            tracing::info!(source, tran_id, invoice_id = %invoice_id, "duplicate confirmation");
            return Ok(CallbackOutcome::AlreadyPaid { invoice_id });
        }

        match self.validate_and_mark_paid(invoice_id, tran_id, val_id).await? {
            ValidationOutcome::Paid(_) => Ok(CallbackOutcome::Paid { invoice_id }),
            ValidationOutcome::AlreadyPaid(_) => {
                tracing::info!(source, tran_id, invoice_id = %invoice_id, "duplicate confirmation");
                Ok(CallbackOutcome::AlreadyPaid { invoice_id })
            }
            ValidationOutcome::Superseded(_) => Ok(CallbackOutcome::Superseded { invoice_id }),
        }
    }

    fn record_marker(
        &self,
        params: &CallbackParams,
        marker: GatewayStatus,
    ) -> Result<CallbackOutcome, CommissionError> {
        let Some(tran_id) = params.tran_id() else {
            tracing::warn!(marker = %marker, "callback without tran_id");
            return Ok(CallbackOutcome::Ignored(IgnoredReason::MissingFields));
        };
        let Some(invoice) = self.ledger.find_by_tran_id(tran_id)? else {
            tracing::warn!(marker = %marker, tran_id, "callback for an unknown transaction");
            return Ok(CallbackOutcome::Ignored(IgnoredReason::UnknownTransaction));
        };
        let invoice_id = invoice.invoice_id;

        let applied = self.apply(invoice_id, |invoice| {
            if invoice.is_paid() || invoice.gateway_tran_id.as_deref() != Some(tran_id) {
                return Ok(Step::Skip);
            }
            invoice.gateway_status = Some(marker);
            Ok(Step::Write)
        })?;

        if applied.invoice.is_paid() {
            return Ok(CallbackOutcome::AlreadyPaid { invoice_id });
        }
        if !applied.written {
            tracing::info!(tran_id, invoice_id = %invoice_id, marker = %marker, "marker for a superseded session dropped");
            return Ok(CallbackOutcome::Superseded { invoice_id });
        }
        tracing::info!(tran_id, invoice_id = %invoice_id, marker = %marker, "gateway marker recorded");
        Ok(CallbackOutcome::Recorded {
            invoice_id,
            gateway_status: marker,
        })
    }
}

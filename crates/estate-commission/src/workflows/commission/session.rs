use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::domain::{CommissionRate, GatewayStatus, InvoiceId, Principal};
use super::gateway::{CustomerDetails, PaymentGateway, SessionRequest};
use super::ledger::InvoiceLedger;
use super::notify::NotificationDispatcher;
use super::service::{
    authorize, ActionResult, CommissionError, CommissionService, Step,
};

/// `COMM_INV_{invoice}_{10 hex}_{yyyyMMddHHmmss}`; unique per attempt and traceable to the invoice.
pub fn correlation_id(invoice_id: InvoiceId, at: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "COMM_INV_{invoice_id}_{}_{}",
        &random[..10],
        at.format("%Y%m%d%H%M%S")
    )
}

impl<L, G, N> CommissionService<L, G, N>
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    /// Opens a gateway session for an unpaid or rejected invoice.
    ///
    /// The new correlation id is stored with an `INITIATED` marker before the gateway is
    /// called, so a callback can never arrive for a session the ledger does not know.
    pub async fn init_payment(
        &self,
        principal: &Principal,
        invoice_id: InvoiceId,
        rate_override: Option<u8>,
    ) -> Result<ActionResult, CommissionError> {
        if rate_override.is_some() && !principal.is_admin() {
            return Err(CommissionError::Forbidden(
                "only an admin can change the commission rate",
            ));
        }
        let rate_override = rate_override.map(CommissionRate::new).transpose()?;

        let invoice = self.load(invoice_id)?;
        authorize(principal, &invoice)?;
        if !invoice.status.accepts_payment() {
            return Err(CommissionError::InvalidStateTransition {
                action: "start a payment for",
                from: invoice.status,
            });
        }

        self.gateway.ensure_configured()?;

        let tran_id = correlation_id(invoice_id, Utc::now());
        let applied = self.apply(invoice_id, |invoice| {
            if !invoice.status.accepts_payment() {
                return Err(CommissionError::InvalidStateTransition {
                    action: "start a payment for",
                    from: invoice.status,
                });
            }
            if let Some(rate) = rate_override {
                invoice.reprice(rate);
            }
            if invoice.commission_amount <= Decimal::ZERO {
                return Err(CommissionError::InvalidAmount(invoice.commission_amount));
            }
            invoice.gateway_tran_id = Some(tran_id.clone());
            invoice.gateway_val_id = None;
            invoice.gateway_status = Some(GatewayStatus::Initiated);
            Ok(Step::Write)
        })?;
        let invoice = applied.invoice;

        let customer = CustomerDetails {
            email: self
                .seller_email(&invoice)
                .unwrap_or_else(|| CustomerDetails::default().email),
            ..CustomerDetails::default()
        };
        let request = SessionRequest {
            invoice_id,
            tran_id: tran_id.clone(),
            amount: invoice.commission_amount,
            customer,
        };

        let redirect = self.gateway.open_session(&request).await.map_err(|error| {
            tracing::warn!(
                invoice_id = %invoice_id,
                tran_id = %tran_id,
                %error,
                "gateway session could not be opened"
            );
            CommissionError::from(error)
        })?;

        tracing::info!(
            invoice_id = %invoice_id,
            tran_id = %tran_id,
            amount = %invoice.commission_amount,
            "gateway session opened"
        );
        Ok(ActionResult::redirect(
            "Redirecting to the payment gateway.",
            redirect,
        ))
    }
}

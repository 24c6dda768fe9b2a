//! Commission invoices for sold properties and their settlement, either through the hosted
//! payment gateway or through manually verified proof of payment.

pub mod callbacks;
pub mod domain;
pub mod gateway;
pub mod ledger;
pub mod manual;
pub mod memory;
pub mod notify;
pub mod router;
pub mod service;
pub mod session;
pub mod validator;

#[cfg(test)]
mod tests;

pub use callbacks::{CallbackOutcome, CallbackParams, IgnoredReason};
pub use domain::{
    commission_amount, CommissionInvoice, CommissionRate, GatewayStatus, InvoiceDraft, InvoiceId,
    InvoiceStatus, ListingSnapshot, ListingStatus, PaymentMethod, Principal, PropertyId,
    RateOutOfRange, SellerId,
};
pub use gateway::{
    CustomerDetails, GatewayError, PaymentGateway, SessionRequest, SslCommerzGateway,
    ValidationReport,
};
pub use ledger::{InvoiceLedger, InvoiceQuery, LedgerError, SaleReceipt};
pub use manual::{AdminDecision, ProofSubmission};
pub use memory::InMemoryInvoiceLedger;
pub use notify::{
    Notification, NotificationDispatcher, NotifyError, RecordingNotifier, SmtpNotifier,
    TracingNotifier,
};
pub use router::{commission_router, RequestPrincipal, PRINCIPAL_ID_HEADER, PRINCIPAL_ROLE_HEADER};
pub use service::{
    ActionResult, CommissionError, CommissionService, ReceiptView, RevenueSummary,
    WorkflowSettings,
};
pub use session::correlation_id;
pub use validator::{check_report, Mismatch, ValidationOutcome};

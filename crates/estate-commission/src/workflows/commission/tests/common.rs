use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::workflows::commission::{
    AdminDecision, CommissionInvoice, CommissionService, GatewayError, InMemoryInvoiceLedger,
    InvoiceDraft, InvoiceId, InvoiceLedger, InvoiceQuery, LedgerError, ListingSnapshot,
    ListingStatus, PaymentGateway, PaymentMethod, Principal, ProofSubmission, PropertyId,
    RecordingNotifier, SaleReceipt, SellerId, SessionRequest, ValidationReport, WorkflowSettings,
};

pub(super) const SELLER_EMAIL: &str = "seller10@example.com";
pub(super) const ADMIN_EMAIL: &str = "admin@example.com";
pub(super) const REDIRECT_URL: &str = "https://sandbox.gateway.test/pay/session-1";

pub(super) fn seller() -> Principal {
    Principal::Seller(SellerId(10))
}

pub(super) fn other_seller() -> Principal {
    Principal::Seller(SellerId(11))
}

pub(super) fn admin() -> Principal {
    Principal::Admin {
        admin_id: "ops-1".to_string(),
    }
}

pub(super) fn listing(id: u64, seller: u64, price: Decimal, rate: u8) -> ListingSnapshot {
    ListingSnapshot {
        property_id: PropertyId(id),
        seller_id: SellerId(seller),
        title: format!("Lake View Apartment {id}"),
        price,
        commission_rate_percent: rate,
        status: ListingStatus::Available,
        seller_email: Some(SELLER_EMAIL.to_string()),
    }
}

pub(super) fn settings() -> WorkflowSettings {
    WorkflowSettings {
        currency: "BDT".to_string(),
        admin_email: Some(ADMIN_EMAIL.to_string()),
    }
}

pub(super) fn confirmed_report(amount: &str) -> ValidationReport {
    ValidationReport {
        status: "VALID".to_string(),
        currency: Some("BDT".to_string()),
        amount: Some(amount.parse().expect("decimal amount")),
        bank_tran_id: Some("BANK-TRX-1".to_string()),
        tran_id: None,
    }
}

pub(super) fn proof(rate: u8) -> ProofSubmission {
    ProofSubmission {
        commission_rate_percent: rate,
        payment_method: PaymentMethod::Bkash,
        transaction_id: "BK-7781".to_string(),
        proof_image_url: "/uploads/proofs/bk-7781.jpg".to_string(),
    }
}

pub(super) fn note(text: &str) -> AdminDecision {
    AdminDecision {
        admin_note: Some(text.to_string()),
    }
}

pub(super) enum SessionScript {
    Redirect,
    Rejected,
    Timeout,
}

pub(super) enum ValidationScript {
    Report(ValidationReport),
    Timeout,
    Malformed,
}

/// Scripted gateway that records what the service sent it.
pub(super) struct FakeGateway {
    configured: bool,
    session: SessionScript,
    validation: Mutex<ValidationScript>,
    pub(super) sessions: Mutex<Vec<SessionRequest>>,
    pub(super) validations: AtomicUsize,
}

impl FakeGateway {
    pub(super) fn confirming(amount: &str) -> Self {
        Self::with_validation(ValidationScript::Report(confirmed_report(amount)))
    }

    pub(super) fn with_validation(validation: ValidationScript) -> Self {
        Self {
            configured: true,
            session: SessionScript::Redirect,
            validation: Mutex::new(validation),
            sessions: Mutex::new(Vec::new()),
            validations: AtomicUsize::new(0),
        }
    }

    pub(super) fn with_session(mut self, session: SessionScript) -> Self {
        self.session = session;
        self
    }

    pub(super) fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::confirming("30000.00")
        }
    }

    pub(super) fn script_validation(&self, validation: ValidationScript) {
        *self.validation.lock().expect("script lock") = validation;
    }

    pub(super) fn validation_calls(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    pub(super) fn session_requests(&self) -> Vec<SessionRequest> {
        self.sessions.lock().expect("sessions lock").clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn ensure_configured(&self) -> Result<(), GatewayError> {
        if self.configured {
            Ok(())
        } else {
            Err(GatewayError::Configuration {
                key: "GATEWAY_STORE_ID",
            })
        }
    }

    async fn open_session(&self, request: &SessionRequest) -> Result<String, GatewayError> {
        self.ensure_configured()?;
        self.sessions
            .lock()
            .expect("sessions lock")
            .push(request.clone());
        match self.session {
            SessionScript::Redirect => Ok(REDIRECT_URL.to_string()),
            SessionScript::Rejected => Err(GatewayError::SessionRejected {
                status: "FAILED".to_string(),
                reason: "Store is inactive".to_string(),
            }),
            SessionScript::Timeout => Err(GatewayError::Timeout),
        }
    }

    async fn validate(&self, _val_id: &str) -> Result<ValidationReport, GatewayError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        match &*self.validation.lock().expect("script lock") {
            ValidationScript::Report(report) => Ok(report.clone()),
            ValidationScript::Timeout => Err(GatewayError::Timeout),
            ValidationScript::Malformed => {
                Err(GatewayError::Malformed("expected value at line 1".to_string()))
            }
        }
    }
}

type Interloper = Box<dyn FnOnce(&InMemoryInvoiceLedger) + Send>;

/// Ledger that lets another writer commit just before the next update lands.
#[derive(Default)]
pub(super) struct RacingLedger {
    pub(super) inner: InMemoryInvoiceLedger,
    interloper: Mutex<Option<Interloper>>,
}

impl RacingLedger {
    pub(super) fn before_next_update(
        &self,
        interloper: impl FnOnce(&InMemoryInvoiceLedger) + Send + 'static,
    ) {
        *self.interloper.lock().expect("interloper lock") = Some(Box::new(interloper));
    }
}

impl InvoiceLedger for RacingLedger {
    fn listing(&self, id: PropertyId) -> Result<Option<ListingSnapshot>, LedgerError> {
        self.inner.listing(id)
    }

    fn register_listing(&self, listing: ListingSnapshot) -> Result<(), LedgerError> {
        self.inner.register_listing(listing)
    }

    fn commit_sale(&self, draft: InvoiceDraft) -> Result<SaleReceipt, LedgerError> {
        self.inner.commit_sale(draft)
    }

    fn fetch(&self, id: InvoiceId) -> Result<Option<CommissionInvoice>, LedgerError> {
        self.inner.fetch(id)
    }

    fn find_by_tran_id(&self, tran_id: &str) -> Result<Option<CommissionInvoice>, LedgerError> {
        self.inner.find_by_tran_id(tran_id)
    }

    fn update(&self, invoice: CommissionInvoice) -> Result<CommissionInvoice, LedgerError> {
        let interloper = self.interloper.lock().expect("interloper lock").take();
        if let Some(interloper) = interloper {
            interloper(&self.inner);
        }
        self.inner.update(invoice)
    }

    fn list(&self, query: InvoiceQuery) -> Result<Vec<CommissionInvoice>, LedgerError> {
        self.inner.list(query)
    }
}

pub(super) type TestService = CommissionService<InMemoryInvoiceLedger, FakeGateway, RecordingNotifier>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) ledger: Arc<InMemoryInvoiceLedger>,
    pub(super) gateway: Arc<FakeGateway>,
    pub(super) notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub(super) fn new(gateway: FakeGateway) -> Self {
        Self::with_listings(gateway, [listing(1, 10, dec!(1000000), 3)])
    }

    pub(super) fn with_listings(
        gateway: FakeGateway,
        listings: impl IntoIterator<Item = ListingSnapshot>,
    ) -> Self {
        let ledger = Arc::new(InMemoryInvoiceLedger::with_listings(listings));
        let gateway = Arc::new(gateway);
        let notifier = Arc::new(RecordingNotifier::default());
        let service = Arc::new(CommissionService::new(
            ledger.clone(),
            gateway.clone(),
            notifier.clone(),
            settings(),
        ));
        Self {
            service,
            ledger,
            gateway,
            notifier,
        }
    }

    /// Sells property 1 and returns its fresh invoice.
    pub(super) fn sold(&self) -> CommissionInvoice {
        self.service
            .mark_sold(&seller(), PropertyId(1))
            .expect("property sells")
            .invoice
    }

    /// Sells property 1 and opens a gateway session; returns the stored invoice.
    pub(super) async fn initiated(&self) -> CommissionInvoice {
        let invoice = self.sold();
        self.service
            .init_payment(&seller(), invoice.invoice_id, None)
            .await
            .expect("session opens");
        self.stored(invoice.invoice_id)
    }

    pub(super) fn stored(&self, invoice_id: InvoiceId) -> CommissionInvoice {
        self.ledger
            .fetch(invoice_id)
            .expect("ledger available")
            .expect("invoice exists")
    }

    pub(super) fn sent_to(&self, recipient: &str) -> usize {
        self.notifier
            .sent()
            .iter()
            .filter(|notification| notification.to == recipient)
            .count()
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("json body")
}

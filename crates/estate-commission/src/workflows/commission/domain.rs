use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ledger-assigned identifier of a commission invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub u64);

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a listed property owned by the listing collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(pub u64);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SellerId(pub u64);

impl fmt::Display for SellerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raised whenever a commission rate falls outside the platform band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error(
    "commission rate must be between {min}% and {max}% (found {found}%)",
    min = CommissionRate::MIN,
    max = CommissionRate::MAX
)]
pub struct RateOutOfRange {
    pub found: u8,
}

/// Whole-percent commission rate, constrained to `[MIN, MAX]` at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CommissionRate(u8);

impl CommissionRate {
    pub const MIN: u8 = 2;
    pub const MAX: u8 = 5;

    pub fn new(percent: u8) -> Result<Self, RateOutOfRange> {
        if (Self::MIN..=Self::MAX).contains(&percent) {
            Ok(Self(percent))
        } else {
            Err(RateOutOfRange { found: percent })
        }
    }

    pub fn percent(self) -> u8 {
        self.0
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

impl TryFrom<u8> for CommissionRate {
    type Error = RateOutOfRange;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CommissionRate> for u8 {
    fn from(rate: CommissionRate) -> Self {
        rate.0
    }
}

/// `round(price × rate / 100, 2)`, rounding half to even like the ledger's decimal columns.
pub fn commission_amount(listing_price: Decimal, rate: CommissionRate) -> Decimal {
    (listing_price * Decimal::from(rate.percent()) / Decimal::ONE_HUNDRED).round_dp(2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    PendingVerification,
    Paid,
    Rejected,
}

impl InvoiceStatus {
    pub fn label(self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::PendingVerification => "pending_verification",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Rejected => "rejected",
        }
    }

    /// Statuses from which a seller may start a payment (gateway or manual).
    pub fn accepts_payment(self) -> bool {
        matches!(self, InvoiceStatus::Unpaid | InvoiceStatus::Rejected)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Marker recorded in `gateway_status` as the gateway conversation progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStatus {
    /// Provisional marker written before the outbound session call.
    Initiated,
    Failed,
    Cancelled,
    ValidationFailed,
    Valid,
    Validated,
}

impl GatewayStatus {
    /// Maps the gateway's own status code onto one of its "confirmed" markers.
    pub fn confirmed(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.eq_ignore_ascii_case("VALID") {
            Some(GatewayStatus::Valid)
        } else if code.eq_ignore_ascii_case("VALIDATED") {
            Some(GatewayStatus::Validated)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GatewayStatus::Initiated => "INITIATED",
            GatewayStatus::Failed => "FAILED",
            GatewayStatus::Cancelled => "CANCELLED",
            GatewayStatus::ValidationFailed => "VALIDATION_FAILED",
            GatewayStatus::Valid => "VALID",
            GatewayStatus::Validated => "VALIDATED",
        }
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Offline channels a seller can report for a manual commission payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Bank,
    Bkash,
    Nagad,
    Rocket,
    Cash,
    Other,
}

impl PaymentMethod {
    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::Bank => "Bank",
            PaymentMethod::Bkash => "bKash",
            PaymentMethod::Nagad => "Nagad",
            PaymentMethod::Rocket => "Rocket",
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Available,
    UnderNegotiation,
    Sold,
    Rented,
    Removed,
}

impl ListingStatus {
    pub fn label(self) -> &'static str {
        match self {
            ListingStatus::Available => "available",
            ListingStatus::UnderNegotiation => "under_negotiation",
            ListingStatus::Sold => "sold",
            ListingStatus::Rented => "rented",
            ListingStatus::Removed => "removed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value
            .trim()
            .to_ascii_lowercase()
            .replace(' ', "_")
            .replace('-', "_");
        match normalized.as_str() {
            "available" => Some(ListingStatus::Available),
            "under_negotiation" | "undernegotiation" => Some(ListingStatus::UnderNegotiation),
            "sold" => Some(ListingStatus::Sold),
            "rented" => Some(ListingStatus::Rented),
            "removed" => Some(ListingStatus::Removed),
            _ => None,
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Property data the sale transition needs from the listing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub property_id: PropertyId,
    pub seller_id: SellerId,
    pub title: String,
    pub price: Decimal,
    /// Rate chosen by an admin when the listing was approved; not yet range checked.
    pub commission_rate_percent: u8,
    pub status: ListingStatus,
    pub seller_email: Option<String>,
}

/// Everything the ledger needs to issue a fresh invoice for a sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDraft {
    pub property_id: PropertyId,
    pub seller_id: SellerId,
    pub listing_price: Decimal,
    pub commission_rate: CommissionRate,
    pub created_date: DateTime<Utc>,
}

/// Commission obligation recorded against a sold property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionInvoice {
    pub invoice_id: InvoiceId,
    pub property_id: PropertyId,
    pub seller_id: SellerId,
    pub listing_price: Decimal,
    pub commission_rate: CommissionRate,
    pub commission_amount: Decimal,
    pub status: InvoiceStatus,
    pub gateway_tran_id: Option<String>,
    pub gateway_val_id: Option<String>,
    pub gateway_status: Option<GatewayStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub transaction_id: Option<String>,
    pub proof_image_url: Option<String>,
    pub submitted_date: Option<DateTime<Utc>>,
    pub admin_note: Option<String>,
    pub verified_date: Option<DateTime<Utc>>,
    pub created_date: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by the ledger on every committed write.
    pub version: u64,
}

impl CommissionInvoice {
    pub fn issue(invoice_id: InvoiceId, draft: InvoiceDraft) -> Self {
        let InvoiceDraft {
            property_id,
            seller_id,
            listing_price,
            commission_rate,
            created_date,
        } = draft;

        Self {
            invoice_id,
            property_id,
            seller_id,
            listing_price,
            commission_rate,
            commission_amount: commission_amount(listing_price, commission_rate),
            status: InvoiceStatus::Unpaid,
            gateway_tran_id: None,
            gateway_val_id: None,
            gateway_status: None,
            payment_method: None,
            transaction_id: None,
            proof_image_url: None,
            submitted_date: None,
            admin_note: None,
            verified_date: None,
            created_date,
            version: 0,
        }
    }

    /// Applies a new rate and recomputes the amount from the stored listing price.
    pub fn reprice(&mut self, rate: CommissionRate) {
        self.commission_rate = rate;
        self.commission_amount = commission_amount(self.listing_price, rate);
    }

    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }
}

/// Caller identity, resolved per request and passed explicitly to every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Seller(SellerId),
    Admin { admin_id: String },
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin { .. })
    }

    /// Admins act for every seller; sellers only for themselves.
    pub fn acts_for(&self, seller_id: SellerId) -> bool {
        match self {
            Principal::Admin { .. } => true,
            Principal::Seller(id) => *id == seller_id,
        }
    }

    pub fn seller_scope(&self) -> Option<SellerId> {
        match self {
            Principal::Seller(id) => Some(*id),
            Principal::Admin { .. } => None,
        }
    }
}

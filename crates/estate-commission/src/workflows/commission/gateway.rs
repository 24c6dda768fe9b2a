use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::config::{GatewayConfig, GatewayCredentials};

use super::domain::InvoiceId;

const INIT_PATH: &str = "/gwprocess/v4/api.php";
const VALIDATION_PATH: &str = "/validator/api/validationserverAPI.php";
const CALLBACK_PREFIX: &str = "/payments/gateway";

/// Customer block sent with a payment session; the gateway rejects sessions without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl Default for CustomerDetails {
    fn default() -> Self {
        Self {
            name: "Seller".to_string(),
            email: "seller@example.com".to_string(),
            phone: "01700000000".to_string(),
        }
    }
}

/// Outbound payment session request for one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub invoice_id: InvoiceId,
    pub tran_id: String,
    pub amount: Decimal,
    pub customer: CustomerDetails,
}

/// Parsed answer of the validation endpoint, before any business checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub status: String,
    pub currency: Option<String>,
    pub amount: Option<Decimal>,
    pub bank_tran_id: Option<String>,
    pub tran_id: Option<String>,
}

/// Merchant-side view of the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fails when any merchant setting needed for an outbound call is missing.
    fn ensure_configured(&self) -> Result<(), GatewayError>;

    /// Opens a hosted payment session and returns the redirect target.
    async fn open_session(&self, request: &SessionRequest) -> Result<String, GatewayError>;

    /// Asks the gateway to confirm a validation token.
    async fn validate(&self, val_id: &str) -> Result<ValidationReport, GatewayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway is not configured: {key} is not set")]
    Configuration { key: &'static str },
    #[error("payment gateway timed out")]
    Timeout,
    #[error("payment gateway unreachable: {0}")]
    Network(String),
    #[error("payment gateway answered with HTTP {0}")]
    HttpStatus(u16),
    #[error("payment gateway returned an unexpected response: {0}")]
    Malformed(String),
    #[error("payment gateway refused the session (status {status}): {reason}")]
    SessionRejected { status: String, reason: String },
}

impl GatewayError {
    fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Network(error.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    failedreason: Option<String>,
    #[serde(default, rename = "GatewayPageURL")]
    gateway_page_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    status: String,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    amount: Option<AmountField>,
    #[serde(default)]
    bank_tran_id: Option<String>,
    #[serde(default)]
    tran_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AmountField {
    Text(String),
    Number(serde_json::Number),
}

impl AmountField {
    fn parse(&self) -> Result<Decimal, GatewayError> {
        let raw = match self {
            AmountField::Text(text) => text.trim().to_string(),
            AmountField::Number(number) => number.to_string(),
        };
        Decimal::from_str(&raw)
            .map_err(|_| GatewayError::Malformed(format!("amount `{raw}` is not a decimal")))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// HTTP client for the SSLCommerz-style hosted checkout.
#[derive(Debug, Clone)]
pub struct SslCommerzGateway {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl SslCommerzGateway {
    pub fn new(http: reqwest::Client, config: GatewayConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn credentials(&self) -> Result<GatewayCredentials<'_>, GatewayError> {
        self.config
            .credentials()
            .map_err(|missing| GatewayError::Configuration { key: missing.key })
    }

    async fn read_body(response: reqwest::Response, call: &str) -> Result<String, GatewayError> {
        let status = response.status();
        let body = response.text().await.map_err(GatewayError::from_transport)?;
        if !status.is_success() {
            tracing::warn!(call, http_status = status.as_u16(), body = %body, "gateway call failed");
            return Err(GatewayError::HttpStatus(status.as_u16()));
        }
        Ok(body)
    }
}

#[async_trait]
impl PaymentGateway for SslCommerzGateway {
    fn ensure_configured(&self) -> Result<(), GatewayError> {
        self.credentials().map(|_| ())
    }

    async fn open_session(&self, request: &SessionRequest) -> Result<String, GatewayError> {
        let credentials = self.credentials()?;
        let callback = |kind: &str| {
            format!(
                "{}{CALLBACK_PREFIX}/{kind}",
                credentials.callback_base_url
            )
        };
        let invoice_id = request.invoice_id.to_string();
        let total_amount = format!("{:.2}", request.amount.round_dp(2));

        let form: Vec<(&str, String)> = vec![
            ("store_id", credentials.store_id.to_string()),
            ("store_passwd", credentials.store_password.to_string()),
            ("total_amount", total_amount),
            ("currency", self.config.currency.clone()),
            ("tran_id", request.tran_id.clone()),
            ("success_url", callback("success")),
            ("fail_url", callback("fail")),
            ("cancel_url", callback("cancel")),
            ("ipn_url", callback("ipn")),
            ("product_name", "Property Commission".to_string()),
            ("product_category", "Service".to_string()),
            ("product_profile", "general".to_string()),
            ("shipping_method", "NO".to_string()),
            ("cart_id", request.tran_id.clone()),
            ("cus_name", request.customer.name.clone()),
            ("cus_email", request.customer.email.clone()),
            ("cus_add1", "Dhaka".to_string()),
            ("cus_city", "Dhaka".to_string()),
            ("cus_state", "Dhaka".to_string()),
            ("cus_postcode", "1200".to_string()),
            ("cus_country", "Bangladesh".to_string()),
            ("cus_phone", request.customer.phone.clone()),
            ("value_a", invoice_id),
        ];

        let response = self
            .http
            .post(format!("{}{INIT_PATH}", credentials.base_url))
            .timeout(self.config.init_timeout)
            .form(&form)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;
        let body = Self::read_body(response, "init").await?;

        let parsed: InitResponse = serde_json::from_str(&body).map_err(|error| {
            tracing::warn!(call = "init", body = %body, "gateway returned non-JSON body");
            GatewayError::Malformed(error.to_string())
        })?;

        match non_blank(parsed.gateway_page_url) {
            Some(url) => Ok(url),
            None => {
                let status = non_blank(parsed.status).unwrap_or_else(|| "UNKNOWN".to_string());
                let reason = non_blank(parsed.failedreason)
                    .unwrap_or_else(|| "no redirect target returned".to_string());
                tracing::warn!(
                    call = "init",
                    tran_id = %request.tran_id,
                    gateway_status = %status,
                    reason = %reason,
                    "gateway session not opened"
                );
                Err(GatewayError::SessionRejected { status, reason })
            }
        }
    }

    async fn validate(&self, val_id: &str) -> Result<ValidationReport, GatewayError> {
        let credentials = self.credentials()?;

        let response = self
            .http
            .get(format!("{}{VALIDATION_PATH}", credentials.base_url))
            .timeout(self.config.validate_timeout)
            .query(&[
                ("val_id", val_id),
                ("store_id", credentials.store_id),
                ("store_passwd", credentials.store_password),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(GatewayError::from_transport)?;
        let body = Self::read_body(response, "validate").await?;

        let parsed: ValidationResponse = serde_json::from_str(&body).map_err(|error| {
            tracing::warn!(call = "validate", body = %body, "gateway returned unexpected validation body");
            GatewayError::Malformed(error.to_string())
        })?;

        let amount = parsed.amount.as_ref().map(AmountField::parse).transpose()?;

        Ok(ValidationReport {
            status: parsed.status.trim().to_string(),
            currency: non_blank(parsed.currency),
            amount,
            bank_tran_id: non_blank(parsed.bank_tran_id),
            tran_id: non_blank(parsed.tran_id),
        })
    }
}

use std::sync::Arc;

use axum::{
    extract::{rejection::FormRejection, FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use super::callbacks::{CallbackOutcome, CallbackParams, IgnoredReason};
use super::domain::{GatewayStatus, InvoiceId, InvoiceStatus, Principal, PropertyId, SellerId};
use super::gateway::PaymentGateway;
use super::ledger::{InvoiceLedger, LedgerError};
use super::manual::{AdminDecision, ProofSubmission};
use super::notify::NotificationDispatcher;
use super::service::{ActionResult, CommissionError, CommissionService};

pub const PRINCIPAL_ROLE_HEADER: &str = "x-principal-role";
pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";

/// Router exposing the commission workflows and the gateway callback endpoints.
pub fn commission_router<L, G, N>(service: Arc<CommissionService<L, G, N>>) -> Router
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    Router::new()
        .route(
            "/api/v1/properties/:property_id/sold",
            post(mark_sold_handler::<L, G, N>),
        )
        .route(
            "/api/v1/commission/invoices",
            get(list_handler::<L, G, N>),
        )
        .route(
            "/api/v1/commission/invoices/:invoice_id",
            get(invoice_handler::<L, G, N>),
        )
        .route(
            "/api/v1/commission/invoices/:invoice_id/receipt",
            get(receipt_handler::<L, G, N>),
        )
        .route(
            "/api/v1/commission/invoices/:invoice_id/gateway/init",
            post(init_handler::<L, G, N>),
        )
        .route(
            "/api/v1/commission/invoices/:invoice_id/proof",
            post(proof_handler::<L, G, N>),
        )
        .route(
            "/api/v1/commission/invoices/:invoice_id/approve",
            post(approve_handler::<L, G, N>),
        )
        .route(
            "/api/v1/commission/invoices/:invoice_id/reject",
            post(reject_handler::<L, G, N>),
        )
        .route(
            "/api/v1/commission/revenue",
            get(revenue_handler::<L, G, N>),
        )
        .route("/payments/gateway/success", post(success_handler::<L, G, N>))
        .route("/payments/gateway/fail", post(fail_handler::<L, G, N>))
        .route("/payments/gateway/cancel", post(cancel_handler::<L, G, N>))
        .route("/payments/gateway/ipn", post(ipn_handler::<L, G, N>))
        .with_state(service)
}

/// Caller identity injected by the upstream authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPrincipal(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestPrincipal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let role = header_value(parts, PRINCIPAL_ROLE_HEADER);
        let id = header_value(parts, PRINCIPAL_ID_HEADER);

        let principal = match (role, id) {
            (Some(role), Some(id)) if role.eq_ignore_ascii_case("admin") => Some(Principal::Admin {
                admin_id: id.to_string(),
            }),
            (Some(role), Some(id)) if role.eq_ignore_ascii_case("seller") => {
                id.parse::<u64>().ok().map(|id| Principal::Seller(SellerId(id)))
            }
            _ => None,
        };

        principal.map(RequestPrincipal).ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ActionResult::failure("missing or invalid principal")),
            )
                .into_response()
        })
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn status_for(error: &CommissionError) -> StatusCode {
    match error {
        CommissionError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        CommissionError::Network(_)
        | CommissionError::MalformedResponse(_)
        | CommissionError::SessionRejected(_) => StatusCode::BAD_GATEWAY,
        CommissionError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        CommissionError::ValidationMismatch(_)
        | CommissionError::InvalidRate(_)
        | CommissionError::InvalidAmount(_)
        | CommissionError::InvalidSubmission(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CommissionError::InvalidStateTransition { .. }
        | CommissionError::ListingNotAvailable(_) => StatusCode::CONFLICT,
        CommissionError::InvoiceNotFound(_) | CommissionError::PropertyNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        CommissionError::Forbidden(_) => StatusCode::FORBIDDEN,
        CommissionError::Ledger(LedgerError::VersionConflict { .. }) => StatusCode::CONFLICT,
        CommissionError::Ledger(LedgerError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        CommissionError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: CommissionError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::warn!(%error, retryable = error.is_retryable(), "commission request failed");
    }
    (status, Json(ActionResult::failure(error.user_message()))).into_response()
}

fn invoice_path(invoice_id: InvoiceId) -> String {
    format!("/api/v1/commission/invoices/{invoice_id}")
}

pub(crate) async fn mark_sold_handler<L, G, N>(
    State(service): State<Arc<CommissionService<L, G, N>>>,
    RequestPrincipal(principal): RequestPrincipal,
    Path(property_id): Path<u64>,
) -> Response
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.mark_sold(&principal, PropertyId(property_id)) {
        Ok(receipt) => {
            let status = if receipt.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(receipt)).into_response()
        }
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListParams {
    #[serde(default)]
    status: Option<InvoiceStatus>,
}

pub(crate) async fn list_handler<L, G, N>(
    State(service): State<Arc<CommissionService<L, G, N>>>,
    RequestPrincipal(principal): RequestPrincipal,
    Query(params): Query<ListParams>,
) -> Response
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.list(&principal, params.status) {
        Ok(invoices) => (StatusCode::OK, Json(invoices)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn invoice_handler<L, G, N>(
    State(service): State<Arc<CommissionService<L, G, N>>>,
    RequestPrincipal(principal): RequestPrincipal,
    Path(invoice_id): Path<u64>,
) -> Response
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.get(&principal, InvoiceId(invoice_id)) {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn receipt_handler<L, G, N>(
    State(service): State<Arc<CommissionService<L, G, N>>>,
    RequestPrincipal(principal): RequestPrincipal,
    Path(invoice_id): Path<u64>,
) -> Response
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.receipt(&principal, InvoiceId(invoice_id)) {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InitRequest {
    #[serde(default)]
    commission_rate_percent: Option<u8>,
}

pub(crate) async fn init_handler<L, G, N>(
    State(service): State<Arc<CommissionService<L, G, N>>>,
    RequestPrincipal(principal): RequestPrincipal,
    Path(invoice_id): Path<u64>,
    body: Option<Json<InitRequest>>,
) -> Response
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    let request = body.map(|Json(request)| request).unwrap_or_default();
    match service
        .init_payment(&principal, InvoiceId(invoice_id), request.commission_rate_percent)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn proof_handler<L, G, N>(
    State(service): State<Arc<CommissionService<L, G, N>>>,
    RequestPrincipal(principal): RequestPrincipal,
    Path(invoice_id): Path<u64>,
    Json(submission): Json<ProofSubmission>,
) -> Response
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    let invoice_id = InvoiceId(invoice_id);
    match service.submit_proof(&principal, invoice_id, submission) {
        Ok(_) => {
            let result = ActionResult::ok("Payment proof submitted. Waiting for admin verification.")
                .with_target(invoice_path(invoice_id));
            (StatusCode::ACCEPTED, Json(result)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn approve_handler<L, G, N>(
    State(service): State<Arc<CommissionService<L, G, N>>>,
    RequestPrincipal(principal): RequestPrincipal,
    Path(invoice_id): Path<u64>,
    body: Option<Json<AdminDecision>>,
) -> Response
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    let decision = body.map(|Json(decision)| decision).unwrap_or_default();
    let invoice_id = InvoiceId(invoice_id);
    match service.approve(&principal, invoice_id, decision) {
        Ok(_) => {
            let result = ActionResult::ok("Commission payment approved.")
                .with_target(invoice_path(invoice_id));
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reject_handler<L, G, N>(
    State(service): State<Arc<CommissionService<L, G, N>>>,
    RequestPrincipal(principal): RequestPrincipal,
    Path(invoice_id): Path<u64>,
    body: Option<Json<AdminDecision>>,
) -> Response
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    let decision = body.map(|Json(decision)| decision).unwrap_or_default();
    let invoice_id = InvoiceId(invoice_id);
    match service.reject(&principal, invoice_id, decision) {
        Ok(_) => {
            let result = ActionResult::ok("Commission payment rejected.")
                .with_target(invoice_path(invoice_id));
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RevenueParams {
    from: NaiveDate,
    to: NaiveDate,
}

pub(crate) async fn revenue_handler<L, G, N>(
    State(service): State<Arc<CommissionService<L, G, N>>>,
    RequestPrincipal(principal): RequestPrincipal,
    Query(params): Query<RevenueParams>,
) -> Response
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    match service.revenue(&principal, params.from, params.to) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

fn callback_params(form: Result<Form<CallbackParams>, FormRejection>) -> CallbackParams {
    match form {
        Ok(Form(params)) => params,
        Err(rejection) => {
            tracing::warn!(%rejection, "unreadable gateway callback body");
            CallbackParams::default()
        }
    }
}

fn callback_response(outcome: Result<CallbackOutcome, CommissionError>) -> Response {
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(error) => return error_response(error),
    };

    let (status, result) = match &outcome {
        CallbackOutcome::Paid { .. } => (
            StatusCode::OK,
            ActionResult::ok("Commission paid successfully."),
        ),
        CallbackOutcome::AlreadyPaid { .. } => (
            StatusCode::OK,
            ActionResult::ok("Payment already confirmed."),
        ),
        CallbackOutcome::Recorded { gateway_status, .. } => {
            let message = match gateway_status {
                GatewayStatus::Cancelled => "Payment cancelled.",
                _ => "Payment failed. Please try again.",
            };
            (StatusCode::OK, ActionResult::failure(message))
        }
        CallbackOutcome::Superseded { .. } => (
            StatusCode::CONFLICT,
            ActionResult::failure("This payment session is no longer current."),
        ),
        CallbackOutcome::Ignored(IgnoredReason::MissingFields) => (
            StatusCode::BAD_REQUEST,
            ActionResult::failure("Invalid payment callback."),
        ),
        CallbackOutcome::Ignored(IgnoredReason::UnknownTransaction) => (
            StatusCode::NOT_FOUND,
            ActionResult::failure("Invoice not found for this transaction."),
        ),
    };

    let result = match outcome.invoice_id() {
        Some(invoice_id) => result.with_target(invoice_path(invoice_id)),
        None => result,
    };
    (status, Json(result)).into_response()
}

pub(crate) async fn success_handler<L, G, N>(
    State(service): State<Arc<CommissionService<L, G, N>>>,
    form: Result<Form<CallbackParams>, FormRejection>,
) -> Response
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    let params = callback_params(form);
    callback_response(service.handle_success(&params).await)
}

pub(crate) async fn fail_handler<L, G, N>(
    State(service): State<Arc<CommissionService<L, G, N>>>,
    form: Result<Form<CallbackParams>, FormRejection>,
) -> Response
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    let params = callback_params(form);
    callback_response(service.handle_fail(&params))
}

pub(crate) async fn cancel_handler<L, G, N>(
    State(service): State<Arc<CommissionService<L, G, N>>>,
    form: Result<Form<CallbackParams>, FormRejection>,
) -> Response
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    let params = callback_params(form);
    callback_response(service.handle_cancel(&params))
}

/// The gateway retries any non-200 answer, so IPN always acknowledges.
pub(crate) async fn ipn_handler<L, G, N>(
    State(service): State<Arc<CommissionService<L, G, N>>>,
    form: Result<Form<CallbackParams>, FormRejection>,
) -> Response
where
    L: InvoiceLedger + 'static,
    G: PaymentGateway + 'static,
    N: NotificationDispatcher + 'static,
{
    let params = callback_params(form);
    let result = match service.handle_ipn(&params).await {
        Ok(outcome) => {
            tracing::info!(outcome = ?outcome, "ipn processed");
            ActionResult::ok("IPN received.")
        }
        Err(error) => {
            tracing::warn!(%error, "ipn processing failed");
            ActionResult::failure(error.user_message())
        }
    };
    (StatusCode::OK, Json(result)).into_response()
}

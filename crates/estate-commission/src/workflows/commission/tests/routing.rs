use super::common::*;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::workflows::commission::{
    commission_router, InvoiceStatus, PRINCIPAL_ID_HEADER, PRINCIPAL_ROLE_HEADER,
};

fn request(method: Method, uri: &str, role: Option<(&str, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((role, id)) = role {
        builder = builder
            .header(PRINCIPAL_ROLE_HEADER, role)
            .header(PRINCIPAL_ID_HEADER, id);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

fn form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("request")
}

const SELLER: Option<(&str, &str)> = Some(("seller", "10"));
const ADMIN: Option<(&str, &str)> = Some(("admin", "ops-1"));

#[tokio::test]
async fn requests_without_a_principal_are_unauthorized() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    let router = commission_router(harness.service.clone());

    let response = router
        .clone()
        .oneshot(request(Method::GET, "/api/v1/commission/invoices", None, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .oneshot(request(
            Method::GET,
            "/api/v1/commission/invoices",
            Some(("seller", "not-a-number")),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json_body(response).await;
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn sale_then_gateway_init_returns_redirect_target() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    let router = commission_router(harness.service.clone());

    let response = router
        .clone()
        .oneshot(request(Method::POST, "/api/v1/properties/1/sold", SELLER, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["created"], json!(true));
    assert_eq!(body["invoice"]["status"], json!("unpaid"));

    let response = router
        .oneshot(request(
            Method::POST,
            "/api/v1/commission/invoices/1/gateway/init",
            SELLER,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["redirect_target"], json!(REDIRECT_URL));
}

#[tokio::test]
async fn gateway_timeout_maps_to_gateway_timeout_status() {
    let harness =
        Harness::new(FakeGateway::confirming("30000.00").with_session(SessionScript::Timeout));
    harness.sold();
    let router = commission_router(harness.service.clone());

    let response = router
        .oneshot(request(
            Method::POST,
            "/api/v1/commission/invoices/1/gateway/init",
            SELLER,
            Some(json!({})),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = read_json_body(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["redirect_target"], Value::Null);
}

#[tokio::test]
async fn success_callback_form_marks_invoice_paid() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    let invoice = harness.initiated().await;
    let tran_id = invoice.gateway_tran_id.clone().expect("tran id");
    let router = commission_router(harness.service.clone());

    let response = router
        .oneshot(form(
            "/payments/gateway/success",
            &format!("tran_id={tran_id}&val_id=VAL-1&status=VALID"),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(
        body["redirect_target"],
        json!(format!("/api/v1/commission/invoices/{}", invoice.invoice_id))
    );
    assert_eq!(
        harness.stored(invoice.invoice_id).status,
        InvoiceStatus::Paid
    );
}

#[tokio::test]
async fn ipn_always_acknowledges() {
    let harness = Harness::new(FakeGateway::confirming("29999.00"));
    let invoice = harness.initiated().await;
    let tran_id = invoice.gateway_tran_id.clone().expect("tran id");
    let router = commission_router(harness.service.clone());

    let unknown = router
        .clone()
        .oneshot(form("/payments/gateway/ipn", "tran_id=nope&val_id=VAL-1"))
        .await
        .expect("response");
    assert_eq!(unknown.status(), StatusCode::OK);

    let mismatch = router
        .clone()
        .oneshot(form(
            "/payments/gateway/ipn",
            &format!("tran_id={tran_id}&val_id=VAL-1"),
        ))
        .await
        .expect("response");
    assert_eq!(mismatch.status(), StatusCode::OK);

    let garbage = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/payments/gateway/ipn")
                .body(Body::from("not a form"))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(garbage.status(), StatusCode::OK);
    assert_eq!(
        harness.stored(invoice.invoice_id).status,
        InvoiceStatus::Unpaid
    );
}

#[tokio::test]
async fn browser_callbacks_report_failures() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    let invoice = harness.initiated().await;
    let tran_id = invoice.gateway_tran_id.clone().expect("tran id");
    let router = commission_router(harness.service.clone());

    let missing = router
        .clone()
        .oneshot(form("/payments/gateway/success", "tran_id="))
        .await
        .expect("response");
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let cancelled = router
        .oneshot(form(
            "/payments/gateway/cancel",
            &format!("tran_id={tran_id}"),
        ))
        .await
        .expect("response");
    assert_eq!(cancelled.status(), StatusCode::OK);
    let body = read_json_body(cancelled).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["message"], json!("Payment cancelled."));
}

#[tokio::test]
async fn manual_flow_over_http() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    harness.sold();
    let router = commission_router(harness.service.clone());

    let invalid = router
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/commission/invoices/1/proof",
            SELLER,
            Some(json!({
                "commission_rate_percent": 6,
                "payment_method": "bank",
                "transaction_id": "TT-1",
                "proof_image_url": "/uploads/tt-1.png"
            })),
        ))
        .await
        .expect("response");
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let accepted = router
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/commission/invoices/1/proof",
            SELLER,
            Some(json!({
                "commission_rate_percent": 3,
                "payment_method": "bank",
                "transaction_id": "TT-1",
                "proof_image_url": "/uploads/tt-1.png"
            })),
        ))
        .await
        .expect("response");
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);

    let forbidden = router
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/commission/invoices/1/approve",
            SELLER,
            Some(json!({ "admin_note": "mine" })),
        ))
        .await
        .expect("response");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let approved = router
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/commission/invoices/1/approve",
            ADMIN,
            Some(json!({ "admin_note": "matched statement" })),
        ))
        .await
        .expect("response");
    assert_eq!(approved.status(), StatusCode::OK);

    let again = router
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/commission/invoices/1/reject",
            ADMIN,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let receipt = router
        .oneshot(request(
            Method::GET,
            "/api/v1/commission/invoices/1/receipt",
            SELLER,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(receipt.status(), StatusCode::OK);
    let body = read_json_body(receipt).await;
    assert_eq!(body["transaction_id"], json!("TT-1"));
    assert_eq!(body["payment_method"], json!("Bank"));
}

#[tokio::test]
async fn revenue_and_listing_queries() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    harness.sold();
    let router = commission_router(harness.service.clone());

    let listed = router
        .clone()
        .oneshot(request(
            Method::GET,
            "/api/v1/commission/invoices?status=unpaid",
            ADMIN,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(listed.status(), StatusCode::OK);
    let body = read_json_body(listed).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let revenue = router
        .clone()
        .oneshot(request(
            Method::GET,
            "/api/v1/commission/revenue?from=2025-01-01&to=2025-02-01",
            ADMIN,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(revenue.status(), StatusCode::OK);
    let body = read_json_body(revenue).await;
    assert_eq!(body["invoice_count"], json!(0));

    let missing = router
        .oneshot(request(
            Method::GET,
            "/api/v1/commission/invoices/42",
            ADMIN,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

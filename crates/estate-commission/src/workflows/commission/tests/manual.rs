use super::common::*;
use rust_decimal_macros::dec;

use crate::workflows::commission::{
    AdminDecision, CommissionError, InvoiceStatus, PaymentMethod,
};

#[test]
fn submission_reprices_and_queues_for_review() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    let invoice = harness.sold();

    let pending = harness
        .service
        .submit_proof(&seller(), invoice.invoice_id, proof(4))
        .expect("proof accepted");

    assert_eq!(pending.status, InvoiceStatus::PendingVerification);
    assert_eq!(pending.commission_rate.percent(), 4);
    assert_eq!(pending.commission_amount, dec!(40000.00));
    assert_eq!(pending.payment_method, Some(PaymentMethod::Bkash));
    assert_eq!(pending.transaction_id.as_deref(), Some("BK-7781"));
    assert!(pending.submitted_date.is_some());
    assert_eq!(harness.sent_to(ADMIN_EMAIL), 1);
}

#[test]
fn out_of_range_rate_is_rejected_before_persistence() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    let invoice = harness.sold();

    let err = harness
        .service
        .submit_proof(&seller(), invoice.invoice_id, proof(6))
        .unwrap_err();

    assert!(matches!(err, CommissionError::InvalidRate(_)));
    assert_eq!(harness.stored(invoice.invoice_id), invoice);
    assert!(harness.notifier.sent().is_empty());
}

#[test]
fn blank_proof_fields_are_rejected() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    let invoice = harness.sold();
    let mut submission = proof(3);
    submission.transaction_id = "  ".to_string();

    let err = harness
        .service
        .submit_proof(&seller(), invoice.invoice_id, submission)
        .unwrap_err();

    assert!(matches!(err, CommissionError::InvalidSubmission(_)));
    assert_eq!(harness.stored(invoice.invoice_id), invoice);
}

#[test]
fn approval_pays_the_invoice_and_notifies_the_seller() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    let invoice = harness.sold();
    harness
        .service
        .submit_proof(&seller(), invoice.invoice_id, proof(3))
        .expect("proof accepted");

    let paid = harness
        .service
        .approve(&admin(), invoice.invoice_id, note("matched bKash statement"))
        .expect("approved");

    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert_eq!(paid.admin_note.as_deref(), Some("matched bKash statement"));
    assert!(paid.verified_date.is_some());
    assert_eq!(harness.sent_to(SELLER_EMAIL), 1);
}

#[test]
fn rejection_allows_resubmission() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    let invoice = harness.sold();
    harness
        .service
        .submit_proof(&seller(), invoice.invoice_id, proof(3))
        .expect("proof accepted");

    let rejected = harness
        .service
        .reject(&admin(), invoice.invoice_id, AdminDecision::default())
        .expect("rejected");
    assert_eq!(rejected.status, InvoiceStatus::Rejected);
    assert!(rejected.verified_date.is_some());
    assert_eq!(rejected.admin_note, None);

    let resubmitted = harness
        .service
        .submit_proof(&seller(), invoice.invoice_id, proof(2))
        .expect("resubmission accepted");
    assert_eq!(resubmitted.status, InvoiceStatus::PendingVerification);
    assert_eq!(resubmitted.commission_amount, dec!(20000.00));
}

#[test]
fn decisions_outside_pending_review_change_nothing() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    let invoice = harness.sold();

    let err = harness
        .service
        .approve(&admin(), invoice.invoice_id, note("early"))
        .unwrap_err();
    assert!(matches!(
        err,
        CommissionError::InvalidStateTransition {
            from: InvoiceStatus::Unpaid,
            ..
        }
    ));
    let err = harness
        .service
        .reject(&admin(), invoice.invoice_id, note("early"))
        .unwrap_err();
    assert!(matches!(err, CommissionError::InvalidStateTransition { .. }));
    assert_eq!(harness.stored(invoice.invoice_id), invoice);
    assert!(harness.notifier.sent().is_empty());
}

#[test]
fn sellers_cannot_decide_and_paid_invoices_take_no_proof() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    let invoice = harness.sold();
    harness
        .service
        .submit_proof(&seller(), invoice.invoice_id, proof(3))
        .expect("proof accepted");

    let err = harness
        .service
        .approve(&seller(), invoice.invoice_id, note("self approve"))
        .unwrap_err();
    assert!(matches!(err, CommissionError::Forbidden(_)));

    harness
        .service
        .approve(&admin(), invoice.invoice_id, AdminDecision::default())
        .expect("approved");
    let paid = harness.stored(invoice.invoice_id);
    let err = harness
        .service
        .submit_proof(&seller(), invoice.invoice_id, proof(3))
        .unwrap_err();
    assert!(matches!(
        err,
        CommissionError::InvalidStateTransition {
            from: InvoiceStatus::Paid,
            ..
        }
    ));
    assert_eq!(harness.stored(invoice.invoice_id), paid);
}

#[test]
fn another_seller_cannot_submit_proof() {
    let harness = Harness::new(FakeGateway::confirming("30000.00"));
    let invoice = harness.sold();

    let err = harness
        .service
        .submit_proof(&other_seller(), invoice.invoice_id, proof(3))
        .unwrap_err();

    assert!(matches!(err, CommissionError::Forbidden(_)));
}

use chrono::{Duration, Utc};
use clap::Args;
use estate_commission::config::GatewayConfig;
use estate_commission::error::AppError;
use estate_commission::workflows::commission::{
    AdminDecision, CommissionService, InMemoryInvoiceLedger, ListingSnapshot, ListingStatus,
    PaymentMethod, Principal, PropertyId, ProofSubmission, RecordingNotifier, SellerId,
    SslCommerzGateway, WorkflowSettings,
};
use estate_commission::workflows::listings::{ListingImporter, ListingSummary};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Listing price of the demo property.
    #[arg(long, default_value = "8500000")]
    pub(crate) price: Decimal,
    /// Commission rate (percent) the seller reports with the manual payment.
    #[arg(long, default_value_t = 3)]
    pub(crate) rate: u8,
    /// Skip the admin approval so the invoice stays pending verification.
    #[arg(long)]
    pub(crate) skip_approval: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ListingsCheckArgs {
    /// Listing CSV export (Property ID, Seller ID, Title, Price, Commission Rate, Status, Seller Email)
    pub(crate) path: PathBuf,
    /// Print every parsed listing, not just the summary
    #[arg(long)]
    pub(crate) list: bool,
}

pub(crate) fn run_listings_check(args: ListingsCheckArgs) -> Result<(), AppError> {
    let listings = ListingImporter::from_path(&args.path)?;
    let summary = ListingSummary::from_listings(&listings);

    println!("Listing export {}", args.path.display());
    println!(
        "- {} listings | {} available for sale",
        summary.total, summary.available
    );
    println!(
        "- {} with an out-of-range commission rate (sale falls back to the default)",
        summary.rate_out_of_range
    );
    println!(
        "- {} without a seller email (seller notifications skipped)",
        summary.missing_seller_email
    );

    if args.list {
        for listing in &listings {
            println!(
                "  - #{} {} | seller #{} | {} | {}% | {}",
                listing.property_id,
                listing.title,
                listing.seller_id,
                listing.price,
                listing.commission_rate_percent,
                listing.status
            );
        }
    }
    Ok(())
}

type DemoService = CommissionService<InMemoryInvoiceLedger, SslCommerzGateway, RecordingNotifier>;

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        price,
        rate,
        skip_approval,
    } = args;

    let property_id = PropertyId(1);
    let seller = Principal::Seller(SellerId(10));
    let admin = Principal::Admin {
        admin_id: "demo-admin".to_string(),
    };
    let listing = ListingSnapshot {
        property_id,
        seller_id: SellerId(10),
        title: "Lakeview Apartment, Gulshan".to_string(),
        price,
        commission_rate_percent: rate,
        status: ListingStatus::Available,
        seller_email: Some("seller@example.com".to_string()),
    };

    let notifier = Arc::new(RecordingNotifier::default());
    let settings = WorkflowSettings {
        admin_email: Some("admin@example.com".to_string()),
        ..WorkflowSettings::default()
    };
    let service: DemoService = CommissionService::new(
        Arc::new(InMemoryInvoiceLedger::with_listings([listing])),
        Arc::new(SslCommerzGateway::new(
            reqwest::Client::new(),
            GatewayConfig::default(),
        )),
        notifier.clone(),
        settings,
    );

    println!("Commission payment demo");
    let receipt = match service.mark_sold(&seller, property_id) {
        Ok(receipt) => receipt,
        Err(err) => {
            println!("  Sale rejected: {}", err.user_message());
            return Ok(());
        }
    };
    let invoice_id = receipt.invoice.invoice_id;
    println!(
        "- Property #{} sold -> invoice #{} for {} {} ({}% of {})",
        property_id,
        invoice_id,
        receipt.invoice.commission_amount,
        service.settings().currency,
        receipt.invoice.commission_rate.percent(),
        receipt.invoice.listing_price
    );

    match service.init_payment(&seller, invoice_id, None).await {
        Ok(result) => println!("- Online payment opened: {:?}", result.redirect_target),
        Err(err) => println!("- Online payment unavailable: {}", err.user_message()),
    }

    let submission = ProofSubmission {
        commission_rate_percent: rate,
        payment_method: PaymentMethod::Bkash,
        transaction_id: "BK-DEMO-0001".to_string(),
        proof_image_url: "/uploads/proofs/bk-demo-0001.jpg".to_string(),
    };
    match service.submit_proof(&seller, invoice_id, submission) {
        Ok(invoice) => println!("- Manual proof submitted -> status {}", invoice.status),
        Err(err) => {
            println!("  Proof rejected: {}", err.user_message());
            return Ok(());
        }
    }

    if skip_approval {
        print_notifications(&notifier);
        return Ok(());
    }

    let decision = AdminDecision {
        admin_note: Some("Matched against the bKash statement".to_string()),
    };
    match service.approve(&admin, invoice_id, decision) {
        Ok(invoice) => println!("- Admin approved -> status {}", invoice.status),
        Err(err) => {
            println!("  Approval failed: {}", err.user_message());
            return Ok(());
        }
    }

    match service.receipt(&seller, invoice_id) {
        Ok(view) => println!(
            "- Receipt: {} {} via {} (transaction {})",
            view.amount_paid,
            service.settings().currency,
            view.payment_method,
            view.transaction_id.as_deref().unwrap_or("n/a")
        ),
        Err(err) => println!("  Receipt unavailable: {}", err.user_message()),
    }

    let today = Utc::now().date_naive();
    match service.revenue(&admin, today, today + Duration::days(1)) {
        Ok(summary) => println!(
            "- Revenue today: {} invoice(s), {} {}",
            summary.invoice_count,
            summary.total_commission,
            service.settings().currency
        ),
        Err(err) => println!("  Revenue unavailable: {}", err.user_message()),
    }

    print_notifications(&notifier);
    Ok(())
}

fn print_notifications(notifier: &RecordingNotifier) {
    println!("Notifications sent:");
    for notification in notifier.sent() {
        println!("  - to {}: {}", notification.to, notification.subject);
    }
}

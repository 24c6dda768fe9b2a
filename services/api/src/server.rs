use crate::cli::ServeArgs;
use crate::infra::{AppState, LiveCommissionService, LiveNotifier};
use crate::routes::with_commission_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use estate_commission::config::AppConfig;
use estate_commission::error::AppError;
use estate_commission::telemetry;
use estate_commission::workflows::commission::{
    CommissionService, InMemoryInvoiceLedger, SslCommerzGateway, WorkflowSettings,
};
use estate_commission::workflows::listings::{ListingImporter, ListingSummary};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let ledger = match args.listings.take() {
        Some(path) => {
            let listings = ListingImporter::from_path(&path)?;
            let summary = ListingSummary::from_listings(&listings);
            info!(
                path = %path.display(),
                total = summary.total,
                available = summary.available,
                "listings loaded"
            );
            if summary.rate_out_of_range > 0 {
                warn!(
                    count = summary.rate_out_of_range,
                    "listings with an out-of-range commission rate will use the default"
                );
            }
            InMemoryInvoiceLedger::with_listings(listings)
        }
        None => InMemoryInvoiceLedger::new(),
    };

    if config.gateway.credentials().is_err() {
        warn!("payment gateway is not configured; online payments are disabled");
    }
    let settings = WorkflowSettings::from_config(&config.gateway, &config.notifications);
    let http = reqwest::Client::builder().build()?;
    let gateway = SslCommerzGateway::new(http, config.gateway.clone());
    let notifier = LiveNotifier::from_config(&config.notifications)?;
    info!(transport = notifier.kind(), "notifications configured");

    let service: Arc<LiveCommissionService> = Arc::new(CommissionService::new(
        Arc::new(ledger),
        Arc::new(gateway),
        Arc::new(notifier),
        settings,
    ));

    let app = with_commission_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "commission service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

//! VendCredit Backend Server
//!
//! HTTP API for vendor-financed credit: applications, offers, mandates,
//! loans, repayments and wallets.

use axum::http::{HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use vendcredit_server::application::ApplicationService;
use vendcredit_server::config::Config;
use vendcredit_server::db;
use vendcredit_server::events::EventDispatcher;
use vendcredit_server::identifier::{IdentifierGenerator, RandomIdentifierGenerator};
use vendcredit_server::ledger::LedgerService;
use vendcredit_server::lender::LenderService;
use vendcredit_server::loan::LoanService;
use vendcredit_server::mandate::MandateService;
use vendcredit_server::middleware::{self, RateLimiter};
use vendcredit_server::offer::OfferService;
use vendcredit_server::providers::{
    HttpCreditScorer, HttpIdentityVerifier, HttpMandateProvider, MandateProvider, ProviderClient,
};
use vendcredit_server::repayment::RepaymentService;
use vendcredit_server::state::AppState;
use vendcredit_server::webhook::WebhookService;

const RATE_LIMIT_CLEANUP_EVERY: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting VendCredit server");

    let db_pool = db::create_pool(&config).await?;
    db::run_migrations(&db_pool).await?;

    let (events, _dispatcher) = EventDispatcher::start(db_pool.clone(), config.providers.timeout);
    let identifiers: Arc<dyn IdentifierGenerator> = Arc::new(RandomIdentifierGenerator);

    // Outbound provider collaborators
    let mandate_provider: Arc<dyn MandateProvider> = Arc::new(HttpMandateProvider::new(
        ProviderClient::from_config(&config.providers, config.providers.mandate_api_key.clone()),
        config.providers.mandate_url.clone(),
    ));
    let scorer = Arc::new(HttpCreditScorer::new(
        ProviderClient::from_config(&config.providers, None),
        config.providers.scoring_url.clone(),
    ));
    let identity = Arc::new(HttpIdentityVerifier::new(
        ProviderClient::from_config(&config.providers, None),
        config.providers.kyc_url.clone(),
    ));

    if config.webhooks.is_empty() {
        tracing::warn!("No WEBHOOK_SECRET_<PROVIDER> configured - all webhooks will be rejected");
    }

    let offer_service = Arc::new(OfferService::new(
        db_pool.clone(),
        identifiers.clone(),
        scorer,
        events.clone(),
        config.credit.min_credit_score_percent,
        config.credit.offer_validity_days,
    ));
    let repayment_service = Arc::new(RepaymentService::new(
        db_pool.clone(),
        mandate_provider.clone(),
        identifiers.clone(),
        events.clone(),
    ));

    let app_state = AppState {
        db_pool: db_pool.clone(),
        application_service: Arc::new(ApplicationService::new(
            db_pool.clone(),
            config.credit.rate_table.clone(),
            identifiers.clone(),
            identity,
            events.clone(),
        )),
        lender_service: Arc::new(LenderService::new(db_pool.clone(), identifiers.clone())),
        offer_service: offer_service.clone(),
        mandate_service: Arc::new(MandateService::new(
            db_pool.clone(),
            mandate_provider,
            identifiers.clone(),
            events.clone(),
            config.credit.mandate_activation_window_hours,
        )),
        loan_service: Arc::new(LoanService::new(
            db_pool.clone(),
            identifiers.clone(),
            events.clone(),
        )),
        repayment_service: repayment_service.clone(),
        ledger_service: Arc::new(LedgerService::new(db_pool.clone())),
        webhook_service: Arc::new(WebhookService::new(
            db_pool.clone(),
            config.webhooks.clone(),
            events,
        )),
    };

    // Start the due-repayment sweep in background
    if let Some(every) = config.due_sweep_interval {
        let stale_after = chrono::Duration::from_std(config.stale_collection_after)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        tokio::spawn(async move {
            tracing::info!(every_secs = every.as_secs(), "Due sweep task started");
            due_sweep(repayment_service, offer_service, every, stale_after).await;
            tracing::error!("Due sweep task exited unexpectedly");
        });
    }

    let rate_limiter = RateLimiter::new(config.rate_limit_rps);
    middleware::spawn_cleanup(rate_limiter.clone(), RATE_LIMIT_CLEANUP_EVERY);

    let mut app = vendcredit_server::build_router(app_state, rate_limiter)
        .layer(configure_cors(config.cors_allowed_origins.as_deref()));
    if config.environment.is_production() {
        app = app.layer(axum::middleware::from_fn(middleware::hsts_header));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Collect today's instalments, chase collections stuck in flight and
/// expire stale offers on every tick
async fn due_sweep(
    repayments: Arc<RepaymentService>,
    offers: Arc<OfferService>,
    every: Duration,
    stale_after: chrono::Duration,
) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;

        let today = chrono::Utc::now().date_naive();
        match repayments.process_due_repayments(today).await {
            Ok(report) => tracing::info!(
                date = %today,
                loans = report.loans,
                paid = report.paid,
                failed = report.failed,
                pending = report.pending,
                errors = report.errors,
                "Due sweep finished"
            ),
            Err(e) => tracing::error!(date = %today, error = %e, "Due sweep failed"),
        }

        match repayments.reconcile_stale_collections(stale_after).await {
            Ok(report) if report.collections == 0 => {}
            Ok(report) => tracing::info!(
                collections = report.collections,
                paid = report.paid,
                failed = report.failed,
                pending = report.pending,
                errors = report.errors,
                "Stale collections reconciled"
            ),
            Err(e) => tracing::error!(error = %e, "Stale collection reconciliation failed"),
        }

        match offers.expire_offers(chrono::Utc::now()).await {
            Ok(0) => {}
            Ok(expired) => tracing::info!(expired, "Stale offers expired"),
            Err(e) => tracing::error!(error = %e, "Offer expiry failed"),
        }
    }
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allowed_origins = allowed_origins.unwrap_or_default();

    if allowed_origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

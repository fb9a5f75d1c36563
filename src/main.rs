mod config;
mod db;
mod models;
mod responses;
mod routes;
mod services;
mod state;
pub mod utils;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::http::Method;
use axum::{
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use config::Config;
use db::postgres_beta_slot_repository::PostgresBetaSlotRepository;
use db::postgres_shop_repository::PostgresShopRepository;
use db::postgres_stripe_event_log_repository::PostgresStripeEventLogRepository;
use db::postgres_tenant_repository::PostgresTenantRepository;
use responses::JsonResponse;
use routes::admin::set_billing_exempt;
use routes::billing::{billing_status, create_checkout, require_active_billing};
use routes::invoices::create_invoice;
use routes::stripe::webhook;
use routes::work_orders::create_work_order;
use services::stripe::LiveStripeService;
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::db::{
    beta_slot_repository::BetaSlotRepository, shop_repository::ShopRepository,
    stripe_event_log_repository::StripeEventLogRepository, tenant_repository::TenantRepository,
};
use crate::services::stripe::StripeService;
use crate::state::AppState;
use crate::utils::jwt::JwtKeys;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let rate_limit_ms: u64 = std::env::var("RATE_LIMITER_MILLISECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        // Default: 200ms/token (~5 req/sec)
        .unwrap_or(200);
    let rate_limit_burst: u32 = std::env::var("RATE_LIMITER_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        // Default: allow short bursts during client polling
        .unwrap_or(20);
    let global_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit_ms)
            .burst_size(rate_limit_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .unwrap(),
    );

    let rate_limit_webhook_ms: u64 = std::env::var("RATE_LIMITER_WEBHOOK_MILLISECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(50);
    let rate_limit_webhook_burst: u32 = std::env::var("RATE_LIMITER_WEBHOOK_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(100);
    // Looser limiter for the webhook endpoint; the provider delivers event
    // bursts from a small IP pool and backs off on 429s.
    let webhook_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit_webhook_ms)
            .burst_size(rate_limit_webhook_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .unwrap(),
    );

    // Background task to cleanup old IPs
    let governor_limiter = global_governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let config = Config::from_env();

    let pg_pool = establish_connection(&config.database_url).await;
    let tenants = Arc::new(PostgresTenantRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn TenantRepository>;
    let shop = Arc::new(PostgresShopRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn ShopRepository>;
    let event_log = Arc::new(PostgresStripeEventLogRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn StripeEventLogRepository>;
    let beta_slots = Arc::new(PostgresBetaSlotRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn BetaSlotRepository>;

    let stripe =
        Arc::new(LiveStripeService::from_settings(&config.stripe)) as Arc<dyn StripeService>;
    let jwt_keys = Arc::new(JwtKeys::from_env().expect("JWT secret must be configured"));

    let state = AppState {
        tenants,
        shop,
        event_log,
        beta_slots,
        stripe,
        config: Arc::new(config),
        jwt_keys,
    };

    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .frontend_origin
                .parse::<HeaderValue>()
                .unwrap(),
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let billing_routes = Router::new()
        .route("/status", get(billing_status))
        .route("/checkout", post(create_checkout));

    // Everything behind the billing gate. New shop routes belong here so
    // locked tenants are cut off uniformly.
    let gated_routes = Router::new()
        .route("/work-orders", post(create_work_order))
        .route("/invoices", post(create_invoice))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_active_billing,
        ));

    let admin_routes = Router::new().route(
        "/tenants/{tenant_id}/billing-exempt",
        post(set_billing_exempt),
    );

    // Public webhook route (no auth; authenticated by its signature)
    let stripe_routes = Router::new()
        .route("/webhook", post(webhook))
        .layer(GovernorLayer {
            config: webhook_governor_conf.clone(),
        });

    // The webhook router is nested after the global limiter is applied so
    // only its own limiter governs provider deliveries.
    let app = Router::new()
        .route("/", get(root))
        .nest("/api/billing", billing_routes)
        .nest("/api", gated_routes)
        .nest("/api/admin", admin_routes)
        .layer(GovernorLayer {
            config: global_governor_conf.clone(),
        })
        .nest("/api/stripe", stripe_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));

    let listener = TcpListener::bind(addr).await.unwrap();
    println!("Running at http://{}", addr);
    axum::serve(listener, make_service).await.unwrap();
}

/// A simple root route.
async fn root() -> Response {
    JsonResponse::success("Hello, Shopdesk!").into_response()
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> PgPool {
    let pool = PgPool::connect(database_url)
        .await
        .expect("Failed to connect to the database");

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .expect("Failed to verify database connection");

    info!("Successfully connected to the database");
    pool
}

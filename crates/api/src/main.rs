//! API server entry point.

use std::sync::Arc;

use api::AppState;
use api::config::{Config, DEV_GATEWAY_KEY_ID};
use checkout::{
    InMemoryPaymentGateway, PaymentGateway, RazorpayConfig, RazorpayGateway, SignatureVerifier,
};
use metrics_exporter_prometheus::PrometheusHandle;
use storage::{CommerceStore, InMemoryStore, PostgresStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn build_gateway(config: &Config) -> Arc<dyn PaymentGateway> {
    match config.gateway.credentials() {
        Some((key_id, key_secret)) => {
            let gateway = RazorpayGateway::new(RazorpayConfig {
                base_url: config.gateway.base_url.clone(),
                key_id: key_id.to_string(),
                key_secret: key_secret.to_string(),
                timeout: config.gateway.timeout,
            })
            .expect("failed to build payment gateway client");
            tracing::info!(base_url = %config.gateway.base_url, "using Razorpay gateway");
            Arc::new(gateway)
        }
        None => {
            tracing::warn!("gateway keys not set, using the mock gateway");
            Arc::new(InMemoryPaymentGateway::new(DEV_GATEWAY_KEY_ID))
        }
    }
}

async fn serve<S: CommerceStore + Clone + 'static>(
    store: S,
    config: &Config,
    metrics_handle: PrometheusHandle,
) {
    let state = Arc::new(AppState::new(
        store,
        build_gateway(config),
        SignatureVerifier::new(config.gateway.signing_secret()),
        &config.gateway.currency,
        config.gateway.timeout,
    ));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    // 1. Load .env and configuration
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    // 2. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 3. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 4. Pick the store and serve
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url, config.max_connections)
                .await
                .expect("failed to connect to database");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            serve(store, &config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            serve(InMemoryStore::new(), &config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}

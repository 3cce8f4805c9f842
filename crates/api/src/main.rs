//! API server entry point.

use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{
    OrderStore, PostgresOrderStore, PostgresSagaJournal, SagaJournal, run_migrations,
};
use saga::HttpInventoryGateway;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use api::config::{Config, LogFormat};

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

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Serves the API and runs the saga reconciler until shutdown.
async fn serve<S, J>(
    config: Config,
    gateway: HttpInventoryGateway,
    store: S,
    journal: J,
    metrics_handle: PrometheusHandle,
) where
    S: OrderStore + 'static,
    J: SagaJournal + 'static,
{
    let state = api::create_state(gateway, store, journal, config.saga_config());
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let reconciler = state.service.reconciler();
    let (interval, grace) = (config.reconcile_interval, config.reconcile_grace);
    let reconciler_task = tokio::spawn(async move {
        reconciler
            .run(interval, grace, async move {
                let _ = stop_rx.changed().await;
            })
            .await;
    });

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(true);
        })
        .await
        .expect("server error");

    if let Err(e) = reconciler_task.await {
        tracing::warn!(error = %e, "reconciler task ended abnormally");
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Inventory client
    let inventory_url = config
        .inventory_url
        .clone()
        .expect("INVENTORY_SERVICE_URL must be set");
    let gateway = HttpInventoryGateway::new(inventory_url, config.call_timeout)
        .expect("failed to build inventory client");

    // 4. Order store and saga journal
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            run_migrations(&pool).await.expect("migrations failed");
            tracing::info!("using PostgreSQL order store");

            serve(
                config,
                gateway,
                PostgresOrderStore::new(pool.clone()),
                PostgresSagaJournal::new(pool),
                metrics_handle,
            )
            .await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            serve(
                config,
                gateway,
                order_store::InMemoryOrderStore::new(),
                order_store::InMemorySagaJournal::new(),
                metrics_handle,
            )
            .await;
        }
    }

    tracing::info!("server shut down gracefully");
}

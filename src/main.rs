use anyhow::Context;
use elavon_connector::api::{self, AppState};
use elavon_connector::config::Config;
use elavon_connector::database::{
    self, acquirer_repository::AcquirerConfigRepository, callback_repository::CallbackRepository,
    transaction_repository::PaymentTransactionRepository, PoolConfig,
};
use elavon_connector::logging::{init_logging, LogFormat};
use elavon_connector::payments::notification::{HttpNotifier, LogNotifier};
use elavon_connector::payments::providers::ElavonProvider;
use elavon_connector::payments::traits::{Notifier, SystemClock, TransactionStore};
use elavon_connector::payments::CallbackReconciler;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_logging("info,elavon_connector=debug,tower_http=info", LogFormat::from_env());

    let config = Config::from_env()?;

    tracing::info!("Starting Elavon connector");
    tracing::info!("Environment: {}", config.server.environment);

    let pool = database::init_pool(
        &config.database.url,
        Some(PoolConfig {
            max_connections: config.database.max_connections,
            ..PoolConfig::default()
        }),
    )
    .await
    .context("Failed to connect to database")?;
    database::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    // Settings stored in the database take precedence over the environment
    let acquirer = match AcquirerConfigRepository::new(pool.clone())
        .load_elavon_config()
        .await
        .context("Failed to load persisted Elavon configuration")?
    {
        Some(persisted) => persisted,
        None => config.elavon.clone(),
    };
    tracing::info!(
        merchant_id = %acquirer.merchant_id,
        environment = %acquirer.environment.as_str(),
        currency = %acquirer.currency,
        "Elavon acquirer configured"
    );

    let notifier: Arc<dyn Notifier> = match &config.notifier.url {
        Some(url) => Arc::new(
            HttpNotifier::new(url.clone(), config.notifier.timeout)
                .context("Failed to build confirmation notifier")?,
        ),
        None => {
            tracing::warn!("NOTIFY_URL not set; order confirmations will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let provider = Arc::new(ElavonProvider::new(acquirer));
    let store: Arc<dyn TransactionStore> =
        Arc::new(PaymentTransactionRepository::new(pool.clone()));
    let reconciler = Arc::new(CallbackReconciler::new(
        provider.clone(),
        store.clone(),
        notifier,
    ));

    let state = AppState {
        provider,
        reconciler,
        store,
        clock: Arc::new(SystemClock),
        callbacks: Some(Arc::new(CallbackRepository::new(pool.clone()))),
        pool: Some(pool),
        environment: config.server.environment.clone(),
        default_return_url: config.server.default_return_url.clone(),
    };

    let app = api::router(state);

    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .context("HOST must be a valid IP address")?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

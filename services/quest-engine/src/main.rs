use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::{anyhow, Context};
use dotenv::dotenv;
use quest_engine::{
    config::{Config, LogFormat, LoggingConfig},
    database::PgLedger,
    handlers, metrics,
    services::QuestService,
    store::LedgerStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_target(false);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    init_tracing(&config.logging);

    metrics::register_metrics(&metrics::REGISTRY).context("Failed to register metrics")?;

    info!(
        "Starting Quest Engine on {}:{} (repeat policy: {:?})",
        config.server.host, config.server.port, config.quests.repeat_policy
    );

    let ledger = Arc::new(
        PgLedger::new(&config.database)
            .await
            .context("Failed to connect to database")?,
    );

    let store: Arc<dyn LedgerStore> = ledger.clone();
    let quest_service = Arc::new(QuestService::new(
        store,
        config.quests.repeat_policy,
        Duration::from_millis(config.quests.completion_timeout_ms),
    ));

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(web::Data::new(quest_service.clone()))
            .configure(handlers::configure_routes)
    })
    .workers(config.server.workers)
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    ledger.close().await;
    info!("Quest Engine stopped");

    Ok(())
}

use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use nem_push_domain::config::{BotConfig, ConfigError, WatcherConfig};
use nem_push_domain::services::{
    cache::DivisibilityCache,
    telemetry::{init_telemetry, TelemetryConfig, TelemetryError},
};
use nem_push_domain::storage::StorageError;
use nem_push_monitor::{notification_channel, MonitorError, Watcher};
use nem_push_storage::SeaOrmStorage;
use thiserror::Error;
use tracing::info;

use crate::{
    delivery::{outbox_channel, run_delivery, WebhookClient},
    handlers::{
        balance_handler, list_handler, metrics_handler, register_handler, subscribe_handler,
        unregister_handler, unsubscribe_handler,
    },
    service::{BotService, ServiceError},
    state::AppState,
};

pub async fn run() -> Result<(), BootstrapError> {
    let config = BotConfig::load_from_env()?;
    let watcher_config = WatcherConfig::load_from_env()?;

    let telemetry = init_telemetry(&TelemetryConfig::from_env("BOT"))?;

    let storage = connect_storage(&config).await?;
    let watcher = Arc::new(Watcher::from_config(
        &watcher_config,
        Arc::new(DivisibilityCache::new()),
    )?);

    let (notice_tx, notice_rx) = notification_channel();
    let (outbox_tx, outbox_rx) = outbox_channel();
    let service = Arc::new(BotService::new(
        storage.clone(),
        Arc::clone(&watcher),
        notice_tx,
        outbox_tx,
    ));

    let restored = service.restore().await?;
    info!(
        channels = restored.channels,
        armed = restored.armed,
        skipped = restored.skipped,
        "persisted subscriptions restored"
    );

    let webhook = WebhookClient::new()?;
    tokio::spawn(run_delivery(notice_rx, outbox_rx, storage, webhook));
    let monitors = watcher.spawn_monitors(watcher_config.reconnect_delay());
    info!(monitors = monitors.len(), "block monitors running");

    let state = AppState::new(service, telemetry);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Logger::default())
            .configure(routes)
    })
    .bind(config.bind_address())?
    .run()
    .await?;

    for monitor in monitors {
        monitor.abort();
    }
    Ok(())
}

async fn connect_storage(config: &BotConfig) -> Result<SeaOrmStorage, StorageError> {
    let mut builder = SeaOrmStorage::builder().database_url(config.database_url());
    if let Some(max) = config.max_connections() {
        builder = builder.max_connections(max);
    }
    builder.build().await
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_handler)).service(
        web::scope("/api/v1/channels/{channel}")
            .route("/webhook", web::put().to(register_handler))
            .route("/webhook", web::delete().to(unregister_handler))
            .route("/addresses", web::post().to(subscribe_handler))
            .route("/addresses", web::get().to(list_handler))
            .route("/addresses/{address}", web::delete().to(unsubscribe_handler))
            .route("/balance", web::post().to(balance_handler)),
    );
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("watcher error: {0}")]
    Monitor(#[from] MonitorError),
    #[error("restore failed: {0}")]
    Restore(#[from] ServiceError),
    #[error("webhook client error: {0}")]
    Webhook(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

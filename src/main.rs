use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};

mod api;
mod attendance;
mod auth;
mod clock;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod store;
mod utils;

use attendance::{FinalizationScheduler, Finalizer, SessionMachine, StudentMachine, TapDispatcher};
use clock::{CivilClock, SystemClock};
use config::Config;
use db::init_db;
use store::Stores;
use store::mysql::MySqlStore;
use utils::card_cache::CardCache;

use crate::docs::ApiDoc;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Tap attendance is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_warnings) = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!(tz = config.timezone.name(), "Server starting...");
    if !config_warnings.is_empty() {
        config_warnings.log();
    }

    let pool = init_db(&config.database_url).await?;

    let card_cache = CardCache::new(Duration::from_secs(config.card_cache_ttl_secs));
    let cache_for_warmup = card_cache.clone();
    let pool_for_warmup = pool.clone();

    actix_web::rt::spawn(async move {
        if let Err(e) = cache_for_warmup.warmup(&pool_for_warmup, 500).await {
            error!(error = %e, "Failed to warmup card cache");
        }
    });

    let stores = Stores::from_backend(Arc::new(MySqlStore::new(pool.clone(), card_cache)));
    let clock: Arc<dyn CivilClock> = Arc::new(SystemClock::new(config.timezone));
    let policy = config.policy();

    let finalizer = Arc::new(Finalizer::new(stores.clone(), policy));
    let scheduler =
        FinalizationScheduler::start(finalizer, policy.finalize_delay, config.finalizer_workers);

    let dispatcher = Data::new(TapDispatcher::new(
        stores.clone(),
        StudentMachine::new(stores.clone(), clock.clone(), policy),
        SessionMachine::new(stores.clone(), clock, policy, scheduler.clone()),
    ));

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();
    let stores_data = Data::new(stores);
    let pool_data = Data::new(pool);

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(pool_data.clone())
            .app_data(stores_data.clone())
            .app_data(dispatcher.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    info!(pending = scheduler.pending(), "Server stopped, draining finalization jobs");
    scheduler.drain().await;

    Ok(())
}

use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use log::{info, warn};
use tokio::runtime::Handle;

use taskgate::auth::{Admission, Authenticator};
use taskgate::background::BackgroundTasks;
use taskgate::clock::{Clock, SystemClock};
use taskgate::config::Config;
use taskgate::gate::RequestGate;
use taskgate::notify::LogNotifier;
use taskgate::ratelimit::RateLimiter;
use taskgate::routes::{self, health};
use taskgate::state::AppState;
use taskgate::storage::{MemoryStore, PgStore, Storage};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let storage: Arc<dyn Storage> = match &config.database_url {
        Some(url) => Arc::new(
            PgStore::connect(url, config.database_max_connections)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
        ),
        None => {
            warn!("DATABASE_URL is not set; data will be kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let background = Arc::new(BackgroundTasks::on_runtime(Handle::current()));
    let state = web::Data::new(AppState::new(
        storage,
        clock.clone(),
        Arc::new(LogNotifier),
        background.clone(),
        &config,
    ));

    let limiter = Arc::new(RateLimiter::new(config.limiter.clone(), clock));
    let sweeper = limiter
        .is_enabled()
        .then(|| limiter.spawn_sweeper(config.sweep_interval));
    let gate = Arc::new(RequestGate::new(
        limiter,
        Authenticator::new(state.tokens.clone()),
    ));

    info!("Starting taskgate server at {}", config.server_url());
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .service(health::health)
            .service(
                web::scope("/api/v1")
                    .wrap(Admission::new(gate.clone()))
                    .configure(routes::config),
            )
    })
    .shutdown_timeout(config.shutdown_grace.as_secs())
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await?;

    info!("Server stopped, finishing background work");
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    background.drain(config.shutdown_grace).await;
    info!("Shutdown complete");
    Ok(())
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use diesel::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use campus_marketplace_backend::config::AppConfig;
use campus_marketplace_backend::http::{self, AppState};
use campus_marketplace_backend::notify::{LogNotifier, Notifier};
use campus_marketplace_backend::store::pg::PgStore;
use campus_marketplace_backend::store::MarketStore;
use campus_marketplace_backend::{db, listings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    info!(
        "loaded config: port={}, archive_after_days={}",
        config.port, config.archive_after_days
    );

    // fail fast at boot if the database is unreachable
    let mut conn = db::establish_connection(&config.database_url)?;
    let probe: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1"))
        .get_result(&mut conn)?;
    info!("database probe returned {}", probe);
    drop(conn);

    let store: Arc<dyn MarketStore> = Arc::new(PgStore::new(config.database_url.clone()));
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let state = AppState {
        config: config.clone(),
        store: store.clone(),
        notifier,
    };

    // low-frequency sweep; idempotent, so the schedule is uncritical
    let sweep_store = store.clone();
    let archive_after_days = config.archive_after_days;
    let mut sweep = tokio::time::interval(Duration::from_secs(config.sweep_interval_secs));
    tokio::spawn(async move {
        loop {
            sweep.tick().await;
            match listings::archive_stale(sweep_store.as_ref(), archive_after_days) {
                Ok(0) => {}
                Ok(archived) => info!("archived {} stale listings", archived),
                Err(e) => error!("stale-listing sweep failed: {}", e),
            }
        }
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!("starting server on {}", addr);

    let app = http::router(state);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;

    Ok(())
}

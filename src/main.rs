use std::net::SocketAddr;
use std::sync::Arc;

use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use registrar::auth::jwt::JwtService;
use registrar::clock::SystemClock;
use registrar::config::AppConfig;
use registrar::db;
use registrar::routes;
use registrar::state::AppState;
use registrar::storage::FsStorage;
use registrar::workflow::TransitionTable;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        storage_dir = %config.storage_dir,
        "loaded registrar configuration"
    );

    let pool = db::init_pool(&config.database_url, config.database_max_pool_size)?;

    let transitions = {
        let mut conn = pool.get()?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow::anyhow!("failed to run migrations: {err}"))?;
        TransitionTable::load(&mut conn)?
    };

    let storage = Arc::new(FsStorage::new(config.storage_dir.clone()));
    let jwt = JwtService::from_config(&config)?;
    let clock = Arc::new(SystemClock);

    let listen_addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;

    let state = AppState::new(pool, config, storage, jwt, clock, transitions);
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, router).await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

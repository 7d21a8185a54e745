//! Rummy server: one actor per table behind a WebSocket API.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Error, anyhow};
use pico_args::Arguments;
use rummy_engine::{
    auth::JwtVerifier,
    db::{Database, PgSnapshotStore, PgWalletStore},
    persistence::{NoopSnapshotStore, SnapshotStore},
    security::ThrottleConfig,
    table::{SessionRegistry, TableManager},
    wallet::{FinanceGateway, MemoryWalletStore, WalletStore},
};
use rummy_server::{
    api::{self, AppState},
    config::{Overrides, ServerConfig},
    logging, metrics,
};
use tracing::{error, info, warn};

const HELP: &str = "\
Run the rummy game server

USAGE:
  rummy_server [OPTIONS]

OPTIONS:
  --bind          IP:PORT  Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:6969]
  --db-url        URL      Database connection string  [default: env DATABASE_URL]
  --seed-wallets  N        In-memory mode: give users 1..=N a starting balance

FLAGS:
  --memory                 Keep wallets and snapshots in memory even if DATABASE_URL is set
  -h, --help               Print help information

ENVIRONMENT:
  JWT_SECRET               Secret of the auth service that signs event tokens (required)
  DATABASE_URL             PostgreSQL connection string
  ADMIN_ENDPOINTS          Mount admin advance/declare routes (true/false)
  METRICS_BIND             Prometheus scrape address
  RUST_LOG                 Log filter [default: info,sqlx=warn]
  (See .env.example for every rule setting)
";

const SEED_BALANCE: i64 = 100_000;

struct Args {
    overrides: Overrides,
    seed_wallets: Option<i64>,
}

fn parse_args() -> Result<Args, Error> {
    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        overrides: Overrides {
            bind: pargs.opt_value_from_str::<_, SocketAddr>("--bind")?,
            database_url: pargs.opt_value_from_str("--db-url")?,
            memory: pargs.contains("--memory"),
        },
        seed_wallets: pargs.opt_value_from_str("--seed-wallets")?,
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        return Err(anyhow!("Unexpected arguments: {:?}", remaining));
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let args = parse_args()?;
    logging::init();

    let config = ServerConfig::from_env(args.overrides)?;
    config.validate()?;
    info!("Starting rummy server at {}", config.bind);

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow!(e))?;
        info!("Metrics exported at http://{}/metrics", addr);
    }

    let (wallets, snapshots, database): (Arc<dyn WalletStore>, Arc<dyn SnapshotStore>, _) =
        match &config.database {
            Some(db_config) => {
                let db = Database::new(db_config)
                    .await
                    .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;
                db.ensure_schema()
                    .await
                    .map_err(|e| anyhow!("Failed to create schema: {}", e))?;
                info!("Database connected successfully");
                (
                    Arc::new(PgWalletStore::new(db.pool().clone())),
                    Arc::new(PgSnapshotStore::new(db.pool().clone())),
                    Some(db),
                )
            }
            None => {
                let store = MemoryWalletStore::new();
                match args.seed_wallets {
                    Some(count) => {
                        for user_id in 1..=count {
                            store.set_balance(user_id, SEED_BALANCE).await;
                        }
                        info!("Seeded {} in-memory wallets", count);
                    }
                    None => warn!("Running with empty in-memory wallets; joins will fail"),
                }
                (Arc::new(store), Arc::new(NoopSnapshotStore), None)
            }
        };

    let finance = FinanceGateway::new(wallets);
    match finance.recover_pending_matches().await {
        Ok(0) => {}
        Ok(count) => info!("Settled {} match outcome(s) left pending", count),
        Err(e) => error!("Pending match recovery failed: {}", e),
    }

    let table_manager = Arc::new(
        TableManager::new(config.table.clone(), finance, snapshots)
            .with_observer(Arc::new(metrics::SettlementRecorder)),
    );
    match table_manager.restore_tables().await {
        Ok(restored) => info!("Restored {} table(s) from snapshots", restored),
        Err(e) => error!("Table restore failed: {}", e),
    }

    let sweep_age = chrono::Duration::from_std(config.stale_hold_age)
        .map_err(|e| anyhow!("STALE_HOLD_SECS out of range: {}", e))?;
    let sweeper = {
        let manager = table_manager.clone();
        let mut interval = tokio::time::interval(config.hold_sweep_interval);
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                match manager.sweep_stale_holds(sweep_age).await {
                    Ok(0) => {}
                    Ok(count) => {
                        metrics::stale_holds_released(count);
                        warn!("Released {} stale hold(s)", count);
                    }
                    Err(e) => error!("Stale hold sweep failed: {}", e),
                }
                metrics::active_tables(manager.active_table_count().await);
            }
        })
    };

    let state = AppState {
        table_manager: table_manager.clone(),
        sessions: Arc::new(SessionRegistry::new()),
        verifier: Arc::new(JwtVerifier::new(&config.jwt_secret)),
        throttle: ThrottleConfig::with_window(config.throttle_window),
        database: database.clone(),
        admin_enabled: config.admin_enabled,
    };
    if config.admin_enabled {
        warn!("Admin endpoints are enabled");
    }

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");
    sweeper.abort();
    table_manager.shutdown_all().await;
    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

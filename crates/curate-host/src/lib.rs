//! Host wiring for Curate.
//!
//! Turns a [`Config`] into a running moderation service: tracing
//! initialisation, the connection pool, migrations, the registry of
//! moderated entity types and the notification delivery worker.

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use curate_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings, MigrationError, PoolError};
use curate_moderation::{ModerationError, ModerationRegistry, ModerationService};
use curate_notify::{start_delivery_task, NotificationDispatcher};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

pub use config::{load_config, parse_config, Config, ConfigError};

/// Errors that stop the host from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("failed to get database connection: {0}")]
    Connection(#[from] r2d2::Error),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("invalid moderation registration: {0}")]
    Registry(#[from] ModerationError),
}

/// Installs the global tracing subscriber.
///
/// An invalid filter falls back to `info`. Does nothing if a subscriber is
/// already installed.
pub fn init_tracing(logging: &config::LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Builds the registry from `[[moderation.entities]]`.
pub fn build_registry(config: &Config) -> Result<ModerationRegistry, ModerationError> {
    ModerationRegistry::from_configs(
        config
            .moderation
            .entities
            .iter()
            .map(|entry| (entry.entity_type.clone(), entry.config.clone())),
    )
}

/// Opens the database, applies migrations and builds the service.
pub fn bootstrap(config: &Config) -> Result<ModerationService, StartupError> {
    let registry = build_registry(config)?;
    let pool = open_database(config)?;

    let types: Vec<&str> = registry.entity_types().collect();
    tracing::info!(entity_types = ?types, "moderation registry ready");

    Ok(ModerationService::with_sqlite_store(pool, registry))
}

fn open_database(config: &Config) -> Result<DbPool, StartupError> {
    let pool = create_pool(
        &config.database.path,
        DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )?;

    let conn = pool.get()?;
    let applied = run_migrations(&conn)?;
    if applied > 0 {
        tracing::info!(count = applied, "applied database migrations");
    }
    Ok(pool)
}

/// Spawns the outbox delivery worker if enabled.
///
/// Only one worker should drain a given database.
pub fn spawn_delivery(
    config: &Config,
    pool: DbPool,
    dispatcher: Arc<dyn NotificationDispatcher>,
) -> Option<JoinHandle<()>> {
    if !config.delivery.enabled {
        tracing::info!("notification delivery disabled");
        return None;
    }
    let interval = Duration::from_secs(config.delivery.interval_secs.max(1));
    Some(tokio::spawn(start_delivery_task(pool, dispatcher, interval)))
}

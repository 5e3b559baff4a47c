//! Database layer for Curate.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization
//! and embedded SQL migrations for the moderation record store, the bundled
//! entity table and the notification outbox.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: concurrent readers with a single writer. The
//!   single writer is what serialises hook pairs and moderation decisions.
//! - **`r2d2` connection pool**: bounded connection reuse across threads.
//! - **Embedded migrations**: SQL files are compiled in via `include_str!`,
//!   so the schema ships with the code that depends on it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError, IN_MEMORY};

//! Curate host binary.
//!
//! Opens the moderation database, applies migrations, reports the
//! moderation backlog and runs the notification delivery worker until
//! SIGTERM/SIGINT.

use std::sync::Arc;

use curate_host::{bootstrap, init_tracing, load_config, spawn_delivery};
use curate_notify::TracingDispatcher;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("CURATE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("curate.toml"));

    let config = load_config(selected_config_path)
        .expect("failed to load configuration; the host cannot start without valid config");

    init_tracing(&config.logging);

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let service = bootstrap(&config).expect("failed to start moderation service");

    match service.counts(None) {
        Ok(counts) => tracing::info!(
            pending = counts.pending,
            approved = counts.approved,
            rejected = counts.rejected,
            "moderation backlog"
        ),
        Err(e) => tracing::warn!(error = %e, "could not count moderation records"),
    }

    let delivery = spawn_delivery(&config, service.pool().clone(), Arc::new(TracingDispatcher));

    shutdown_signal().await;

    if let Some(handle) = delivery {
        handle.abort();
    }
    tracing::info!("curate host shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
        () = terminate => { tracing::info!("received SIGTERM, shutting down"); }
    }
}

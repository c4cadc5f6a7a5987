use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;

use taskboard::app::{build_router, AppState};
use taskboard::automation::DueDateScheduler;
use taskboard::config::AppConfig;
use taskboard::db;
use taskboard::jwt::JwtConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let config = AppConfig::from_env()?;
    let pool = db::init(&config.database_url).await?;
    let state = AppState::new(pool.clone(), JwtConfig::from_env()?);

    let cancel = CancellationToken::new();
    let scheduler = if config.scheduler_enabled {
        let scheduler = DueDateScheduler::new(pool.clone(), state.engine.clone(), config.sweep_at);
        Some(tokio::spawn(scheduler.run(cancel.child_token())))
    } else {
        tracing::info!("due-date scheduler disabled");
        None
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    if let Some(handle) = scheduler {
        if let Err(err) = handle.await {
            tracing::warn!(error = %err, "scheduler task ended abnormally");
        }
    }
    pool.close().await;

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown requested");
    cancel.cancel();
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

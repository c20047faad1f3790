use std::sync::Arc;

use tracing::info;

use courier_db::Database;
use courier_server::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_server=debug,courier_api=debug,courier_gateway=debug,courier_db=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Database::open(&config.db_path)?;

    let (notifier, vapid_public_key) = courier_server::notification_dispatcher(&config.vapid);
    info!(
        "push notifications {}",
        if notifier.is_enabled() { "enabled" } else { "disabled" }
    );

    let state = courier_server::build_state(&config, db, notifier, vapid_public_key);
    let presence = state.router.presence().clone();
    let app = courier_server::app(Arc::clone(&state));

    info!("Courier server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down, closing {} live connections", presence.online_count());
            presence.shutdown();
        })
        .await?;

    Ok(())
}

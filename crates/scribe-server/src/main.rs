mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use scribe_api::auth::bootstrap_admin;
use scribe_api::cleanup;
use scribe_api::mail::LogMailer;
use scribe_api::storage::Storage;
use scribe_api::{AppState, AppStateInner};
use scribe_types::user::NewWriter;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "scribe=debug,scribe_api=debug,scribe_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = scribe_db::Database::open(&config.db_path)?;
    if let Some(seed) = &config.admin {
        let admin = bootstrap_admin(
            &db,
            NewWriter {
                first_name: "Site".into(),
                last_name: "Admin".into(),
                email: seed.email.clone(),
                phone: "n/a".into(),
                country: "n/a".into(),
            },
            &seed.password,
        )?;
        info!("Admin account ready: {}", admin.email);
    }

    let storage = Storage::new(config.upload_dir.clone()).await?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        token_ttl_days: config.jwt_ttl_days,
        storage,
        mailer: Arc::new(LogMailer),
    });

    // Background cleanup of abandoned temp uploads
    tokio::spawn(cleanup::run_cleanup_loop(
        state.clone(),
        config.temp_retention(),
        config.cleanup_interval_secs,
    ));

    let app = scribe_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Scribe server listening on {}", addr);
    info!(
        "Temp uploads retained for {} day(s), swept every {}s",
        config.temp_retention_days, config.cleanup_interval_secs
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

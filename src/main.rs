use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use student_panel::auth::seed_admin;
use student_panel::config::{Args, Config};
use student_panel::store::{Backend, MemoryStore, PgStore};
use student_panel::{router, AppState};

/// Wait for SIGTERM or Ctrl+C
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                log::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C, shutting down"),
        _ = terminate => log::info!("Received SIGTERM, shutting down"),
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn Backend>> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_connections)
                .await
                .context("connecting to the database")?;
            store.migrate().await.context("running migrations")?;
            log::info!("Connected to PostgreSQL");
            Ok(Arc::new(store))
        }
        None => {
            log::warn!("No `database_url` configured, data lives in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args)?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();
    log::debug!("{:?}", args);

    if args.validate {
        log::info!("Configuration in `{}` is valid", args.config);
        return Ok(());
    }

    let store = open_store(&config).await?;
    if let Some((email, password)) = config.admin_credentials() {
        seed_admin(store.as_ref(), email, password).await?;
    }

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address `{}`", config.bind_address()))?;
    let app = router(AppState::new(store, config));

    log::info!("Starting student panel server on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

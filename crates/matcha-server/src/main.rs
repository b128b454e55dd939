mod config;

use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use matcha_api::mailer::{LogMailer, Mailer};
use matcha_api::{AppStateInner, Subscriber};
use matcha_bus::Bus;
use matcha_db::Database;
use matcha_gateway::Gateway;

/// Per-request deadline on the REST surface.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// How long in-flight requests and sessions get after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "matcha=debug,matcha_api=debug,matcha_gateway=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = config::Config::from_env()?;

    let db = if config.database_url == ":memory:" {
        Database::open_in_memory()?
    } else {
        Database::open(Path::new(&config.database_url))?
    };

    let bus = match &config.redis_addr {
        Some(addr) => {
            info!("Using Redis bus at {}", addr);
            Bus::redis(addr).await?
        }
        None => {
            info!("REDIS_ADDR unset, using in-process bus");
            Bus::memory()
        }
    };

    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer::new(config.smtp_from.clone()));
    let state = AppStateInner::new(config.api, db, bus.clone(), mailer)?;

    let shutdown = CancellationToken::new();
    let subscriber = Subscriber::new(state.clone(), config.chat_workers)
        .start(shutdown.clone())
        .await?;
    let gateway = Gateway::new(bus, state.tokens.clone(), shutdown.clone());
    let pumps = gateway.start().await?;

    let app = matcha_api::router(state)
        .layer(TimeoutLayer::new(HTTP_TIMEOUT))
        .merge(gateway.routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Matcha server listening on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(DRAIN_TIMEOUT).await;
        } => warn!("Drain timeout elapsed, forcing shutdown"),
    }

    for pump in pumps {
        let _ = pump.await;
    }
    subscriber.join().await;
    info!("Server stopped");
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

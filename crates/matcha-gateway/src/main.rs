use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use matcha_bus::Bus;
use matcha_gateway::Gateway;
use matcha_types::token::AccessTokens;

/// Placeholder signing keys that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "dev-secret-change-me", "secret"];

/// How long in-flight sessions get to close after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matcha_gateway=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let signing_key = std::env::var("JWT_SIGNING_KEY").unwrap_or_default();
    if signing_key.is_empty() || PLACEHOLDER_SECRETS.contains(&signing_key.as_str()) {
        eprintln!("FATAL: JWT_SIGNING_KEY is unset or still a placeholder.");
        eprintln!("       This must match the API server's signing key.");
        std::process::exit(1);
    }
    let Ok(redis_addr) = std::env::var("REDIS_ADDR") else {
        eprintln!("FATAL: REDIS_ADDR is unset.");
        eprintln!("       A standalone gateway reaches the subscriber through Redis.");
        std::process::exit(1);
    };
    let addr: SocketAddr = std::env::var("GATEWAY_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8081".into())
        .parse()?;

    let bus = Bus::redis(&redis_addr).await?;
    let shutdown = CancellationToken::new();
    let gateway = Gateway::new(bus, AccessTokens::new(signing_key.as_bytes()), shutdown.clone());
    let pumps = gateway.start().await?;

    let app = gateway.routes().layer(TraceLayer::new_for_http());

    info!("Matcha gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

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
    info!("Gateway stopped");
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

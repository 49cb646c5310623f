use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

mod app;
mod auth;
mod http;
mod notifier;
mod ws;

/// Real-time notification gateway for laboratories and clinics.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to labhub.toml (falls back to LABHUB_CONFIG, then ~/.labhub/labhub.toml).
    #[arg(long, short)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "labhub_gateway=info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();

    // load config: explicit path > LABHUB_CONFIG env > ~/.labhub/labhub.toml
    let config_path = args.config.or_else(|| std::env::var("LABHUB_CONFIG").ok());
    let config =
        labhub_core::LabhubConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            labhub_core::LabhubConfig::default()
        });

    if config.auth.jwt_secret == labhub_core::config::AuthConfig::default().jwt_secret {
        tracing::warn!("auth.jwt_secret is the built-in default; set it before exposing the gateway");
    }

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let hub_path = config.gateway.hub_path.clone();

    let state = Arc::new(app::AppState::new(config));
    let router = app::build_router(state);

    info!(hub = %hub_path, "LabHub gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("LabHub gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

use std::sync::Arc;

use clap::Parser;
use labhub_client::{
    console::{ConsoleDesktop, ConsoleToaster, TerminalBell},
    credentials::{FilePreferences, FileTokenStore, Preferences},
    transport::WsTransport,
    ConnectionManager, ConnectionState, HubEndpoint, LocalBus, LocalSignal,
    NotificationSurface, ReconnectPolicy, Topic,
};
use tracing::info;

/// Listen for laboratory / clinic notifications in the terminal.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to labhub.toml (falls back to LABHUB_CONFIG, then ~/.labhub/labhub.toml).
    #[arg(long, short)]
    config: Option<String>,

    /// REST base address, e.g. https://portal.example/api (overrides client.api_base_url).
    #[arg(long)]
    api_base: Option<String>,

    /// Session token file (overrides client.token_path).
    #[arg(long)]
    token_file: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "labhub_client=info,labhub_listen=info".into()),
        )
        .init();

    let args = Args::parse();

    let config_path = args.config.or_else(|| std::env::var("LABHUB_CONFIG").ok());
    let config =
        labhub_core::LabhubConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            labhub_core::LabhubConfig::default()
        });
    let client = config.client;

    let api_base = args.api_base.unwrap_or(client.api_base_url);
    let endpoint = HubEndpoint::from_api_base(&api_base, &client.hub_path)?;
    let tokens = FileTokenStore::new(args.token_file.unwrap_or(client.token_path));
    let preferences = Arc::new(FilePreferences::new(client.preferences_path));

    let bus = LocalBus::new();
    let _on_new = bus.subscribe(Topic::NovaNotificacao, |signal| {
        if let LocalSignal::NovaNotificacao(event) = signal {
            info!(topic = Topic::NovaNotificacao.name(), titulo = %event.titulo, "signal");
        }
    });
    let _on_refresh = bus.subscribe(Topic::NotificacoesAtualizar, |_| {
        info!(topic = Topic::NotificacoesAtualizar.name(), "signal");
    });

    let surface = NotificationSurface::new(
        Arc::new(ConsoleToaster),
        Arc::new(TerminalBell),
        Arc::new(ConsoleDesktop::new(preferences.desktop_permission())),
        preferences,
        bus,
    );

    let manager = ConnectionManager::new(
        endpoint,
        Arc::new(tokens),
        Arc::new(WsTransport::new()),
        Arc::new(surface),
        ReconnectPolicy::from_config(&client.reconnect),
    );

    if manager.start().await == ConnectionState::Disconnected {
        anyhow::bail!("not connected to the notification hub (see log above)");
    }

    let mut state = manager.watch_state();
    tokio::select! {
        _ = shutdown_signal() => {}
        _ = state.wait_for(|s| *s == ConnectionState::Disconnected) => {
            tracing::warn!("hub connection lost for good");
        }
    }

    manager.stop().await;
    info!("LabHub listener stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

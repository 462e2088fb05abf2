use anyhow::Context;
use backpack_client::core::config::{ConfigError, ExchangeConfig};
use backpack_client::exchanges::backpack::build_order_update_stream;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_STREAM: &str = "depth.SOL_USDC";

/// Config file path from `BACKPACK_CONFIG`, otherwise `.env` / process environment.
/// Streaming public channels needs no credentials, so missing keys are not fatal.
fn load_config() -> anyhow::Result<ExchangeConfig> {
    if let Ok(path) = std::env::var("BACKPACK_CONFIG") {
        return ExchangeConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path));
    }

    #[cfg(feature = "env-file")]
    let loaded = ExchangeConfig::from_env_file("BACKPACK");
    #[cfg(not(feature = "env-file"))]
    let loaded = ExchangeConfig::from_env("BACKPACK");

    match loaded {
        Ok(config) => Ok(config),
        Err(ConfigError::MissingEnvironmentVariable(var)) => {
            warn!(%var, "No credentials configured, continuing without them");
            let mut config = ExchangeConfig::read_only();
            config.base_url = std::env::var("BACKPACK_BASE_URL").ok();
            config.ws_url = std::env::var("BACKPACK_WS_URL").ok();
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let mut streams: Vec<String> = std::env::args().skip(1).collect();
    if streams.is_empty() {
        streams.push(DEFAULT_STREAM.to_string());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut stream = build_order_update_stream(&config);
    stream.connect().await.context("connecting order update stream")?;
    for name in &streams {
        stream
            .subscribe(name)
            .await
            .with_context(|| format!("subscribing to {}", name))?;
    }

    stream
        .run(shutdown_rx, |update| {
            info!(
                event = %update.event_type,
                symbol = %update.symbol,
                order_id = %update.order_id,
                state = %update.order_state,
                "{:?}",
                update
            );
        })
        .await?;

    info!("Stream closed");
    Ok(())
}

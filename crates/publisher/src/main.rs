//! Amnis publisher
//!
//! Runs the stAPT provider until Ctrl+C or SIGTERM.

mod settings;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use amnis_core::Symbol;
use amnis_price_feed::{AmnisProvider, Provider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    init_logging();

    info!("Starting Amnis publisher v{}", env!("CARGO_PKG_VERSION"));

    let path = settings::config_path();
    let config = settings::load(&path)?;
    info!(
        "Loaded config from {} (pyth {}, node {}, interval {}s)",
        path, config.http_endpoint, config.node_url, config.update_interval_secs
    );

    let provider = Arc::new(AmnisProvider::new(config));

    let updater = {
        let provider = Arc::clone(&provider);
        tokio::spawn(async move { provider.run_update_loop().await })
    };
    let reporter = tokio::spawn(report_prices(Arc::clone(&provider)));

    shutdown_signal().await;

    updater.abort();
    reporter.abort();
    info!("Shutdown complete");
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if env::var_os("AMNIS_LOG_JSON").is_some() {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Stand-in consumer of `latest_price`
async fn report_prices(provider: Arc<AmnisProvider>) {
    let symbol = Symbol::stapt_usd();
    let mut interval = tokio::time::interval(Duration::from_secs(60));

    loop {
        interval.tick().await;
        match provider.latest_price(&symbol) {
            Some(price) => info!("{} latest: {}", symbol, price),
            None => warn!("{} has no price yet", symbol),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        }
        _ = terminate => {
            info!("Received termination signal");
        }
    }
}

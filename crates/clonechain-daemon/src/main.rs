use anyhow::{Context, Result};
use clonechain_core::{config::DEFAULT_CONFIG_PATH, logging, ClonechainConfig, ClonechainService};
use clonechain_rbd::SystemRbdProvider;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::{net::TcpListener, select, signal};

mod rpc;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    if let Err(err) = run().await {
        error!("daemon exit: {err:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    logging::init("info");
    let config_path =
        std::env::var("CLONECHAIN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = Arc::new(
        ClonechainConfig::load(&config_path)
            .with_context(|| format!("load config {config_path}"))?,
    );

    info!("Clonechain daemon booting (config: {config_path}, pool: {})", config.pool());
    for issue in config.validate() {
        warn!("config: {issue}");
    }

    let provider = SystemRbdProvider::from_config(&config).context("initialise rbd provider")?;
    info!("using rbd at {}", provider.binary().display());
    let service = Arc::new(ClonechainService::new(config.clone(), provider));

    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("query endpoint listening on {addr}");

    select! {
        res = rpc::serve(listener, service) => res?,
        _ = signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}

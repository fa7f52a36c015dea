//! Nœud de calcul SpectroLink : se connecte au générateur et lui renvoie le
//! spectre de magnitudes de chaque bloc reçu. Une connexion rompue termine le
//! processus ; il n'y a pas de reconnexion automatique.

use anyhow::Result;
use splconfig::Config;
use spldsp::ComputeNode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    let addr = format!("{}:{}", config.listen.address, config.listen.port);
    let mut node = ComputeNode::new(config.block_len);
    node.connect_and_run(&addr).await?;

    info!("✅ Compute node stopped cleanly");
    Ok(())
}

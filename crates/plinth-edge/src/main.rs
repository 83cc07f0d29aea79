//! Edge router binary.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use plinth_edge::{config::EdgeConfig, server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("plinth_edge=info")),
        )
        .init();

    info!("plinth edge router starting");

    let config = EdgeConfig::load().unwrap_or_else(|e| {
        info!(error = %e, "failed to load config, using defaults");
        EdgeConfig::default()
    });

    let cancel = CancellationToken::new();
    if let Err(e) = server::run(config, cancel).await {
        error!(error = %e, "edge router failed");
        return Err(Box::new(e) as Box<dyn std::error::Error>);
    }

    Ok(())
}

//! Control service binary.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use plinth_control::{ControlConfig, ControlService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("plinth_control=info")),
        )
        .init();

    info!("plinth control service starting");

    let config = ControlConfig::load().unwrap_or_else(|e| {
        info!(error = %e, "failed to load config, using defaults");
        ControlConfig::default()
    });

    info!(
        listen = %config.server.bind_address,
        bus_topic = %config.bus.topic,
        "configuration loaded"
    );

    let service = ControlService::new(config);
    if let Err(e) = service.run().await {
        error!(error = %e, "control service failed");
        return Err(Box::new(e) as Box<dyn std::error::Error>);
    }

    Ok(())
}

//! Ephemeral build runner for plinth deployments.
//!
//! One process per deployment. The compute dispatcher launches this
//! binary with its full configuration in `PLINTH_`-prefixed environment
//! variables; it clones the project repository, runs the install and
//! build steps, uploads the build output, and reports everything it does
//! as ordered log lines on the message bus. The bus is the only channel
//! back to the control plane; the exit code is only visible to the
//! compute backend.

mod artifact;
mod config;
mod error;
mod git;
mod pipeline;
mod sink;

use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::artifact::ArtifactStore;
use crate::config::RunnerConfig;
use crate::pipeline::BuildPipeline;
use crate::sink::{KafkaLogSink, LogSink};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("plinth_runner=info")),
        )
        .init();

    info!("plinth build runner starting");

    let config = match RunnerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load runner configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(
        project_id = %config.project_id,
        deployment_id = %config.deployment_id,
        "runner configuration loaded"
    );

    let sink = match KafkaLogSink::new(&config.bus) {
        Ok(sink) => sink,
        Err(e) => {
            error!(error = %e, "failed to create bus producer");
            return ExitCode::FAILURE;
        }
    };

    let uploader = match ArtifactStore::new(&config.storage) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to create artifact store client");
            return ExitCode::FAILURE;
        }
    };

    let pipeline = BuildPipeline::new(config, sink.clone(), uploader);
    let result = pipeline.run().await;

    // Drain any buffered log messages before the process exits.
    sink.flush();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

//! The build pipeline state machine.
//!
//! A runner executes exactly one pipeline and exits:
//!
//! ```text
//! INIT -> INSTALL -> BUILD -> UPLOAD -> DONE
//!   \________\_________\________\-----> FAILED
//! ```
//!
//! The install and build steps run strictly sequentially as child
//! subprocesses rooted at the cloned repository; their stdout/stderr are
//! streamed to the bus line-by-line as they are produced. Whatever goes
//! wrong, the pipeline ends by emitting exactly one failure-sentinel
//! line; on success the success sentinel is emitted only after the last
//! artifact upload has completed.

use std::fmt;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use plinth_core::{sentinel, BuildMessage};

use crate::artifact::{collect_output_files, ArtifactUploader};
use crate::config::RunnerConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::git::clone_repository;
use crate::sink::LogSink;

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Fetching the project repository.
    Init,
    /// Installing dependencies.
    Install,
    /// Running the build.
    Build,
    /// Uploading build output to the artifact store.
    Upload,
    /// Pipeline finished successfully.
    Done,
    /// Pipeline failed.
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Install => "install",
            Self::Build => "build",
            Self::Upload => "upload",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// One build-and-publish run for a single deployment.
pub struct BuildPipeline<S, U> {
    config: RunnerConfig,
    sink: S,
    uploader: U,
    stage: Stage,
}

impl<S: LogSink, U: ArtifactUploader> BuildPipeline<S, U> {
    /// Create a pipeline in the initial stage.
    pub fn new(config: RunnerConfig, sink: S, uploader: U) -> Self {
        Self {
            config,
            sink,
            uploader,
            stage: Stage::Init,
        }
    }

    /// Run the pipeline to completion.
    ///
    /// Emits the start sentinel first, then either the success sentinel
    /// (after all uploads) or exactly one failure sentinel.
    pub async fn run(mut self) -> RunnerResult<()> {
        info!(
            project_id = %self.config.project_id,
            deployment_id = %self.config.deployment_id,
            repo = %self.config.git_url,
            "starting build pipeline"
        );

        self.publish_line(sentinel::START_LINE).await;

        match self.execute().await {
            Ok(()) => {
                self.enter(Stage::Done);
                self.publish_line(sentinel::SUCCESS_LINE).await;
                info!(deployment_id = %self.config.deployment_id, "build pipeline completed");
                Ok(())
            }
            Err(e) => {
                self.enter(Stage::Failed);
                error!(
                    deployment_id = %self.config.deployment_id,
                    error = %e,
                    "build pipeline failed"
                );
                self.publish_line(&sentinel::failure_line(&e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> RunnerResult<()> {
        clone_repository(&self.config.git_url, &self.config.workspace_dir).await?;

        self.enter(Stage::Install);
        self.run_step("install", &self.config.install_command).await?;

        self.enter(Stage::Build);
        self.run_step("build", &self.config.build_command).await?;

        self.enter(Stage::Upload);
        self.upload_artifacts().await
    }

    fn enter(&mut self, stage: Stage) {
        debug!(from = %self.stage, to = %stage, "pipeline stage transition");
        self.stage = stage;
    }

    /// Run one build step, streaming its output to the bus.
    async fn run_step(&self, step: &'static str, command: &str) -> RunnerResult<()> {
        info!(step, command, "running build step");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.config.workspace_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunnerError::StepIo { step, source })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let mut stdout_reader = stdout.map(|s| BufReader::new(s).lines());
        let mut stderr_reader = stderr.map(|s| BufReader::new(s).lines());

        let mut stdout_done = stdout_reader.is_none();
        let mut stderr_done = stderr_reader.is_none();

        // Read stdout and stderr concurrently so neither pipe can fill
        // up and stall the subprocess.
        while !stdout_done || !stderr_done {
            tokio::select! {
                line = async {
                    match stdout_reader.as_mut() {
                        Some(reader) => reader.next_line().await,
                        None => std::future::pending().await,
                    }
                }, if !stdout_done => {
                    match line {
                        Ok(Some(line)) => self.publish_line(&line).await,
                        Ok(None) => stdout_done = true,
                        Err(e) => {
                            warn!(step, error = %e, "error reading stdout");
                            stdout_done = true;
                        }
                    }
                }
                line = async {
                    match stderr_reader.as_mut() {
                        Some(reader) => reader.next_line().await,
                        None => std::future::pending().await,
                    }
                }, if !stderr_done => {
                    match line {
                        Ok(Some(line)) => self.publish_line(&line).await,
                        Ok(None) => stderr_done = true,
                        Err(e) => {
                            warn!(step, error = %e, "error reading stderr");
                            stderr_done = true;
                        }
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|source| RunnerError::StepIo { step, source })?;

        if status.success() {
            info!(step, "build step completed");
            Ok(())
        } else {
            let code = status.code().unwrap_or(-1);
            Err(RunnerError::StepFailed { step, code })
        }
    }

    async fn upload_artifacts(&self) -> RunnerResult<()> {
        let output = self.config.output_path();
        let files = collect_output_files(&output)?;

        info!(
            count = files.len(),
            path = %output.display(),
            "uploading build output"
        );
        self.publish_line(&format!("INFO: Uploading {} output files...", files.len()))
            .await;

        for file in &files {
            let key = format!(
                "{}/{}/{}",
                self.config.project_id, self.config.deployment_id, file.relative
            );
            self.uploader.upload(&key, &file.path).await?;
        }

        Ok(())
    }

    async fn publish_line(&self, line: &str) {
        self.sink
            .publish(BuildMessage::new(
                self.config.project_id.clone(),
                self.config.deployment_id.clone(),
                line,
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use plinth_core::Sentinel;

    use crate::artifact::MemoryUploader;
    use crate::config::{BusConfig, StorageConfig};
    use crate::sink::MemorySink;

    fn test_config(git_url: &str, workspace: &Path, install: &str, build: &str) -> RunnerConfig {
        RunnerConfig {
            project_id: plinth_core::ProjectId::new("proj-1"),
            deployment_id: plinth_core::DeploymentId::new("dep-1"),
            git_url: git_url.to_owned(),
            workspace_dir: workspace.to_path_buf(),
            output_dir: "dist".to_owned(),
            install_command: install.to_owned(),
            build_command: build.to_owned(),
            bus: BusConfig {
                brokers: "localhost:9092".to_owned(),
                topic: "build-logs".to_owned(),
                client_id: "test".to_owned(),
            },
            storage: StorageConfig {
                endpoint: "http://localhost:9000".to_owned(),
                bucket: "artifacts".to_owned(),
                region: "auto".to_owned(),
                access_key_id: "key".to_owned(),
                secret_access_key: "secret".to_owned(),
            },
        }
    }

    /// Create a local git repository to clone from.
    fn init_source_repo(dir: &Path) {
        let run = |args: &[&str]| {
            let status = std::process::Command::new("git")
                .args(args)
                .current_dir(dir)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .expect("git not available");
            assert!(status.success(), "git {args:?} failed");
        };

        std::fs::write(dir.join("README.md"), "test site").unwrap();
        run(&["init", "--initial-branch=main", "."]);
        run(&["add", "."]);
        run(&[
            "-c",
            "user.email=dev@example.com",
            "-c",
            "user.name=dev",
            "commit",
            "-m",
            "initial",
        ]);
    }

    fn failure_count(lines: &[String]) -> usize {
        lines
            .iter()
            .filter(|l| Sentinel::detect(l) == Some(Sentinel::Failure))
            .count()
    }

    #[tokio::test]
    async fn failing_install_emits_one_failure_sentinel_and_skips_everything() {
        let source = tempfile::tempdir().unwrap();
        init_source_repo(source.path());
        let workspace = tempfile::tempdir().unwrap();
        let workspace_dir = workspace.path().join("checkout");

        let marker = workspace.path().join("build-ran");
        let config = test_config(
            &source.path().display().to_string(),
            &workspace_dir,
            "echo boom >&2; exit 1",
            &format!("touch {}", marker.display()),
        );

        let sink = MemorySink::new();
        let uploader = MemoryUploader::new();
        let pipeline = BuildPipeline::new(config, sink.clone(), uploader.clone());

        let result = pipeline.run().await;
        assert!(matches!(
            result,
            Err(RunnerError::StepFailed {
                step: "install",
                code: 1
            })
        ));

        let lines = sink.lines();
        assert_eq!(lines.first().map(String::as_str), Some(sentinel::START_LINE));
        assert_eq!(failure_count(&lines), 1);
        // The subprocess stderr was streamed before the sentinel.
        assert!(lines.iter().any(|l| l == "boom"));

        // Build never started, nothing was uploaded.
        assert!(!marker.exists());
        assert!(uploader.keys().is_empty());
    }

    #[tokio::test]
    async fn happy_path_uploads_then_emits_success() {
        let source = tempfile::tempdir().unwrap();
        init_source_repo(source.path());
        let workspace = tempfile::tempdir().unwrap();
        let workspace_dir = workspace.path().join("checkout");

        let config = test_config(
            &source.path().display().to_string(),
            &workspace_dir,
            "echo installing",
            "mkdir -p dist/assets \
             && echo '<html></html>' > dist/index.html \
             && echo 'body{}' > dist/assets/site.css",
        );

        let sink = MemorySink::new();
        let uploader = MemoryUploader::new();
        let pipeline = BuildPipeline::new(config, sink.clone(), uploader.clone());

        pipeline.run().await.unwrap();

        let lines = sink.lines();
        assert_eq!(lines.first().map(String::as_str), Some(sentinel::START_LINE));
        assert_eq!(
            lines.last().map(String::as_str),
            Some(sentinel::SUCCESS_LINE)
        );
        assert_eq!(failure_count(&lines), 0);
        assert!(lines.iter().any(|l| l == "installing"));

        let keys = uploader.keys();
        assert!(keys.contains(&"proj-1/dep-1/index.html".to_owned()));
        assert!(keys.contains(&"proj-1/dep-1/assets/site.css".to_owned()));
    }

    #[tokio::test]
    async fn failed_checkout_still_ends_with_failure_sentinel() {
        let workspace = tempfile::tempdir().unwrap();
        let workspace_dir = workspace.path().join("checkout");

        let config = test_config(
            &workspace.path().join("no-such-repo").display().to_string(),
            &workspace_dir,
            "echo never",
            "echo never",
        );

        let sink = MemorySink::new();
        let uploader = MemoryUploader::new();
        let pipeline = BuildPipeline::new(config, sink.clone(), uploader.clone());

        assert!(pipeline.run().await.is_err());

        let lines = sink.lines();
        assert_eq!(failure_count(&lines), 1);
        assert!(uploader.keys().is_empty());
    }

    #[tokio::test]
    async fn every_message_is_tagged_with_the_deployment() {
        let source = tempfile::tempdir().unwrap();
        init_source_repo(source.path());
        let workspace = tempfile::tempdir().unwrap();

        let config = test_config(
            &source.path().display().to_string(),
            &workspace.path().join("checkout"),
            "echo one && echo two",
            "mkdir -p dist && echo hi > dist/index.html",
        );

        let sink = MemorySink::new();
        let pipeline = BuildPipeline::new(config, sink.clone(), MemoryUploader::new());
        pipeline.run().await.unwrap();

        for message in sink.messages() {
            assert_eq!(message.partition_key(), "dep-1");
            assert_eq!(message.project_id.as_str(), "proj-1");
        }
    }
}

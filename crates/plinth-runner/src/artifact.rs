//! Artifact enumeration and upload.
//!
//! After a successful build the runner walks the output directory and
//! uploads every file under a deployment-scoped object key. Keys use the
//! layout `{project_id}/{deployment_id}/{relative_path}` and objects are
//! never overwritten once written.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::RunnerError;

/// A file found in the build output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the output root, `/`-separated.
    pub relative: String,
}

/// Recursively enumerate the build output directory.
///
/// Directories themselves are skipped; only regular files are returned.
pub fn collect_output_files(root: &Path) -> Result<Vec<OutputFile>, RunnerError> {
    if !root.is_dir() {
        return Err(RunnerError::OutputMissing {
            path: root.display().to_string(),
            reason: "not a directory".to_owned(),
        });
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                pending.push(path);
                continue;
            }

            let relative = path
                .strip_prefix(root)
                .map_err(|_| RunnerError::OutputMissing {
                    path: path.display().to_string(),
                    reason: "escapes the output root".to_owned(),
                })?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            files.push(OutputFile { path, relative });
        }
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Infer a content type from a file extension.
#[must_use]
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") | Some("mjs") => "text/javascript",
        Some("json") | Some("map") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("webmanifest") => "application/manifest+json",
        _ => "application/octet-stream",
    }
}

/// Destination for built artifact files.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    /// Upload one local file under the given object key.
    async fn upload(&self, key: &str, local_path: &Path) -> Result<(), RunnerError>;
}

/// S3-compatible artifact store.
pub struct ArtifactStore {
    store: AmazonS3,
    bucket: String,
}

impl ArtifactStore {
    /// Create a client from storage configuration.
    pub fn new(config: &StorageConfig) -> Result<Self, RunnerError> {
        let store = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_allow_http(config.endpoint.starts_with("http://"))
            .build()
            .map_err(|e| RunnerError::Config(format!("failed to create storage client: {e}")))?;

        info!(
            endpoint = %config.endpoint,
            bucket = %config.bucket,
            "artifact store client created"
        );

        Ok(Self {
            store,
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl ArtifactUploader for ArtifactStore {
    async fn upload(&self, key: &str, local_path: &Path) -> Result<(), RunnerError> {
        let object_path = ObjectPath::parse(key).map_err(|e| RunnerError::Upload {
            key: key.to_owned(),
            reason: e.to_string(),
        })?;

        let data = tokio::fs::read(local_path).await?;
        let size = data.len();
        let payload: PutPayload = Bytes::from(data).into();

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            content_type_for(local_path).into(),
        );

        self.store
            .put_opts(
                &object_path,
                payload,
                PutOptions {
                    attributes,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| RunnerError::Upload {
                key: key.to_owned(),
                reason: e.to_string(),
            })?;

        debug!(key = %key, bucket = %self.bucket, size, "uploaded artifact file");
        Ok(())
    }
}

/// In-memory uploader that records keys, for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryUploader {
    keys: Arc<Mutex<Vec<String>>>,
}

impl MemoryUploader {
    /// Create an empty uploader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys of every uploaded object, in upload order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().map(|k| k.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ArtifactUploader for MemoryUploader {
    async fn upload(&self, key: &str, _local_path: &Path) -> Result<(), RunnerError> {
        if let Ok(mut keys) = self.keys.lock() {
            keys.push(key.to_owned());
        }
        Ok(())
    }
}

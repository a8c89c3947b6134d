//! OpenDAL Operator factory for layer storage backends

use anyhow::{Context, Result};
use opendal::Operator;

/// Minimal config needed to build an S3 operator
/// (full config lives in zinfo-core's StorageConfig)
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub root: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// S3 access keys
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

fn with_layers(op: Operator) -> Operator {
    op.layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
}

/// Build an OpenDAL Operator for any S3-compatible endpoint.
///
/// Uses path-style addressing (default in opendal 0.55), which MinIO and
/// SeaweedFS require.
pub fn build_operator(cfg: &StorageConfig) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .root(&cfg.root)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .finish();
    Ok(with_layers(op))
}

/// Build an operator over a local directory.
pub fn build_fs_operator(root: &str) -> Result<Operator> {
    let builder = opendal::services::Fs::default().root(root);
    let op = Operator::new(builder)
        .with_context(|| format!("creating OpenDAL fs operator at {root}"))?
        .finish();
    Ok(with_layers(op))
}

/// Build an operator from zinfo-core config.
///
/// An empty endpoint selects the local filesystem under `storage.root`.
/// Otherwise `credentials` are required. If `enforce_tls` is true and the
/// endpoint uses HTTP, this returns an error; without it a warning is logged.
pub fn build_from_core_config(
    storage: &zinfo_core::config::StorageConfig,
    credentials: Option<&Credentials>,
) -> Result<Operator> {
    if storage.endpoint.is_empty() {
        tracing::debug!(root = %storage.root, "using local filesystem storage");
        return build_fs_operator(&storage.root);
    }

    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted. \
             Set storage.enforce_tls = true and use HTTPS in production."
        );
    }

    let creds = credentials.context("S3 credentials required for a remote endpoint")?;
    build_operator(&StorageConfig {
        endpoint: storage.endpoint.clone(),
        region: storage.region.clone(),
        bucket: storage.bucket.clone(),
        root: storage.root.clone(),
        access_key_id: creds.access_key_id.clone(),
        secret_access_key: creds.secret_access_key.clone(),
    })
}

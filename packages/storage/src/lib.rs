//! Object storage for per-unit partial results.
//!
//! Each work unit writes the ASCII decimal hit count of its sampling loop to
//! `{prefix}/{run_name}/{chunk_index}`. Backends:
//! - S3-compatible storage for real fleets
//! - On-disk storage for local runs
//! - In-memory storage for tests
//!
//! The store is a thin wrapper around `object_store`, which provides all three.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::TryStreamExt;
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("result not found: {0}")]
    NotFound(String),

    #[error("malformed result at {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(object_store::Error),
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            other => StorageError::ObjectStore(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    S3,
    Filesystem,
    Memory,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::S3 => "s3",
            StorageKind::Filesystem => "filesystem",
            StorageKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub allow_http: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub virtual_hosted_style: bool,
}

#[derive(Debug, Clone)]
pub enum StorageBackendConfig {
    S3(S3Config),
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional key prefix applied in front of every result locator.
    pub prefix: Option<String>,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendConfig::Memory,
            prefix: None,
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendConfig::Filesystem { root: root.into() },
            prefix: None,
        }
    }

    pub fn s3(cfg: S3Config) -> Self {
        Self {
            backend: StorageBackendConfig::S3(cfg),
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = non_empty(prefix.into());
        self
    }

    /// Build a config from environment variables.
    ///
    /// Selection rules:
    /// - If `RESULTS_BACKEND` is set: use it (`s3`, `filesystem`, `memory`)
    /// - Otherwise: default to filesystem (`./data/results`)
    ///
    /// S3 env vars (S3-compatible):
    /// - `RESULTS_BUCKET` (required when backend is `s3`)
    /// - `AWS_REGION` (default: `us-east-1`)
    /// - `RESULTS_ENDPOINT` (optional, e.g. `http://localhost:9000`)
    /// - `RESULTS_ALLOW_HTTP` (`true`/`false`, default: auto true if endpoint is http://)
    /// - `RESULTS_VIRTUAL_HOSTED_STYLE` (`true`/`false`, default: false)
    /// - `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN` (optional)
    ///
    /// Filesystem env vars:
    /// - `RESULTS_FS_ROOT` (default: `./data/results`)
    ///
    /// Common:
    /// - `RESULTS_PREFIX` (optional, e.g. `pi-estimates/`)
    pub fn from_env() -> Result<Self, StorageError> {
        let backend = std::env::var("RESULTS_BACKEND").ok();
        let prefix = std::env::var("RESULTS_PREFIX").ok().and_then(non_empty);

        let cfg = match backend.as_deref() {
            Some("s3") => Self::s3(read_s3_config()?),
            Some("filesystem") | Some("fs") | None => Self::filesystem(fs_root()),
            Some("memory") | Some("mem") => Self::memory(),
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported RESULTS_BACKEND={other} (expected s3|filesystem|memory)"
                )));
            }
        };

        Ok(Self { prefix, ..cfg })
    }
}

/// Handle to the partial-result store.
#[derive(Clone)]
pub struct Storage {
    kind: StorageKind,
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("kind", &self.kind)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl Storage {
    pub fn kind_str(&self) -> &'static str {
        self.kind.as_str()
    }

    pub async fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let (kind, store) = match cfg.backend {
            StorageBackendConfig::S3(s3) => (StorageKind::S3, Arc::new(build_s3(s3)?) as _),
            StorageBackendConfig::Filesystem { root } => {
                ensure_dir(&root)?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                (StorageKind::Filesystem, Arc::new(fs) as _)
            }
            StorageBackendConfig::Memory => {
                let mem = object_store::memory::InMemory::new();
                (StorageKind::Memory, Arc::new(mem) as _)
            }
        };

        tracing::debug!(backend = kind.as_str(), "result store ready");

        Ok(Self {
            kind,
            store,
            prefix: cfg.prefix.and_then(non_empty),
        })
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?).await
    }

    fn to_path(&self, key: &str) -> Result<Path, StorageError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::InvalidConfig(
                "object key must not be empty".to_string(),
            ));
        }

        let joined = match self.prefix.as_deref() {
            Some(prefix) => {
                let prefix = prefix.trim_matches('/');
                if prefix.is_empty() {
                    key.to_string()
                } else {
                    format!("{prefix}/{key}")
                }
            }
            None => key.to_string(),
        };

        Ok(Path::from(joined))
    }

    pub async fn put_bytes(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store
            .put(&path, object_store::PutPayload::from(bytes))
            .await?;
        Ok(())
    }

    pub async fn get_bytes(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.to_path(key)?;
        let res = self.store.get(&path).await?;
        Ok(res.bytes().await?)
    }

    /// Delete every object under `prefix`, returning how many were removed.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let path = self.to_path(prefix)?;
        let objects: Vec<object_store::ObjectMeta> =
            self.store.list(Some(&path)).try_collect().await?;
        for meta in &objects {
            self.store.delete(&meta.location).await?;
        }
        Ok(objects.len())
    }

    /// Write a unit's hit count in the format sampling jobs produce.
    pub async fn put_hit_count(&self, locator: &str, hits: u64) -> Result<(), StorageError> {
        self.put_bytes(locator, Bytes::from(hits.to_string())).await
    }

    /// Read and decode the hit count a unit wrote to `locator`.
    pub async fn get_hit_count(&self, locator: &str) -> Result<u64, StorageError> {
        let bytes = self.get_bytes(locator).await?;
        parse_hit_count(locator, &bytes)
    }
}

/// Decode the ASCII decimal body of a partial result.
pub fn parse_hit_count(key: &str, bytes: &[u8]) -> Result<u64, StorageError> {
    let malformed = |reason: String| StorageError::Malformed {
        key: key.to_string(),
        reason,
    };

    let text = std::str::from_utf8(bytes).map_err(|e| malformed(format!("not utf-8: {e}")))?;
    let text = text.trim();
    if text.is_empty() {
        return Err(malformed("empty object".to_string()));
    }
    text.parse::<u64>()
        .map_err(|e| malformed(format!("{text:?} is not a hit count: {e}")))
}

fn ensure_dir(root: &FsPath) -> Result<(), StorageError> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

fn fs_root() -> PathBuf {
    std::env::var("RESULTS_FS_ROOT")
        .ok()
        .and_then(non_empty)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./data/results"))
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool_env(var_name: &str) -> Result<Option<bool>, StorageError> {
    let v = match std::env::var(var_name) {
        Ok(v) => v,
        Err(std::env::VarError::NotPresent) => return Ok(None),
        Err(e) => {
            return Err(StorageError::InvalidConfig(format!(
                "failed reading {var_name}: {e}"
            )));
        }
    };

    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(Some(true)),
        "0" | "false" | "no" | "n" => Ok(Some(false)),
        _ => Err(StorageError::InvalidConfig(format!(
            "invalid boolean for {var_name}={v} (expected true/false)"
        ))),
    }
}

fn read_s3_config() -> Result<S3Config, StorageError> {
    let bucket = std::env::var("RESULTS_BUCKET")
        .ok()
        .and_then(non_empty)
        .ok_or_else(|| {
            StorageError::InvalidConfig("RESULTS_BUCKET is required for s3 backend".into())
        })?;

    let region = std::env::var("AWS_REGION")
        .ok()
        .and_then(non_empty)
        .unwrap_or_else(|| "us-east-1".to_string());

    let endpoint = std::env::var("RESULTS_ENDPOINT").ok().and_then(non_empty);
    let allow_http = match parse_bool_env("RESULTS_ALLOW_HTTP")? {
        Some(v) => v,
        None => endpoint
            .as_deref()
            .is_some_and(|e| e.trim_start().to_ascii_lowercase().starts_with("http://")),
    };

    let virtual_hosted_style = parse_bool_env("RESULTS_VIRTUAL_HOSTED_STYLE")?.unwrap_or(false);

    Ok(S3Config {
        bucket,
        region,
        endpoint,
        allow_http,
        access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok().and_then(non_empty),
        secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY")
            .ok()
            .and_then(non_empty),
        session_token: std::env::var("AWS_SESSION_TOKEN").ok().and_then(non_empty),
        virtual_hosted_style,
    })
}

fn build_s3(cfg: S3Config) -> Result<object_store::aws::AmazonS3, StorageError> {
    let mut builder = object_store::aws::AmazonS3Builder::new()
        .with_bucket_name(cfg.bucket)
        .with_region(cfg.region)
        .with_virtual_hosted_style_request(cfg.virtual_hosted_style);

    if let Some(endpoint) = cfg.endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if cfg.allow_http {
        builder = builder.with_allow_http(true);
    }
    if let Some(access_key_id) = cfg.access_key_id {
        builder = builder.with_access_key_id(access_key_id);
    }
    if let Some(secret_access_key) = cfg.secret_access_key {
        builder = builder.with_secret_access_key(secret_access_key);
    }
    if let Some(session_token) = cfg.session_token {
        builder = builder.with_token(session_token);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[tokio::test]
    async fn in_memory_hit_count() -> Result<(), StorageError> {
        let storage = Storage::new(StorageConfig::memory()).await?;
        storage.put_hit_count("run/0", 3141).await?;
        assert_eq!(storage.get_hit_count("run/0").await?, 3141);
        Ok(())
    }

    #[tokio::test]
    async fn missing_result_is_not_found() -> Result<(), StorageError> {
        let storage = Storage::new(StorageConfig::memory()).await?;
        let err = storage.get_hit_count("run/9").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        Ok(())
    }

    #[tokio::test]
    async fn delete_prefix_only_clears_that_run() -> Result<(), StorageError> {
        let storage = Storage::new(StorageConfig::memory().with_prefix("estimates")).await?;
        storage.put_hit_count("reuse/0", 1).await?;
        storage.put_hit_count("reuse/1", 2).await?;
        storage.put_hit_count("reuse-2/0", 3).await?;
        storage.put_hit_count("other/0", 4).await?;

        assert_eq!(storage.delete_prefix("reuse").await?, 2);
        let err = storage.get_hit_count("reuse/0").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert_eq!(storage.get_hit_count("reuse-2/0").await?, 3);
        assert_eq!(storage.get_hit_count("other/0").await?, 4);

        assert_eq!(storage.delete_prefix("reuse").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn filesystem_with_prefix() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let storage =
            Storage::new(StorageConfig::filesystem(dir.path()).with_prefix("estimates/")).await?;
        storage.put_bytes("run/1", Bytes::from("  785\n")).await?;
        assert_eq!(storage.get_hit_count("run/1").await?, 785);
        assert!(dir.path().join("estimates").join("run").join("1").exists());
        Ok(())
    }

    #[test]
    fn rejects_malformed_bodies() {
        let bodies: [&[u8]; 6] = [b"", b"  ", b"12.5", b"-3", b"abc", &[0xff, 0xfe]];
        for body in bodies {
            let err = parse_hit_count("k", body).unwrap_err();
            assert!(matches!(err, StorageError::Malformed { .. }));
        }
    }
}

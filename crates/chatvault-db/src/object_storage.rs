//! Filesystem object store with signed read URLs.
//!
//! Objects live under `{base_path}/{bucket}/{name}` and are addressed by the
//! locator `fs://{bucket}/{name}`. Writes are atomic (a temp file unique to
//! each write, then rename) so a concurrent reader never observes a partial
//! object, concurrent writers of one name never clobber each other's temp
//! file, and re-uploading the same name overwrites the previous bytes.
//!
//! Read URLs are `{public_base_url}/{bucket}/{name}?expires=..&signature=..`
//! where the signature is HMAC-SHA256 over the bucket, name and expiry. The
//! file server in front of the store checks them with [`verify_signature`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatvault_db::object_storage::{FilesystemObjectStore, StorageConfig};
//!
//! let store = FilesystemObjectStore::new(StorageConfig::from_env()?);
//! let locator = store.put_object("alice/image/10.jpg", bytes, "image/jpeg").await?;
//! let url = store.presign_get("alice/image/10.jpg", Duration::from_secs(900)).await?;
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use chatvault_core::defaults::{
    PRESIGN_EXPIRY_SECS, STORAGE_BUCKET, STORAGE_PATH, STORAGE_PUBLIC_URL,
};
use chatvault_core::env::env_parse_opt;
use chatvault_core::{split_locator, Error, ObjectStore, Result};

type HmacSha256 = Hmac<Sha256>;

/// Locator scheme for filesystem objects.
pub const LOCATOR_SCHEME: &str = "fs";

/// Object store configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory; each bucket is a subdirectory.
    pub base_path: PathBuf,
    pub bucket: String,
    /// Base URL the file server publishes buckets under.
    pub public_base_url: String,
    /// HMAC key for read URLs.
    pub signing_key: Vec<u8>,
    /// Lifetime of read URLs issued by [`FilesystemObjectStore::presign_locator`].
    pub presign_expiry: Duration,
}

impl StorageConfig {
    pub fn new(base_path: impl Into<PathBuf>, signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            base_path: base_path.into(),
            bucket: STORAGE_BUCKET.to_string(),
            public_base_url: STORAGE_PUBLIC_URL.to_string(),
            signing_key: signing_key.into(),
            presign_expiry: Duration::from_secs(PRESIGN_EXPIRY_SECS),
        }
    }

    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `STORAGE_PATH` | `./data/objects` | Root directory |
    /// | `STORAGE_BUCKET` | `chatvault` | Bucket name |
    /// | `STORAGE_PUBLIC_URL` | `http://localhost:8083/files` | Read URL base |
    /// | `STORAGE_SIGNING_KEY` | (required) | HMAC key for read URLs |
    /// | `PRESIGN_EXPIRY_SECS` | `900` | Read URL lifetime |
    pub fn from_env() -> Result<Self> {
        let signing_key = std::env::var("STORAGE_SIGNING_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("STORAGE_SIGNING_KEY must be set".to_string()))?;

        let base_path = std::env::var("STORAGE_PATH").unwrap_or_else(|_| STORAGE_PATH.to_string());
        let mut config = Self::new(base_path, signing_key.into_bytes());
        if let Ok(bucket) = std::env::var("STORAGE_BUCKET") {
            config = config.with_bucket(bucket);
        }
        if let Ok(url) = std::env::var("STORAGE_PUBLIC_URL") {
            config = config.with_public_base_url(url);
        }
        if let Some(secs) = env_parse_opt::<u64>("PRESIGN_EXPIRY_SECS")? {
            config = config.with_presign_expiry(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_presign_expiry(mut self, expiry: Duration) -> Self {
        self.presign_expiry = expiry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.presign_expiry.is_zero() {
            return Err(Error::Config("PRESIGN_EXPIRY_SECS must be positive".to_string()));
        }
        if self.bucket.is_empty() || self.bucket.contains('/') {
            return Err(Error::Config(format!(
                "invalid storage bucket: {:?}",
                self.bucket
            )));
        }
        if self.signing_key.is_empty() {
            return Err(Error::Config("storage signing key is empty".to_string()));
        }
        Ok(())
    }
}

/// Object store on the local filesystem.
pub struct FilesystemObjectStore {
    config: StorageConfig,
}

impl FilesystemObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn bucket_path(&self) -> PathBuf {
        self.config.base_path.join(&self.config.bucket)
    }

    fn full_path(&self, name: &str) -> Result<PathBuf> {
        validate_object_name(name)?;
        Ok(self.bucket_path().join(name))
    }

    /// Read a stored object back.
    pub async fn read_object(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.full_path(name)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("object {}", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Validate that the bucket directory is writable.
    ///
    /// Runs a write/read/delete round trip so misconfigured volumes fail at
    /// startup instead of on the first media job.
    pub async fn validate(&self) -> Result<()> {
        let check_path = self.bucket_path().join(".health-check");
        fs::create_dir_all(self.bucket_path())
            .await
            .map_err(|e| Error::Storage(format!("create_dir_all({:?}): {}", self.bucket_path(), e)))?;

        let data = b"storage-health-check";
        fs::write(&check_path, data)
            .await
            .map_err(|e| Error::Storage(format!("write({:?}): {}", check_path, e)))?;
        let read_back = fs::read(&check_path)
            .await
            .map_err(|e| Error::Storage(format!("read({:?}): {}", check_path, e)))?;
        if read_back != data {
            return Err(Error::Storage("read-back mismatch".to_string()));
        }
        fs::remove_file(&check_path)
            .await
            .map_err(|e| Error::Storage(format!("remove_file({:?}): {}", check_path, e)))?;
        Ok(())
    }

    /// Signed read URL for a locator this store issued, valid for the
    /// configured expiry.
    pub async fn presign_locator(&self, locator: &str) -> Result<String> {
        let (bucket, name) = split_locator(locator)
            .filter(|_| locator.starts_with(&format!("{}://", LOCATOR_SCHEME)))
            .ok_or_else(|| Error::InvalidInput(format!("not a filesystem locator: {}", locator)))?;
        if bucket != self.config.bucket {
            return Err(Error::NotFound(format!(
                "bucket {} is not served by this store",
                bucket
            )));
        }
        self.presign_get(name, self.config.presign_expiry).await
    }

    /// Sign a read of `name` valid until the unix timestamp `expires`.
    pub fn sign(&self, name: &str, expires: i64) -> Result<String> {
        sign_object(&self.config.signing_key, &self.config.bucket, name, expires)
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put_object(&self, name: &str, data: Vec<u8>, content_type: &str) -> Result<String> {
        let full_path = self.full_path(name)?;
        debug!(
            subsystem = "storage",
            component = "filesystem",
            op = "put_object",
            object = %name,
            content_type,
            size = data.len(),
            "Writing object"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "create_dir_all failed");
                Error::Storage(format!("create_dir_all({:?}): {}", parent, e))
            })?;
        }

        // Atomic write: per-write temp file + rename, so concurrent writers of
        // the same name never share a temp file.
        let temp_path = temp_path_for(&full_path);
        if let Err(e) = write_temp(&temp_path, &data).await {
            discard_temp(&temp_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, &full_path).await {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "rename failed");
            discard_temp(&temp_path).await;
            return Err(Error::Storage(format!("rename({:?}): {}", full_path, e)));
        }

        Ok(format!(
            "{}://{}/{}",
            LOCATOR_SCHEME, self.config.bucket, name
        ))
    }

    async fn presign_get(&self, name: &str, expiry: Duration) -> Result<String> {
        validate_object_name(name)?;
        if expiry.is_zero() {
            return Err(Error::InvalidInput("presign expiry must be positive".into()));
        }
        let expires = Utc::now().timestamp() + expiry.as_secs() as i64;
        let signature = self.sign(name, expires)?;
        Ok(format!(
            "{}/{}/{}?expires={}&signature={}",
            self.config.public_base_url, self.config.bucket, name, expires, signature
        ))
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut temp = path.as_os_str().to_owned();
    temp.push(format!(".{}.tmp", Uuid::now_v7()));
    PathBuf::from(temp)
}

async fn write_temp(temp_path: &Path, data: &[u8]) -> Result<()> {
    let mut file = fs::File::create(temp_path).await.map_err(|e| {
        warn!(temp_path = %temp_path.display(), error = %e, "File::create failed");
        Error::Storage(format!("create({:?}): {}", temp_path, e))
    })?;
    file.write_all(data)
        .await
        .map_err(|e| Error::Storage(format!("write({:?}): {}", temp_path, e)))?;
    file.sync_all()
        .await
        .map_err(|e| Error::Storage(format!("sync({:?}): {}", temp_path, e)))?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp_path, std::fs::Permissions::from_mode(0o644))
            .await
            .map_err(|e| Error::Storage(format!("chmod({:?}): {}", temp_path, e)))?;
    }
    Ok(())
}

async fn discard_temp(temp_path: &Path) {
    if let Err(e) = fs::remove_file(temp_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(temp_path = %temp_path.display(), error = %e, "Failed to remove temp file");
        }
    }
}

/// Reject object names that would escape the bucket directory.
pub fn validate_object_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("object name is empty".into()));
    }
    let path = Path::new(name);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes || name.ends_with('/') {
        return Err(Error::InvalidInput(format!("invalid object name: {}", name)));
    }
    Ok(())
}

fn sign_object(key: &[u8], bucket: &str, name: &str, expires: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::Config(format!("invalid signing key: {}", e)))?;
    mac.update(format!("{}/{}\n{}", bucket, name, expires).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a read URL signature against the key, rejecting expired URLs.
pub fn verify_signature(
    key: &[u8],
    bucket: &str,
    name: &str,
    expires: i64,
    signature: &str,
    now: i64,
) -> bool {
    if expires < now {
        return false;
    }
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(format!("{}/{}\n{}", bucket, name, expires).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

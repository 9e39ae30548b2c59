use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// StorageService
///
/// Contract for the object storage holding post pictures. Production talks to an
/// S3-compatible bucket (`S3StorageClient`); tests use `MockStorageService`.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the configured bucket when it is missing. Used by local setups (MinIO).
    async fn ensure_bucket_exists(&self);

    /// Stores `body` under `key`.
    async fn put_object(&self, key: &str, content_type: &str, body: Vec<u8>) -> Result<(), String>;

    /// Removes the object under `key`. Missing objects are not an error.
    async fn delete_object(&self, key: &str) -> Result<(), String>;

    /// Browser-facing URL of a stored object.
    fn public_url(&self, key: &str) -> String;
}

/// S3StorageClient
///
/// `aws-sdk-s3` client using path-style addressing, which MinIO and most S3-compatible
/// gateways require.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_base: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_base: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket fails harmlessly when the bucket is already there.
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!("create_bucket skipped: {:?}", e);
        }
    }

    async fn put_object(&self, key: &str, content_type: &str, body: Vec<u8>) -> Result<(), String> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(key))
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), String> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(key))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, sanitize_key(key))
    }
}

/// sanitize_key
///
/// Drops empty, `.` and `..` segments so a key can never climb out of its prefix.
fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// image_key
///
/// Object key for a freshly uploaded post picture: `posts/<uuid>.<ext>`. The extension is
/// taken from the client's filename when it is short and alphanumeric, `bin` otherwise.
pub fn image_key(filename: &str) -> String {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .filter(|ext| ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string());
    format!("posts/{}.{}", Uuid::new_v4(), extension)
}

/// MockStorageService
///
/// In-memory stand-in used by the test suite. Records every stored key.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all uploads fail.
    pub should_fail: bool,
    pub stored: Arc<Mutex<Vec<String>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn stored_keys(&self) -> Vec<String> {
        self.stored
            .lock()
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn put_object(
        &self,
        key: &str,
        _content_type: &str,
        _body: Vec<u8>,
    ) -> Result<(), String> {
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }
        if let Ok(mut keys) = self.stored.lock() {
            keys.push(sanitize_key(key));
        }
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), String> {
        let key = sanitize_key(key);
        if let Ok(mut keys) = self.stored.lock() {
            keys.retain(|stored| *stored != key);
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("http://localhost:9000/mock-bucket/{}", sanitize_key(key))
    }
}

/// StorageState
///
/// Shared handle to the storage service inside `AppState`.
pub type StorageState = Arc<dyn StorageService>;

//! File storage: uploads to the marketplace buckets and URL minting.
//!
//! Stored rows keep the object path (`<owner>/<uuid>.<ext>`). Views resolve
//! that path into a time-limited signed URL; values that are already absolute
//! `http(s)://` URLs are passed through untouched.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Largest accepted upload (images and certificates alike).
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    ProfilePictures,
    Images,
    CaCertificates,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::ProfilePictures => "profile-pictures",
            Bucket::Images => "images",
            Bucket::CaCertificates => "ca-certificates",
        }
    }

    /// Forum images are world-readable; everything else is served through signed URLs.
    pub fn is_public(&self) -> bool {
        matches!(self, Bucket::Images)
    }

    /// Content types each bucket accepts, with the file extension stored for them.
    fn accepted_types(&self) -> &'static [(&'static str, &'static str)] {
        const IMAGES: &[(&str, &str)] = &[
            ("image/jpeg", "jpg"),
            ("image/png", "png"),
            ("image/webp", "webp"),
        ];
        const CERTIFICATES: &[(&str, &str)] = &[
            ("application/pdf", "pdf"),
            ("image/jpeg", "jpg"),
            ("image/png", "png"),
        ];
        match self {
            Bucket::ProfilePictures | Bucket::Images => IMAGES,
            Bucket::CaCertificates => CERTIFICATES,
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload rejected: {0}")]
    Rejected(String),

    #[error("upload to {bucket} failed: {message}")]
    Upload {
        bucket: &'static str,
        message: String,
    },

    #[error("could not remove {bucket}/{path}: {message}")]
    Remove {
        bucket: &'static str,
        path: String,
        message: String,
    },

    #[error("could not sign {bucket}/{path}: {message}")]
    Sign {
        bucket: &'static str,
        path: String,
        message: String,
    },
}

/// Mints time-limited URLs for private object paths.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn sign(
        &self,
        bucket: Bucket,
        path: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError>;
}

/// Deletes stored objects.
#[async_trait]
pub trait ObjectRemover: Send + Sync {
    async fn remove(&self, bucket: Bucket, path: &str) -> Result<(), StorageError>;
}

/// Best-effort delete; failures are logged and leave the object behind.
pub async fn remove_quietly(store: &dyn ObjectRemover, bucket: Bucket, path: &str) {
    match store.remove(bucket, path).await {
        Ok(()) => info!("Removed {}/{path}", bucket.as_str()),
        Err(e) => warn!("{e}"),
    }
}

/// Removes a freshly uploaded object when the write meant to reference it failed.
pub async fn discard_on_error<T: Send, E: Send>(
    store: &dyn ObjectRemover,
    bucket: Bucket,
    path: &str,
    result: Result<T, E>,
) -> Result<T, E> {
    if result.is_err() {
        remove_quietly(store, bucket, path).await;
    }
    result
}

/// The stored object a new upload supersedes, if any. External URLs and
/// blank values are not ours to delete.
pub fn superseded_object<'a>(previous: Option<&'a str>, current: &str) -> Option<&'a str> {
    previous
        .map(str::trim)
        .filter(|p| !p.is_empty() && !is_absolute_url(p) && *p != current)
}

pub fn is_absolute_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Resolves a stored path into a viewable URL. Absolute URLs never reach the signer.
pub async fn resolve_url(
    signer: &dyn UrlSigner,
    bucket: Bucket,
    value: &str,
    expires_in: Duration,
) -> Result<String, StorageError> {
    if is_absolute_url(value) {
        return Ok(value.to_string());
    }
    signer.sign(bucket, value, expires_in).await
}

/// Checks an upload against the bucket's limits and returns the extension to store it under.
pub fn validate_upload(
    bucket: Bucket,
    content_type: &str,
    len: usize,
) -> Result<&'static str, StorageError> {
    if len == 0 {
        return Err(StorageError::Rejected("file is empty".to_string()));
    }
    if len > MAX_UPLOAD_BYTES {
        return Err(StorageError::Rejected(format!(
            "file is {len} bytes; the limit is {MAX_UPLOAD_BYTES}"
        )));
    }
    let content_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    bucket
        .accepted_types()
        .iter()
        .find(|(ct, _)| *ct == content_type)
        .map(|(_, ext)| *ext)
        .ok_or_else(|| {
            StorageError::Rejected(format!(
                "{content_type} is not accepted in {}",
                bucket.as_str()
            ))
        })
}

/// Unsigned URL under the public base; absolute URLs pass through.
pub fn public_object_url(base: &str, bucket: Bucket, path: &str) -> String {
    if is_absolute_url(path) {
        return path.to_string();
    }
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        bucket.as_str(),
        path.trim_start_matches('/')
    )
}

/// Object path for a new upload owned by `owner`.
pub fn object_path(owner: Uuid, extension: &str) -> String {
    format!("{owner}/{}.{extension}", Uuid::new_v4())
}

/// S3-compatible storage client (MinIO locally, S3 in production).
#[derive(Clone)]
pub struct Storage {
    client: S3Client,
    public_base_url: String,
    default_expiry: Duration,
}

impl Storage {
    pub fn new(client: S3Client, public_base_url: &str, default_expiry: Duration) -> Self {
        Self {
            client,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            default_expiry,
        }
    }

    /// Validates and stores a file, returning its object path.
    pub async fn upload(
        &self,
        bucket: Bucket,
        owner: Uuid,
        content_type: &str,
        body: Bytes,
    ) -> Result<String, StorageError> {
        let extension = validate_upload(bucket, content_type, body.len())?;
        let path = object_path(owner, extension);
        let size = body.len();

        self.client
            .put_object()
            .bucket(bucket.as_str())
            .key(&path)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                bucket: bucket.as_str(),
                message: e.to_string(),
            })?;

        info!("Uploaded {size} bytes to {}/{}", bucket.as_str(), path);
        Ok(path)
    }

    /// Public (unsigned) URL for buckets served without access control.
    pub fn public_url(&self, bucket: Bucket, path: &str) -> String {
        public_object_url(&self.public_base_url, bucket, path)
    }

    /// Signed URL with an explicit expiry, or the configured default.
    pub async fn signed_url(
        &self,
        bucket: Bucket,
        path: &str,
        expires_in: Option<Duration>,
    ) -> Result<String, StorageError> {
        resolve_url(self, bucket, path, expires_in.unwrap_or(self.default_expiry)).await
    }

    /// Best-effort resolution for view shapes: a signing failure yields `None`.
    pub async fn resolve(&self, bucket: Bucket, value: Option<&str>) -> Option<String> {
        let value = value.filter(|v| !v.trim().is_empty())?;
        if bucket.is_public() {
            return Some(self.public_url(bucket, value));
        }
        match self.signed_url(bucket, value, None).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }
}

#[async_trait]
impl UrlSigner for Storage {
    async fn sign(
        &self,
        bucket: Bucket,
        path: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let sign_error = |message: String| StorageError::Sign {
            bucket: bucket.as_str(),
            path: path.to_string(),
            message,
        };
        let presigning = PresigningConfig::expires_in(expires_in).map_err(|e| sign_error(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(bucket.as_str())
            .key(path)
            .presigned(presigning)
            .await
            .map_err(|e| sign_error(e.to_string()))?;
        Ok(request.uri().to_string())
    }
}

#[async_trait]
impl ObjectRemover for Storage {
    async fn remove(&self, bucket: Bucket, path: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket.as_str())
            .key(path)
            .send()
            .await
            .map_err(|e| StorageError::Remove {
                bucket: bucket.as_str(),
                path: path.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

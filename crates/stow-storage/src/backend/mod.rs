//! Backend clients behind one capability interface.
//!
//! [`ObjectStorage`] is the uniform capability set. [`MinioClient`] and
//! [`AwsClient`] implement it over the S3 SDK and map every native failure onto
//! [`StorageError`]. A [`ClientFactory`] builds a [`StorageClient`] for a given
//! endpoint and credential set.

mod aws;
mod factory;
mod minio;
mod s3;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use derive_more::Deref;
use futures::stream::BoxStream;
use url::Url;

pub use self::aws::{Aws, AwsClient};
pub use self::factory::S3ClientFactory;
pub use self::minio::{Minio, MinioClient};
pub use self::s3::{S3Flavor, S3Storage};
use crate::config::{BackendKind, Settings};
use crate::credentials::SessionCredentials;
use crate::error::{ClientBuildError, StorageError};
use crate::types::{BucketRef, ObjectRef};

/// Lazy, finite listing of objects. Dropping it stops paging.
pub type ObjectStream = BoxStream<'static, Result<ObjectRef, StorageError>>;

/// Object and bucket operations common to every backend.
///
/// Implementations never retry and never branch callers on backend identity:
/// every failure is reported as a [`StorageError`].
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    /// Returns the backend this client talks to.
    fn backend(&self) -> BackendKind;

    /// Stores `data` under `key`, replacing any existing object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<ObjectRef, StorageError>;

    /// Streams a local file into `key`.
    async fn put_file(&self, bucket: &str, key: &str, path: &Path)
    -> Result<ObjectRef, StorageError>;

    /// Reads a whole object into memory.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    /// Streams an object into a local file and returns the bytes written.
    async fn download_file(&self, bucket: &str, key: &str, path: &Path)
    -> Result<u64, StorageError>;

    /// Returns object metadata without the body.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectRef, StorageError>;

    /// Deletes an object.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Copies an object server-side.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<(), StorageError>;

    /// Lists every object whose key starts with `prefix`.
    ///
    /// Each call starts a fresh listing.
    fn list_objects(&self, bucket: &str, prefix: &str) -> ObjectStream;

    /// Returns whether the bucket exists.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Creates the bucket if it does not exist yet.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Deletes an empty bucket.
    async fn remove_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    /// Lists every bucket visible to the credentials.
    async fn list_buckets(&self) -> Result<Vec<BucketRef>, StorageError>;

    /// Signs a time-limited download URL; `ttl` must be positive.
    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Url, StorageError>;

    /// Signs a time-limited upload URL; `ttl` must be positive.
    async fn presigned_put_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Url, StorageError>;
}

/// A backend-bound handle plus the endpoint and credential epoch it was
/// built with.
///
/// Dereferences to the wrapped [`ObjectStorage`]. Cloning is cheap.
#[derive(Clone, Deref)]
pub struct StorageClient {
    #[deref]
    inner: Arc<dyn ObjectStorage>,
    endpoint: Url,
    epoch: u64,
}

impl StorageClient {
    /// Wraps a backend client.
    pub fn new(inner: Arc<dyn ObjectStorage>, endpoint: Url, epoch: u64) -> Self {
        Self {
            inner,
            endpoint,
            epoch,
        }
    }

    /// Returns the endpoint the client talks to.
    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the epoch of the credentials the client signs with.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageClient")
            .field("backend", &self.inner.backend())
            .field("endpoint", &self.endpoint.as_str())
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Builds backend clients.
///
/// Construction is local: validation of the endpoint and the TLS/region
/// combination happens here, no request is sent.
pub trait ClientFactory: Send + Sync + 'static {
    /// Builds a client for the configured backend bound to `endpoint`.
    fn build(
        &self,
        settings: &Settings,
        credentials: &SessionCredentials,
        endpoint: &Url,
    ) -> Result<StorageClient, ClientBuildError>;
}

//! The storage facade callers use.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::TryStreamExt;
use jiff::SignedDuration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::backend::{ClientFactory, ObjectStream, S3ClientFactory, StorageClient};
use crate::config::{Settings, StorageConfig};
use crate::credentials::{CredentialProvider, TokenService};
use crate::delegation::{DelegatedAccess, DelegatedCredentials, Delegation, StsDelegation};
use crate::endpoint::EndpointChoice;
use crate::error::{Result, StorageError, StorageErrorKind};
use crate::types::{BucketRef, ObjectRef, validate_bucket_name, validate_object_key};
use crate::{TRACING_TARGET_BUCKETS, TRACING_TARGET_CLIENT, TRACING_TARGET_OBJECTS};

/// Bucket receiving archived copies, keyed `<source-bucket>/<key>`.
pub const ARCHIVE_BUCKET: &str = "archive";

/// Longest lifetime S3 accepts for a presigned URL.
const MAX_PRESIGN_TTL: SignedDuration = SignedDuration::from_hours(7 * 24);

/// Single entry point for object and bucket operations.
///
/// Each call obtains current credentials and reuses the client built for
/// the same endpoint and credential epoch, rebuilding it only after a
/// credential refresh. Server-side operations use the internal endpoint;
/// presigned URLs use the external one. Cloning is cheap and clones share
/// clients and credentials.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

struct StorageInner {
    settings: Settings,
    credentials: CredentialProvider,
    factory: Arc<dyn ClientFactory>,
    delegation: Arc<dyn Delegation>,
    internal: Mutex<Option<StorageClient>>,
    external: Mutex<Option<StorageClient>>,
}

/// Builder for [`Storage`] with replaceable collaborators.
pub struct StorageBuilder {
    settings: Settings,
    credentials: Option<CredentialProvider>,
    factory: Option<Arc<dyn ClientFactory>>,
    delegation: Option<Arc<dyn Delegation>>,
}

impl StorageBuilder {
    /// Replaces the credential provider.
    pub fn with_credentials(mut self, credentials: CredentialProvider) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Uses session credentials from `service`, refreshed with the configured margin.
    pub fn with_token_service(self, service: Arc<dyn TokenService>) -> Self {
        let margin = self.settings.refresh_margin();
        self.with_credentials(CredentialProvider::session(service, margin))
    }

    /// Replaces the backend client factory.
    pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Replaces the issuer of delegated credentials.
    pub fn with_delegation(mut self, delegation: Arc<dyn Delegation>) -> Self {
        self.delegation = Some(delegation);
        self
    }

    /// Builds the facade. No request is sent.
    pub fn build(self) -> Result<Storage> {
        let credentials = match self.credentials {
            Some(credentials) => credentials,
            None => CredentialProvider::from_settings(&self.settings)?,
        };
        let factory: Arc<dyn ClientFactory> = match self.factory {
            Some(factory) => factory,
            None => Arc::new(S3ClientFactory),
        };
        let delegation: Arc<dyn Delegation> = match self.delegation {
            Some(delegation) => delegation,
            None => Arc::new(StsDelegation::from_settings(&self.settings)),
        };

        info!(
            target: TRACING_TARGET_CLIENT,
            backend = %self.settings.backend(),
            internal_endpoint = %self.settings.internal_endpoint(),
            external_endpoint = %self.settings.external_endpoint(),
            "Storage facade initialized"
        );

        Ok(Storage {
            inner: Arc::new(StorageInner {
                settings: self.settings,
                credentials,
                factory,
                delegation,
                internal: Mutex::new(None),
                external: Mutex::new(None),
            }),
        })
    }
}

impl Storage {
    /// Returns a builder over resolved settings.
    pub fn builder(settings: Settings) -> StorageBuilder {
        StorageBuilder {
            settings,
            credentials: None,
            factory: None,
            delegation: None,
        }
    }

    /// Creates the facade with the S3 SDK backend and STS credentials.
    pub fn new(settings: Settings) -> Result<Self> {
        Self::builder(settings).build()
    }

    /// Resolves the configuration from the environment and creates the facade.
    pub fn from_env() -> Result<Self> {
        let settings = StorageConfig::from_env().resolve()?;
        Self::new(settings)
    }

    /// Returns the client for `choice`, rebuilding it if credentials were
    /// refreshed since it was built.
    async fn client(&self, choice: EndpointChoice) -> Result<StorageClient> {
        let credentials = self.inner.credentials.credentials().await?;
        let slot = match choice {
            EndpointChoice::Internal => &self.inner.internal,
            EndpointChoice::External => &self.inner.external,
        };

        let mut slot = slot.lock().await;
        // A client built from newer credentials than ours is still good.
        if let Some(client) = slot.as_ref()
            && client.epoch() >= credentials.epoch()
        {
            return Ok(client.clone());
        }

        let endpoint = self.inner.settings.endpoint(choice);
        let client = self
            .inner
            .factory
            .build(&self.inner.settings, &credentials, endpoint)
            .inspect_err(|err| {
                error!(
                    target: TRACING_TARGET_CLIENT,
                    endpoint = %endpoint,
                    error = %err,
                    "Failed to build storage client"
                );
            })?;

        debug!(
            target: TRACING_TARGET_CLIENT,
            choice = %choice,
            previous_epoch = ?slot.as_ref().map(StorageClient::epoch),
            epoch = client.epoch(),
            "Storage client (re)built"
        );

        *slot = Some(client.clone());
        Ok(client)
    }

    /// Stores `data` under `key`, creating the bucket if needed.
    #[instrument(skip(self, data), target = TRACING_TARGET_OBJECTS, fields(bucket = %bucket, key = %key))]
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes> + Send,
    ) -> Result<ObjectRef> {
        validate_object(bucket, key)?;
        let data = data.into();
        let client = self.client(EndpointChoice::Internal).await?;
        client.ensure_bucket(bucket).await?;

        debug!(
            target: TRACING_TARGET_OBJECTS,
            size = data.len(),
            "Uploading object"
        );

        let start = Instant::now();
        let object = client
            .put_object(bucket, key, data, None)
            .await
            .inspect_err(|err| {
                error!(
                    target: TRACING_TARGET_OBJECTS,
                    error = %err,
                    elapsed = ?start.elapsed(),
                    "Failed to upload object"
                );
            })?;

        info!(
            target: TRACING_TARGET_OBJECTS,
            size = object.size,
            etag = ?object.etag,
            elapsed = ?start.elapsed(),
            "Object uploaded"
        );

        Ok(object)
    }

    /// Reads a whole object.
    #[instrument(skip(self), target = TRACING_TARGET_OBJECTS, fields(bucket = %bucket, key = %key))]
    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        validate_object(bucket, key)?;
        let client = self.client(EndpointChoice::Internal).await?;

        let start = Instant::now();
        let data = client.get_object(bucket, key).await.inspect_err(|err| {
            if !err.is_not_found() {
                error!(
                    target: TRACING_TARGET_OBJECTS,
                    error = %err,
                    "Failed to download object"
                );
            }
        })?;

        debug!(
            target: TRACING_TARGET_OBJECTS,
            size = data.len(),
            elapsed = ?start.elapsed(),
            "Object downloaded"
        );

        Ok(data)
    }

    /// Deletes an object. Deleting a missing object succeeds.
    #[instrument(skip(self), target = TRACING_TARGET_OBJECTS, fields(bucket = %bucket, key = %key))]
    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        validate_object(bucket, key)?;
        let client = self.client(EndpointChoice::Internal).await?;

        match client.delete_object(bucket, key).await {
            Ok(()) => {
                info!(target: TRACING_TARGET_OBJECTS, "Object deleted");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                debug!(target: TRACING_TARGET_OBJECTS, "Object already absent");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Lists every object whose key starts with `prefix`.
    ///
    /// The listing is lazy; calling this again starts over.
    #[instrument(skip(self), target = TRACING_TARGET_OBJECTS, fields(bucket = %bucket, prefix = %prefix))]
    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<ObjectStream> {
        validate_bucket_name(bucket)?;
        let client = self.client(EndpointChoice::Internal).await?;
        Ok(client.list_objects(bucket, prefix))
    }

    /// Collects [`list_objects`](Self::list_objects) into a vector.
    pub async fn list_all(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectRef>> {
        let objects = self.list_objects(bucket, prefix).await?.try_collect().await?;
        Ok(objects)
    }

    /// Creates the bucket if it does not exist yet.
    #[instrument(skip(self), target = TRACING_TARGET_BUCKETS, fields(bucket = %bucket))]
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        validate_bucket_name(bucket)?;
        let client = self.client(EndpointChoice::Internal).await?;
        client.ensure_bucket(bucket).await?;
        debug!(target: TRACING_TARGET_BUCKETS, "Bucket ensured");
        Ok(())
    }

    /// Signs a download URL on the external endpoint.
    ///
    /// Lifetimes that are zero, negative or longer than seven days are
    /// rejected before credentials are fetched or a client is built. The
    /// object must exist: it is checked on the internal endpoint first and a
    /// missing one fails with `NotFound`.
    #[instrument(skip(self), target = TRACING_TARGET_OBJECTS, fields(bucket = %bucket, key = %key))]
    pub async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: SignedDuration,
    ) -> Result<Url> {
        validate_object(bucket, key)?;
        let ttl = presign_ttl(ttl)?;
        self.client(EndpointChoice::Internal)
            .await?
            .head_object(bucket, key)
            .await?;

        let client = self.client(EndpointChoice::External).await?;
        let url = client.presigned_get_url(bucket, key, ttl).await?;

        debug!(
            target: TRACING_TARGET_OBJECTS,
            host = ?url.host_str(),
            ttl = ?ttl,
            "Presigned download URL issued"
        );

        Ok(url)
    }

    /// Signs an upload URL on the external endpoint.
    ///
    /// Same lifetime rules as [`presigned_get_url`](Self::presigned_get_url).
    #[instrument(skip(self), target = TRACING_TARGET_OBJECTS, fields(bucket = %bucket, key = %key))]
    pub async fn presigned_put_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: SignedDuration,
    ) -> Result<Url> {
        validate_object(bucket, key)?;
        let ttl = presign_ttl(ttl)?;
        let client = self.client(EndpointChoice::External).await?;
        let url = client.presigned_put_url(bucket, key, ttl).await?;

        debug!(
            target: TRACING_TARGET_OBJECTS,
            host = ?url.host_str(),
            ttl = ?ttl,
            "Presigned upload URL issued"
        );

        Ok(url)
    }

    #[instrument(skip(self), target = TRACING_TARGET_BUCKETS, fields(bucket = %bucket))]
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        validate_bucket_name(bucket)?;
        let client = self.client(EndpointChoice::Internal).await?;
        Ok(client.bucket_exists(bucket).await?)
    }

    /// Deletes a bucket.
    ///
    /// Without `recursive` a non-empty bucket fails with
    /// [`StorageErrorKind::Conflict`]; with it every object is deleted first.
    #[instrument(skip(self), target = TRACING_TARGET_BUCKETS, fields(bucket = %bucket))]
    pub async fn remove_bucket(&self, bucket: &str, recursive: bool) -> Result<()> {
        validate_bucket_name(bucket)?;
        let client = self.client(EndpointChoice::Internal).await?;

        if recursive {
            let objects: Vec<ObjectRef> = client.list_objects(bucket, "").try_collect().await?;
            for object in &objects {
                client.delete_object(bucket, &object.key).await?;
            }
            debug!(
                target: TRACING_TARGET_BUCKETS,
                deleted = objects.len(),
                "Bucket emptied"
            );
        }

        client.remove_bucket(bucket).await?;
        info!(target: TRACING_TARGET_BUCKETS, "Bucket removed");
        Ok(())
    }

    #[instrument(skip(self), target = TRACING_TARGET_BUCKETS)]
    pub async fn list_buckets(&self) -> Result<Vec<BucketRef>> {
        let client = self.client(EndpointChoice::Internal).await?;
        Ok(client.list_buckets().await?)
    }

    /// Returns whether the object exists; a missing bucket counts as missing.
    #[instrument(skip(self), target = TRACING_TARGET_OBJECTS, fields(bucket = %bucket, key = %key))]
    pub async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.head_object(bucket, key).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Returns object metadata without the body.
    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectRef> {
        validate_object(bucket, key)?;
        let client = self.client(EndpointChoice::Internal).await?;
        Ok(client.head_object(bucket, key).await?)
    }

    /// Copies an object server-side, replacing the destination.
    #[instrument(skip(self), target = TRACING_TARGET_OBJECTS)]
    pub async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<()> {
        validate_object(src_bucket, src_key)?;
        validate_object(dst_bucket, dst_key)?;
        let client = self.client(EndpointChoice::Internal).await?;
        client
            .copy_object(src_bucket, src_key, dst_bucket, dst_key)
            .await?;
        info!(target: TRACING_TARGET_OBJECTS, "Object copied");
        Ok(())
    }

    /// Streams a local file into `key`.
    ///
    /// Without `overwrite` an existing object fails with
    /// [`StorageErrorKind::Conflict`]. The bucket must exist.
    #[instrument(skip(self), target = TRACING_TARGET_OBJECTS, fields(bucket = %bucket, key = %key, path = %path.display()))]
    pub async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        overwrite: bool,
    ) -> Result<ObjectRef> {
        validate_object(bucket, key)?;
        if !overwrite && self.object_exists(bucket, key).await? {
            return Err(StorageError::conflict(format!(
                "object `{key}` already exists in bucket `{bucket}`"
            ))
            .into());
        }

        let client = self.client(EndpointChoice::Internal).await?;
        let start = Instant::now();
        let object = client.put_file(bucket, key, path).await?;

        info!(
            target: TRACING_TARGET_OBJECTS,
            size = object.size,
            elapsed = ?start.elapsed(),
            "File uploaded"
        );

        Ok(object)
    }

    /// Streams an object into a local file and returns the bytes written.
    #[instrument(skip(self), target = TRACING_TARGET_OBJECTS, fields(bucket = %bucket, key = %key, path = %path.display()))]
    pub async fn download_file(&self, bucket: &str, key: &str, path: &Path) -> Result<u64> {
        validate_object(bucket, key)?;
        let client = self.client(EndpointChoice::Internal).await?;
        let start = Instant::now();
        let written = client.download_file(bucket, key, path).await?;

        info!(
            target: TRACING_TARGET_OBJECTS,
            size = written,
            elapsed = ?start.elapsed(),
            "File downloaded"
        );

        Ok(written)
    }

    /// Copies the objects of `bucket` (optionally under `prefix`) into
    /// [`ARCHIVE_BUCKET`] as `<bucket>/<key>` and returns how many were copied.
    ///
    /// With `delete_source` the source objects are deleted, and so is the bucket
    /// once nothing is left in it. A missing source bucket archives nothing.
    #[instrument(skip(self), target = TRACING_TARGET_BUCKETS, fields(bucket = %bucket))]
    pub async fn archive_bucket(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delete_source: bool,
    ) -> Result<u64> {
        validate_bucket_name(bucket)?;
        if bucket == ARCHIVE_BUCKET {
            return Err(StorageError::invalid("the archive bucket cannot archive itself").into());
        }

        let client = self.client(EndpointChoice::Internal).await?;
        if !client.bucket_exists(bucket).await? {
            debug!(target: TRACING_TARGET_BUCKETS, "Nothing to archive");
            return Ok(0);
        }
        client.ensure_bucket(ARCHIVE_BUCKET).await?;

        let objects: Vec<ObjectRef> = client
            .list_objects(bucket, prefix.unwrap_or_default())
            .try_collect()
            .await?;

        for object in &objects {
            let archive_key = format!("{bucket}/{}", object.key);
            client
                .copy_object(bucket, &object.key, ARCHIVE_BUCKET, &archive_key)
                .await?;
            if delete_source {
                client.delete_object(bucket, &object.key).await?;
            }
        }

        if delete_source {
            match client.remove_bucket(bucket).await {
                Ok(()) => debug!(target: TRACING_TARGET_BUCKETS, "Source bucket removed"),
                Err(err) if err.kind() == StorageErrorKind::Conflict => {
                    debug!(target: TRACING_TARGET_BUCKETS, "Source bucket kept, objects remain");
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(
            target: TRACING_TARGET_BUCKETS,
            archived = objects.len(),
            delete_source,
            "Bucket archived"
        );

        Ok(objects.len() as u64)
    }

    /// Issues short-lived credentials an external client can use to upload
    /// into `bucket` or download one object from it, creating the bucket if
    /// needed.
    #[instrument(skip(self), target = TRACING_TARGET_BUCKETS, fields(bucket = %bucket))]
    pub async fn delegated_credentials(
        &self,
        bucket: &str,
        access: DelegatedAccess,
    ) -> Result<DelegatedCredentials> {
        validate_bucket_name(bucket)?;
        if let DelegatedAccess::Download { key } = &access {
            validate_object_key(key)?;
        }

        let client = self.client(EndpointChoice::Internal).await?;
        client.ensure_bucket(bucket).await?;

        let credentials = self
            .inner
            .delegation
            .delegate(bucket, &access)
            .await
            .inspect_err(|err| {
                warn!(
                    target: TRACING_TARGET_BUCKETS,
                    error = %err,
                    "Failed to issue delegated credentials"
                );
            })?;

        Ok(credentials)
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("settings", &self.inner.settings)
            .field("credentials", &self.inner.credentials)
            .finish_non_exhaustive()
    }
}

fn validate_object(bucket: &str, key: &str) -> Result<(), StorageError> {
    validate_bucket_name(bucket)?;
    validate_object_key(key)
}

fn presign_ttl(ttl: SignedDuration) -> Result<Duration, StorageError> {
    if ttl.is_zero() || ttl.is_negative() {
        return Err(StorageError::invalid(format!(
            "presigned URL lifetime must be positive, got {ttl:?}"
        )));
    }

    if ttl > MAX_PRESIGN_TTL {
        return Err(StorageError::invalid(format!(
            "presigned URL lifetime {ttl:?} exceeds seven days"
        )));
    }

    Duration::try_from(ttl)
        .map_err(|err| StorageError::invalid("presigned URL lifetime out of range").with_source(err))
}

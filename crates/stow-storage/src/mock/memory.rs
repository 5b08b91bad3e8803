use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use jiff::Timestamp;
use tokio::sync::RwLock;
use url::Url;

use crate::backend::{ClientFactory, ObjectStorage, ObjectStream, StorageClient};
use crate::config::{BackendKind, Settings};
use crate::credentials::SessionCredentials;
use crate::error::{ClientBuildError, StorageError};
use crate::types::{BucketRef, ObjectRef};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    last_modified: Timestamp,
}

#[derive(Debug, Default)]
struct Bucket {
    created: Option<Timestamp>,
    objects: BTreeMap<String, StoredObject>,
}

/// Shared bucket contents. Clones see the same data.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    buckets: Arc<RwLock<BTreeMap<String, Bucket>>>,
    versions: Arc<AtomicU64>,
}

impl MemoryStore {
    /// Returns the number of objects in a bucket, or `None` if it is missing.
    pub async fn object_count(&self, bucket: &str) -> Option<usize> {
        let buckets = self.buckets.read().await;
        buckets.get(bucket).map(|bucket| bucket.objects.len())
    }

    fn next_etag(&self) -> String {
        let version = self.versions.fetch_add(1, Ordering::Relaxed) + 1;
        format!("\"{version:032x}\"")
    }
}

fn no_such_bucket(bucket: &str) -> StorageError {
    StorageError::not_found(format!("bucket `{bucket}`: NoSuchBucket"))
}

fn no_such_key(bucket: &str, key: &str) -> StorageError {
    StorageError::not_found(format!("object `{key}` in bucket `{bucket}`: NoSuchKey"))
}

/// In-memory [`ObjectStorage`] following S3 semantics.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    store: MemoryStore,
    backend: BackendKind,
    endpoint: Url,
    epoch: u64,
}

impl MemoryStorage {
    /// Creates a backend over `store` answering as `backend` on `endpoint`.
    pub fn new(store: MemoryStore, backend: BackendKind, endpoint: Url, epoch: u64) -> Self {
        Self {
            store,
            backend,
            endpoint,
            epoch,
        }
    }

    fn presign(&self, method: &str, bucket: &str, key: &str, ttl: Duration) -> Result<Url, StorageError> {
        if ttl.is_zero() {
            return Err(StorageError::invalid("presigned URL lifetime must be positive"));
        }

        let mut url = self
            .endpoint
            .join(&format!("{bucket}/{key}"))
            .map_err(|err| StorageError::invalid("cannot build object URL").with_source(err))?;
        url.query_pairs_mut()
            .append_pair("X-Amz-Method", method)
            .append_pair("X-Amz-Expires", &ttl.as_secs().to_string())
            .append_pair("X-Stow-Epoch", &self.epoch.to_string());

        Ok(url)
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        _content_type: Option<&str>,
    ) -> Result<ObjectRef, StorageError> {
        let etag = self.store.next_etag();
        let mut buckets = self.store.buckets.write().await;
        let objects = &mut buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?
            .objects;

        let size = data.len() as u64;
        let last_modified = Timestamp::now();
        objects.insert(
            key.to_owned(),
            StoredObject {
                data,
                etag: etag.clone(),
                last_modified,
            },
        );

        Ok(ObjectRef::new(bucket, key, size)
            .with_etag(Some(etag))
            .with_last_modified(Some(last_modified)))
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<ObjectRef, StorageError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|err| StorageError::from_io(err, format!("read `{}`", path.display())))?;
        self.put_object(bucket, key, Bytes::from(data), None).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let buckets = self.store.buckets.read().await;
        let bucket_state = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        bucket_state
            .objects
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| no_such_key(bucket, key))
    }

    async fn download_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<u64, StorageError> {
        let data = self.get_object(bucket, key).await?;
        tokio::fs::write(path, &data)
            .await
            .map_err(|err| StorageError::from_io(err, format!("write `{}`", path.display())))?;
        Ok(data.len() as u64)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectRef, StorageError> {
        let buckets = self.store.buckets.read().await;
        let bucket_state = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        let object = bucket_state
            .objects
            .get(key)
            .ok_or_else(|| no_such_key(bucket, key))?;

        Ok(ObjectRef::new(bucket, key, object.data.len() as u64)
            .with_etag(Some(object.etag.clone()))
            .with_last_modified(Some(object.last_modified)))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let mut buckets = self.store.buckets.write().await;
        let bucket_state = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        bucket_state.objects.remove(key);
        Ok(())
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<(), StorageError> {
        let data = self.get_object(src_bucket, src_key).await?;
        self.put_object(dst_bucket, dst_key, data, None).await?;
        Ok(())
    }

    fn list_objects(&self, bucket: &str, prefix: &str) -> ObjectStream {
        let store = self.store.clone();
        let bucket = bucket.to_owned();
        let prefix = prefix.to_owned();

        Box::pin(try_stream! {
            let snapshot: Vec<ObjectRef> = {
                let buckets = store.buckets.read().await;
                let bucket_state = buckets.get(&bucket).ok_or_else(|| no_such_bucket(&bucket))?;
                bucket_state
                    .objects
                    .range(prefix.clone()..)
                    .take_while(|(key, _)| key.starts_with(&prefix))
                    .map(|(key, object)| {
                        ObjectRef::new(bucket.as_str(), key.as_str(), object.data.len() as u64)
                            .with_etag(Some(object.etag.clone()))
                            .with_last_modified(Some(object.last_modified))
                    })
                    .collect()
            };

            for object in snapshot {
                yield object;
            }
        })
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.store.buckets.read().await.contains_key(bucket))
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut buckets = self.store.buckets.write().await;
        buckets.entry(bucket.to_owned()).or_insert_with(|| Bucket {
            created: Some(Timestamp::now()),
            objects: BTreeMap::new(),
        });
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut buckets = self.store.buckets.write().await;
        match buckets.get(bucket) {
            None => Err(no_such_bucket(bucket)),
            Some(state) if !state.objects.is_empty() => Err(StorageError::conflict(format!(
                "remove bucket `{bucket}`: BucketNotEmpty"
            ))),
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }

    async fn list_buckets(&self) -> Result<Vec<BucketRef>, StorageError> {
        let buckets = self.store.buckets.read().await;
        Ok(buckets
            .iter()
            .map(|(name, state)| BucketRef {
                name: name.clone(),
                created: state.created,
            })
            .collect())
    }

    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Url, StorageError> {
        self.presign("GET", bucket, key, ttl)
    }

    async fn presigned_put_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Url, StorageError> {
        self.presign("PUT", bucket, key, ttl)
    }
}

/// [`ClientFactory`] handing out [`MemoryStorage`] clients over one shared
/// store, counting how many clients it built.
#[derive(Debug, Default)]
pub struct MemoryClientFactory {
    store: MemoryStore,
    builds: AtomicUsize,
}

impl MemoryClientFactory {
    /// Creates a factory over an existing store.
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            builds: AtomicUsize::new(0),
        }
    }

    /// Returns the shared store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Returns how many clients have been built.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl ClientFactory for MemoryClientFactory {
    fn build(
        &self,
        settings: &Settings,
        credentials: &SessionCredentials,
        endpoint: &Url,
    ) -> Result<StorageClient, ClientBuildError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let inner = MemoryStorage::new(
            self.store.clone(),
            settings.backend(),
            endpoint.clone(),
            credentials.epoch(),
        );
        Ok(StorageClient::new(
            Arc::new(inner),
            endpoint.clone(),
            credentials.epoch(),
        ))
    }
}

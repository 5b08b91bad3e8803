use aws_sdk_s3::types::BucketLocationConstraint;
use url::Url;

use super::{S3Flavor, S3Storage};
use crate::config::BackendKind;
use crate::credentials::SessionCredentials;
use crate::error::ClientBuildError;

/// Self-hosted Minio: path-style addressing, plain HTTP allowed.
#[derive(Debug, Default, Clone, Copy)]
pub struct Minio;

/// Client for a Minio deployment.
pub type MinioClient = S3Storage<Minio>;

impl S3Flavor for Minio {
    const BACKEND: BackendKind = BackendKind::Minio;

    fn force_path_style(&self) -> bool {
        true
    }

    fn location_constraint(&self) -> Option<BucketLocationConstraint> {
        None
    }

    fn validate(&self, _endpoint: &Url) -> Result<(), ClientBuildError> {
        Ok(())
    }
}

impl MinioClient {
    /// Creates a Minio client; nothing is sent until the first operation.
    pub fn connect(
        endpoint: &Url,
        region: &str,
        credentials: &SessionCredentials,
    ) -> Result<Self, ClientBuildError> {
        S3Storage::new(Minio, endpoint, region, credentials)
    }
}

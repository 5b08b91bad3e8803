use aws_sdk_s3::types::BucketLocationConstraint;
use url::Url;

use super::{S3Flavor, S3Storage};
use crate::config::BackendKind;
use crate::credentials::SessionCredentials;
use crate::error::ClientBuildError;

/// Region where buckets are created without a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Managed AWS S3: virtual-hosted addressing over TLS.
#[derive(Debug, Clone)]
pub struct Aws {
    region: String,
}

/// Client for AWS S3.
pub type AwsClient = S3Storage<Aws>;

impl Aws {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }
}

impl S3Flavor for Aws {
    const BACKEND: BackendKind = BackendKind::Aws;

    fn force_path_style(&self) -> bool {
        false
    }

    fn location_constraint(&self) -> Option<BucketLocationConstraint> {
        (self.region != DEFAULT_REGION).then(|| BucketLocationConstraint::from(self.region.as_str()))
    }

    fn validate(&self, endpoint: &Url) -> Result<(), ClientBuildError> {
        if endpoint.scheme() != "https" {
            return Err(ClientBuildError::Unsupported {
                backend: Self::BACKEND,
                reason: "AWS S3 endpoints require https".into(),
            });
        }

        Ok(())
    }
}

impl AwsClient {
    /// Creates an AWS client; nothing is sent until the first operation.
    pub fn connect(
        endpoint: &Url,
        region: &str,
        credentials: &SessionCredentials,
    ) -> Result<Self, ClientBuildError> {
        S3Storage::new(Aws::new(region), endpoint, region, credentials)
    }
}

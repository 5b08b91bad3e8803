//! Short-lived, bucket-scoped credentials for external clients.
//!
//! Instead of proxying transfers, the service can hand a client its own
//! temporary key pair, narrowed by an inline session policy to one bucket
//! (uploads) or one object (downloads).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::TRACING_TARGET_DELEGATION;
use crate::config::{BackendKind, Settings, masked};
use crate::credentials::StsClient;
use crate::error::CredentialError;

/// Minio ignores the role, but the request must still carry one.
const MINIO_ROLE_ARN: &str = "arn:x:ignored:by:minio:";
const MINIO_SESSION_NAME: &str = "ignored-by-minio";
const MINIO_LIFETIME: Duration = Duration::from_secs(12000);

const AWS_UPLOAD_SESSION_NAME: &str = "stow-upload-session";
const AWS_DOWNLOAD_SESSION_NAME: &str = "stow-download-session";
const AWS_LIFETIME: Duration = Duration::from_secs(3600);

/// What a delegated key pair is allowed to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DelegatedAccess {
    /// Write any object into the bucket.
    Upload,
    /// Read a single object.
    Download {
        /// Key of the readable object.
        key: String,
    },
}

impl DelegatedAccess {
    fn session_name(&self) -> &'static str {
        match self {
            DelegatedAccess::Upload => AWS_UPLOAD_SESSION_NAME,
            DelegatedAccess::Download { .. } => AWS_DOWNLOAD_SESSION_NAME,
        }
    }
}

/// Temporary credentials handed to an external client.
///
/// Serializes as camelCase JSON for the client. The [`Debug`] output
/// redacts the secret and the session token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedCredentials {
    /// Bucket the credentials are scoped to.
    pub bucket: String,
    /// Object the credentials are scoped to, for downloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Timestamp,
}

impl fmt::Debug for DelegatedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedCredentials")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("access_key_id", &masked(&self.access_key_id))
            .field("secret_access_key", &"***")
            .field("session_token", &"***")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Issues delegated credentials.
#[async_trait]
pub trait Delegation: Send + Sync + 'static {
    /// Issues credentials for `access` on `bucket`.
    async fn delegate(
        &self,
        bucket: &str,
        access: &DelegatedAccess,
    ) -> Result<DelegatedCredentials, CredentialError>;
}

/// Delegation through an STS `AssumeRole` call with an inline policy.
///
/// Minio serves STS on its external endpoint and accepts the static keys;
/// AWS uses `STS_ENDPOINT` and requires `STS_ROLE_ARN`.
#[derive(Debug, Clone)]
pub struct StsDelegation {
    client: StsClient,
    backend: BackendKind,
    role_arn: Option<String>,
}

impl StsDelegation {
    /// Creates the delegation for the configured backend; no request is sent.
    pub fn from_settings(settings: &Settings) -> Self {
        let (endpoint, role_arn) = match settings.backend() {
            BackendKind::Minio => (settings.external_endpoint(), Some(MINIO_ROLE_ARN.to_owned())),
            BackendKind::Aws => (
                settings
                    .sts_endpoint()
                    .unwrap_or_else(|| settings.external_endpoint()),
                settings.role_arn().map(str::to_owned),
            ),
        };

        Self {
            client: StsClient::new(
                endpoint,
                settings.region(),
                settings.access_key(),
                settings.secret_key(),
            ),
            backend: settings.backend(),
            role_arn,
        }
    }
}

#[async_trait]
impl Delegation for StsDelegation {
    async fn delegate(
        &self,
        bucket: &str,
        access: &DelegatedAccess,
    ) -> Result<DelegatedCredentials, CredentialError> {
        let role_arn = self.role_arn.as_deref().ok_or_else(|| {
            CredentialError::Unsupported(
                "delegated credentials on AWS require STS_ROLE_ARN".into(),
            )
        })?;

        let (session_name, lifetime) = match self.backend {
            BackendKind::Minio => (MINIO_SESSION_NAME, MINIO_LIFETIME),
            BackendKind::Aws => (access.session_name(), AWS_LIFETIME),
        };

        let policy = access_policy(self.backend, bucket, access);
        let policy = serde_json::to_string(&policy)
            .map_err(|err| CredentialError::Malformed(format!("cannot encode policy: {err}")))?;

        let issued = self
            .client
            .assume_role(role_arn, session_name, Some(policy), lifetime)
            .await?;

        tracing::info!(
            target: TRACING_TARGET_DELEGATION,
            backend = %self.backend,
            bucket = %bucket,
            access_key = %masked(&issued.access_key),
            expiration = %issued.expiration,
            "Issued delegated credentials"
        );

        Ok(DelegatedCredentials {
            bucket: bucket.to_owned(),
            key: match access {
                DelegatedAccess::Upload => None,
                DelegatedAccess::Download { key } => Some(key.clone()),
            },
            access_key_id: issued.access_key,
            secret_access_key: issued.secret_key,
            session_token: issued.session_token,
            expiration: issued.expiration,
        })
    }
}

/// Builds the inline session policy narrowing a delegated key pair.
///
/// Uploads may write anywhere in the bucket; AWS additionally grants the
/// multipart and bucket-level permissions its SDKs need for large uploads.
/// Downloads may only read the one object.
pub fn access_policy(backend: BackendKind, bucket: &str, access: &DelegatedAccess) -> Value {
    let bucket_arn = format!("arn:aws:s3:::{bucket}");
    let objects_arn = format!("arn:aws:s3:::{bucket}/*");

    let statements = match (backend, access) {
        (BackendKind::Minio, DelegatedAccess::Upload) => json!([{
            "Sid": "PutObj",
            "Effect": "Allow",
            "Action": ["s3:PutObject"],
            "Resource": [objects_arn],
        }]),
        (BackendKind::Aws, DelegatedAccess::Upload) => json!([
            {
                "Sid": "PutObj",
                "Effect": "Allow",
                "Action": [
                    "s3:AbortMultipartUpload",
                    "s3:DeleteObject",
                    "s3:ListMultipartUploadParts",
                    "s3:PutObject",
                    "s3:GetObject",
                ],
                "Resource": [objects_arn],
            },
            {
                "Sid": "BucketAccess",
                "Effect": "Allow",
                "Action": [
                    "s3:GetBucketLocation",
                    "s3:ListBucket",
                    "s3:ListBucketMultipartUploads",
                ],
                "Resource": [bucket_arn],
            },
        ]),
        (BackendKind::Minio, DelegatedAccess::Download { key }) => json!([{
            "Sid": "GetObj",
            "Effect": "Allow",
            "Action": ["s3:GetObject"],
            "Resource": [format!("{bucket_arn}/{key}")],
        }]),
        (BackendKind::Aws, DelegatedAccess::Download { key }) => json!([
            {
                "Sid": "GetObj",
                "Effect": "Allow",
                "Action": ["s3:GetObject"],
                "Resource": [format!("{bucket_arn}/{key}")],
            },
            {
                "Sid": "AllowGetBucketLocation",
                "Effect": "Allow",
                "Action": ["s3:GetBucketLocation"],
                "Resource": [bucket_arn],
            },
        ]),
    };

    json!({
        "Version": "2012-10-17",
        "Statement": statements,
    })
}

//! Security Token Service client.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sts::config::http::HttpResponse;
use aws_sdk_sts::config::retry::RetryConfig;
use aws_sdk_sts::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use jiff::Timestamp;
use url::Url;

use super::{IssuedCredentials, TokenService};
use crate::TRACING_TARGET_CREDENTIALS;
use crate::config::{Settings, masked};
use crate::error::CredentialError;

/// Session name used for the service's own AWS session credentials.
const SERVICE_SESSION_NAME: &str = "stow-storage";

/// Thin wrapper around the STS SDK client bound to one endpoint and key pair.
#[derive(Clone)]
pub struct StsClient {
    inner: aws_sdk_sts::Client,
    endpoint: Url,
    access_key: String,
}

impl StsClient {
    /// Creates a client; no network traffic happens until an exchange.
    ///
    /// Failed exchanges are never retried by the SDK.
    pub fn new(endpoint: &Url, region: &str, access_key: &str, secret_key: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "stow-sts");
        let config = aws_sdk_sts::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .endpoint_url(endpoint.as_str().trim_end_matches('/'))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .build();

        Self {
            inner: aws_sdk_sts::Client::from_conf(config),
            endpoint: endpoint.clone(),
            access_key: access_key.to_owned(),
        }
    }

    /// Returns the token service endpoint.
    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Assumes a role, optionally narrowed by an inline session policy.
    #[tracing::instrument(skip(self, policy), target = TRACING_TARGET_CREDENTIALS)]
    pub async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        policy: Option<String>,
        duration: Duration,
    ) -> Result<IssuedCredentials, CredentialError> {
        tracing::debug!(
            target: TRACING_TARGET_CREDENTIALS,
            endpoint = %self.endpoint,
            access_key = %masked(&self.access_key),
            "Requesting AssumeRole"
        );

        let output = self
            .inner
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .set_policy(policy)
            .duration_seconds(duration_secs(duration))
            .send()
            .await
            .map_err(from_sdk_error)?;

        issued(output.credentials())
    }

    /// Obtains session credentials for the client's own identity.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_CREDENTIALS)]
    pub async fn session_token(
        &self,
        duration: Duration,
    ) -> Result<IssuedCredentials, CredentialError> {
        tracing::debug!(
            target: TRACING_TARGET_CREDENTIALS,
            endpoint = %self.endpoint,
            access_key = %masked(&self.access_key),
            "Requesting GetSessionToken"
        );

        let output = self
            .inner
            .get_session_token()
            .duration_seconds(duration_secs(duration))
            .send()
            .await
            .map_err(from_sdk_error)?;

        issued(output.credentials())
    }
}

impl fmt::Debug for StsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StsClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("access_key", &masked(&self.access_key))
            .finish_non_exhaustive()
    }
}

/// Token service for the AWS backend's own session credentials.
///
/// Assumes `STS_ROLE_ARN` when configured, otherwise calls `GetSessionToken`
/// with the long-lived key pair.
#[derive(Debug, Clone)]
pub struct StsTokenService {
    client: StsClient,
    role_arn: Option<String>,
    duration: Duration,
}

impl StsTokenService {
    /// Creates the token service from AWS settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, CredentialError> {
        let endpoint = settings.sts_endpoint().ok_or_else(|| {
            CredentialError::Unsupported(format!(
                "no token service is configured for the {} backend",
                settings.backend()
            ))
        })?;

        Ok(Self {
            client: StsClient::new(
                endpoint,
                settings.region(),
                settings.access_key(),
                settings.secret_key(),
            ),
            role_arn: settings.role_arn().map(str::to_owned),
            duration: settings.session_duration(),
        })
    }
}

#[async_trait]
impl TokenService for StsTokenService {
    async fn exchange(&self) -> Result<IssuedCredentials, CredentialError> {
        match &self.role_arn {
            Some(role_arn) => {
                self.client
                    .assume_role(role_arn, SERVICE_SESSION_NAME, None, self.duration)
                    .await
            }
            None => self.client.session_token(self.duration).await,
        }
    }
}

fn duration_secs(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

fn issued(
    credentials: Option<&aws_sdk_sts::types::Credentials>,
) -> Result<IssuedCredentials, CredentialError> {
    let credentials = credentials
        .ok_or_else(|| CredentialError::Malformed("response carried no credentials".into()))?;

    let expiration = credentials.expiration();
    let expiration = Timestamp::new(expiration.secs(), expiration.subsec_nanos() as i32)
        .map_err(|err| CredentialError::Malformed(format!("expiration out of range: {err}")))?;

    Ok(IssuedCredentials {
        access_key: credentials.access_key_id().to_owned(),
        secret_key: credentials.secret_access_key().to_owned(),
        session_token: credentials.session_token().to_owned(),
        expiration,
    })
}

/// Maps an SDK failure onto the credential taxonomy.
///
/// Service messages are kept, request signatures and keys never reach them.
fn from_sdk_error<E>(err: SdkError<E, HttpResponse>) -> CredentialError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    if let Some(service) = err.as_service_error() {
        return CredentialError::Rejected {
            code: service.code().unwrap_or("Unknown").to_owned(),
            message: service.message().unwrap_or_default().to_owned(),
        };
    }

    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            CredentialError::Network(DisplayErrorContext(&err).to_string())
        }
        _ => CredentialError::Malformed(DisplayErrorContext(&err).to_string()),
    }
}

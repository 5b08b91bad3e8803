//! Validated, immutable storage settings.

use std::fmt;
use std::time::Duration;

use jiff::SignedDuration;
use url::Url;

use super::BackendKind;

/// Settings for exactly one backend, produced by
/// [`StorageConfig::resolve`](super::StorageConfig::resolve).
///
/// Holds the long-lived keys, so the [`Debug`] output masks them.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub(super) backend: BackendKind,
    pub(super) internal_endpoint: Url,
    pub(super) external_endpoint: Url,
    pub(super) access_key: String,
    pub(super) secret_key: String,
    pub(super) region: String,
    pub(super) sts_endpoint: Option<Url>,
    pub(super) role_arn: Option<String>,
    pub(super) session_duration: Duration,
    pub(super) refresh_margin: SignedDuration,
}

impl Settings {
    /// Returns the active backend.
    #[inline]
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Returns the endpoint used for operations the service performs itself.
    #[inline]
    pub fn internal_endpoint(&self) -> &Url {
        &self.internal_endpoint
    }

    /// Returns the endpoint handed out to external consumers.
    #[inline]
    pub fn external_endpoint(&self) -> &Url {
        &self.external_endpoint
    }

    /// Returns the long-lived (Minio: static) access key.
    #[inline]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Returns the long-lived (Minio: static) secret key.
    #[inline]
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Returns the masked access key for logging.
    pub fn access_key_masked(&self) -> String {
        super::masked(&self.access_key)
    }

    /// Returns the signing region.
    #[inline]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns the AWS token service endpoint; always `None` for Minio.
    #[inline]
    pub fn sts_endpoint(&self) -> Option<&Url> {
        self.sts_endpoint.as_ref()
    }

    /// Returns the role assumed for AWS session credentials, if configured.
    #[inline]
    pub fn role_arn(&self) -> Option<&str> {
        self.role_arn.as_deref()
    }

    /// Returns the lifetime requested for AWS session credentials.
    #[inline]
    pub fn session_duration(&self) -> Duration {
        self.session_duration
    }

    /// Returns how long before expiry session credentials are refreshed.
    #[inline]
    pub fn refresh_margin(&self) -> SignedDuration {
        self.refresh_margin
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("backend", &self.backend)
            .field("internal_endpoint", &self.internal_endpoint.as_str())
            .field("external_endpoint", &self.external_endpoint.as_str())
            .field("access_key", &self.access_key_masked())
            .field("secret_key", &"***")
            .field("region", &self.region)
            .field("sts_endpoint", &self.sts_endpoint.as_ref().map(Url::as_str))
            .field("role_arn", &self.role_arn)
            .field("session_duration", &self.session_duration)
            .field("refresh_margin", &self.refresh_margin)
            .finish()
    }
}

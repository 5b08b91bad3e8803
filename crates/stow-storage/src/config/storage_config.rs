//! Raw storage configuration as read from flags or the environment.

use std::fmt;
use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use jiff::SignedDuration;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{BackendKind, Settings};
use crate::TRACING_TARGET_CONFIG;
use crate::error::ConfigError;

pub(crate) const S3_TARGET: &str = "S3_TARGET";
pub(crate) const S3_ENDPOINT: &str = "S3_ENDPOINT";
pub(crate) const S3_ENDPOINT_LOCAL: &str = "S3_ENDPOINT_LOCAL";
pub(crate) const S3_ACCESS_KEY: &str = "S3_ACCESS_KEY";
pub(crate) const S3_SECRET_KEY: &str = "S3_SECRET_KEY";
pub(crate) const S3_REGION: &str = "S3_REGION";
pub(crate) const S3_AWS_ENDPOINT: &str = "S3_AWS_ENDPOINT";
pub(crate) const S3_AWS_REGION: &str = "S3_AWS_REGION";
pub(crate) const S3_AWS_ACCESS_KEY: &str = "S3_AWS_ACCESS_KEY";
pub(crate) const S3_AWS_SECRET_KEY: &str = "S3_AWS_SECRET_KEY";
pub(crate) const STS_ENDPOINT: &str = "STS_ENDPOINT";
pub(crate) const STS_ROLE_ARN: &str = "STS_ROLE_ARN";
pub(crate) const STS_SESSION_DURATION_SECS: &str = "STS_SESSION_DURATION_SECS";
pub(crate) const S3_CREDENTIAL_REFRESH_MARGIN_SECS: &str = "S3_CREDENTIAL_REFRESH_MARGIN_SECS";

// Default values
const DEFAULT_MINIO_REGION: &str = "us-east-1";
const DEFAULT_SESSION_DURATION_SECS: u64 = 3600;
const SESSION_DURATION_RANGE_SECS: std::ops::RangeInclusive<u64> = 900..=43200;
const DEFAULT_REFRESH_MARGIN_SECS: u64 = 60;
const MIN_REFRESH_MARGIN_SECS: u64 = 60;

/// Raw storage configuration.
///
/// Every field is optional here; which ones are required depends on the
/// backend selected by `S3_TARGET` and is checked by [`StorageConfig::resolve`].
#[derive(Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct StorageConfig {
    /// Backend selector: `AWS` selects AWS S3, anything else selects Minio
    #[cfg_attr(feature = "config", arg(long = "s3-target", env = "S3_TARGET"))]
    pub s3_target: Option<String>,

    /// Externally reachable Minio endpoint
    #[cfg_attr(feature = "config", arg(long = "s3-endpoint", env = "S3_ENDPOINT"))]
    pub s3_endpoint: Option<String>,

    /// Internal (cluster-local) Minio endpoint
    #[cfg_attr(
        feature = "config",
        arg(long = "s3-endpoint-local", env = "S3_ENDPOINT_LOCAL")
    )]
    pub s3_endpoint_local: Option<String>,

    /// Minio access key
    #[cfg_attr(feature = "config", arg(long = "s3-access-key", env = "S3_ACCESS_KEY"))]
    pub s3_access_key: Option<String>,

    /// Minio secret key
    #[cfg_attr(
        feature = "config",
        arg(long = "s3-secret-key", env = "S3_SECRET_KEY", hide_env_values = true)
    )]
    #[serde(skip_serializing)]
    pub s3_secret_key: Option<String>,

    /// Region used to sign Minio requests (default: us-east-1)
    #[cfg_attr(feature = "config", arg(long = "s3-region", env = "S3_REGION"))]
    pub s3_region: Option<String>,

    /// AWS S3 endpoint (default: https://s3.<region>.amazonaws.com)
    #[cfg_attr(feature = "config", arg(long = "s3-aws-endpoint", env = "S3_AWS_ENDPOINT"))]
    pub s3_aws_endpoint: Option<String>,

    /// AWS region
    #[cfg_attr(feature = "config", arg(long = "s3-aws-region", env = "S3_AWS_REGION"))]
    pub s3_aws_region: Option<String>,

    /// Long-lived AWS access key used for the STS exchange
    #[cfg_attr(
        feature = "config",
        arg(long = "s3-aws-access-key", env = "S3_AWS_ACCESS_KEY")
    )]
    pub s3_aws_access_key: Option<String>,

    /// Long-lived AWS secret key used for the STS exchange
    #[cfg_attr(
        feature = "config",
        arg(long = "s3-aws-secret-key", env = "S3_AWS_SECRET_KEY", hide_env_values = true)
    )]
    #[serde(skip_serializing)]
    pub s3_aws_secret_key: Option<String>,

    /// Security Token Service endpoint for AWS
    #[cfg_attr(feature = "config", arg(long = "sts-endpoint", env = "STS_ENDPOINT"))]
    pub sts_endpoint: Option<String>,

    /// Role to assume for AWS session credentials (GetSessionToken when unset)
    #[cfg_attr(feature = "config", arg(long = "sts-role-arn", env = "STS_ROLE_ARN"))]
    pub sts_role_arn: Option<String>,

    /// Lifetime of AWS session credentials in seconds (default: 3600)
    #[cfg_attr(
        feature = "config",
        arg(long = "sts-session-duration", env = "STS_SESSION_DURATION_SECS")
    )]
    pub sts_session_duration: Option<String>,

    /// Refresh session credentials this many seconds before expiry (default: 60)
    #[cfg_attr(
        feature = "config",
        arg(long = "s3-refresh-margin", env = "S3_CREDENTIAL_REFRESH_MARGIN_SECS")
    )]
    pub s3_refresh_margin: Option<String>,
}

impl StorageConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Variables that are not valid unicode are ignored.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::vars_os()
                .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?))),
        )
    }

    /// Reads the configuration from an explicit set of variables.
    ///
    /// Unknown variables are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();
        for (key, value) in vars {
            let slot = match key.as_ref() {
                S3_TARGET => &mut config.s3_target,
                S3_ENDPOINT => &mut config.s3_endpoint,
                S3_ENDPOINT_LOCAL => &mut config.s3_endpoint_local,
                S3_ACCESS_KEY => &mut config.s3_access_key,
                S3_SECRET_KEY => &mut config.s3_secret_key,
                S3_REGION => &mut config.s3_region,
                S3_AWS_ENDPOINT => &mut config.s3_aws_endpoint,
                S3_AWS_REGION => &mut config.s3_aws_region,
                S3_AWS_ACCESS_KEY => &mut config.s3_aws_access_key,
                S3_AWS_SECRET_KEY => &mut config.s3_aws_secret_key,
                STS_ENDPOINT => &mut config.sts_endpoint,
                STS_ROLE_ARN => &mut config.sts_role_arn,
                STS_SESSION_DURATION_SECS => &mut config.sts_session_duration,
                S3_CREDENTIAL_REFRESH_MARGIN_SECS => &mut config.s3_refresh_margin,
                _ => continue,
            };
            *slot = Some(value.into());
        }
        config
    }

    /// Returns the backend selected by `S3_TARGET`.
    #[inline]
    pub fn backend(&self) -> BackendKind {
        BackendKind::from_target(self.s3_target.as_deref())
    }

    /// Validates the configuration for the selected backend.
    ///
    /// Pure function of the current values: no network calls are made and
    /// resolving an unchanged configuration twice yields equal settings.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let backend = self.backend();
        let settings = match backend {
            BackendKind::Minio => self.resolve_minio()?,
            BackendKind::Aws => self.resolve_aws()?,
        };

        tracing::debug!(
            target: TRACING_TARGET_CONFIG,
            backend = %backend,
            internal_endpoint = %settings.internal_endpoint(),
            external_endpoint = %settings.external_endpoint(),
            region = settings.region(),
            access_key = %settings.access_key_masked(),
            "Resolved storage settings"
        );

        Ok(settings)
    }

    fn resolve_minio(&self) -> Result<Settings, ConfigError> {
        let backend = BackendKind::Minio;
        let external = required(&self.s3_endpoint, S3_ENDPOINT, backend)?;
        let internal = required(&self.s3_endpoint_local, S3_ENDPOINT_LOCAL, backend)?;
        let access_key = required(&self.s3_access_key, S3_ACCESS_KEY, backend)?;
        let secret_key = required(&self.s3_secret_key, S3_SECRET_KEY, backend)?;
        let region = optional(&self.s3_region).unwrap_or(DEFAULT_MINIO_REGION);

        Ok(Settings {
            backend,
            internal_endpoint: parse_endpoint(S3_ENDPOINT_LOCAL, internal, "http")?,
            external_endpoint: parse_endpoint(S3_ENDPOINT, external, "http")?,
            access_key: access_key.to_owned(),
            secret_key: secret_key.to_owned(),
            region: region.to_owned(),
            sts_endpoint: None,
            role_arn: None,
            session_duration: Duration::from_secs(DEFAULT_SESSION_DURATION_SECS),
            refresh_margin: self.refresh_margin()?,
        })
    }

    fn resolve_aws(&self) -> Result<Settings, ConfigError> {
        let backend = BackendKind::Aws;
        let region = required(&self.s3_aws_region, S3_AWS_REGION, backend)?;
        let access_key = required(&self.s3_aws_access_key, S3_AWS_ACCESS_KEY, backend)?;
        let secret_key = required(&self.s3_aws_secret_key, S3_AWS_SECRET_KEY, backend)?;
        let sts_endpoint = required(&self.sts_endpoint, STS_ENDPOINT, backend)?;

        // A single AWS endpoint serves both network paths.
        let endpoint = match optional(&self.s3_aws_endpoint) {
            Some(endpoint) => parse_endpoint(S3_AWS_ENDPOINT, endpoint, "https")?,
            None => parse_endpoint(
                S3_AWS_REGION,
                &format!("https://s3.{region}.amazonaws.com"),
                "https",
            )?,
        };

        Ok(Settings {
            backend,
            internal_endpoint: endpoint.clone(),
            external_endpoint: endpoint,
            access_key: access_key.to_owned(),
            secret_key: secret_key.to_owned(),
            region: region.to_owned(),
            sts_endpoint: Some(parse_endpoint(STS_ENDPOINT, sts_endpoint, "https")?),
            role_arn: optional(&self.sts_role_arn).map(str::to_owned),
            session_duration: self.session_duration()?,
            refresh_margin: self.refresh_margin()?,
        })
    }

    fn session_duration(&self) -> Result<Duration, ConfigError> {
        let Some(raw) = optional(&self.sts_session_duration) else {
            return Ok(Duration::from_secs(DEFAULT_SESSION_DURATION_SECS));
        };

        let secs = parse_secs(STS_SESSION_DURATION_SECS, raw)?;
        if !SESSION_DURATION_RANGE_SECS.contains(&secs) {
            return Err(ConfigError::invalid(
                STS_SESSION_DURATION_SECS,
                format!(
                    "{secs} is outside {}..={} seconds",
                    SESSION_DURATION_RANGE_SECS.start(),
                    SESSION_DURATION_RANGE_SECS.end()
                ),
            ));
        }

        Ok(Duration::from_secs(secs))
    }

    fn refresh_margin(&self) -> Result<SignedDuration, ConfigError> {
        let secs = match optional(&self.s3_refresh_margin) {
            Some(raw) => parse_secs(S3_CREDENTIAL_REFRESH_MARGIN_SECS, raw)?,
            None => DEFAULT_REFRESH_MARGIN_SECS,
        };

        if secs < MIN_REFRESH_MARGIN_SECS {
            return Err(ConfigError::invalid(
                S3_CREDENTIAL_REFRESH_MARGIN_SECS,
                format!("{secs} is below the minimum of {MIN_REFRESH_MARGIN_SECS} seconds"),
            ));
        }

        let secs = i64::try_from(secs).map_err(|_| {
            ConfigError::invalid(S3_CREDENTIAL_REFRESH_MARGIN_SECS, "value is too large")
        })?;
        Ok(SignedDuration::from_secs(secs))
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |value: &Option<String>| value.as_ref().map(|_| "***");
        f.debug_struct("StorageConfig")
            .field("s3_target", &self.s3_target)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_endpoint_local", &self.s3_endpoint_local)
            .field("s3_access_key", &self.s3_access_key.as_deref().map(super::masked))
            .field("s3_secret_key", &redacted(&self.s3_secret_key))
            .field("s3_region", &self.s3_region)
            .field("s3_aws_endpoint", &self.s3_aws_endpoint)
            .field("s3_aws_region", &self.s3_aws_region)
            .field(
                "s3_aws_access_key",
                &self.s3_aws_access_key.as_deref().map(super::masked),
            )
            .field("s3_aws_secret_key", &redacted(&self.s3_aws_secret_key))
            .field("sts_endpoint", &self.sts_endpoint)
            .field("sts_role_arn", &self.sts_role_arn)
            .field("sts_session_duration", &self.sts_session_duration)
            .field("s3_refresh_margin", &self.s3_refresh_margin)
            .finish()
    }
}

/// Returns the trimmed value if it is set and non-empty.
fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(
    value: &'a Option<String>,
    variable: &'static str,
    backend: BackendKind,
) -> Result<&'a str, ConfigError> {
    optional(value).ok_or(ConfigError::Missing { variable, backend })
}

fn parse_secs(variable: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>()
        .map_err(|err| ConfigError::invalid(variable, format!("expected whole seconds: {err}")))
}

/// Parses an endpoint, prepending `default_scheme` when none is given.
///
/// The raw value is never echoed back since it may embed userinfo.
fn parse_endpoint(
    variable: &'static str,
    raw: &str,
    default_scheme: &str,
) -> Result<Url, ConfigError> {
    let url = if raw.contains("://") {
        Url::parse(raw)
    } else {
        Url::parse(&format!("{default_scheme}://{raw}"))
    }
    .map_err(|err| ConfigError::invalid(variable, format!("not a valid URL: {err}")))?;

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::invalid(variable, "endpoint has no host"));
    }

    Ok(url)
}

//! Error taxonomy shared by every layer of the crate.
//!
//! Four families exist and none of them ever carries a raw credential value:
//!
//! - [`ConfigError`]: missing or contradictory settings, fatal at startup.
//! - [`CredentialError`]: the token service exchange failed, surfaced to the
//!   caller who owns the retry policy.
//! - [`ClientBuildError`]: a backend client could not be constructed from the
//!   resolved endpoint, effectively a configuration error found lazily.
//! - [`StorageError`]: an object or bucket operation failed, classified into a
//!   backend-independent [`StorageErrorKind`].

use strum::{AsRefStr, Display, IntoStaticStr};

use crate::config::BackendKind;

/// Type alias for boxed dynamic errors that can be sent across threads.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Specialized [`Result`] type for storage layer operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Umbrella error returned by the [`Storage`](crate::Storage) facade.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum Error {
    /// Configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Session credentials could not be obtained.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A backend client could not be built.
    #[error(transparent)]
    ClientBuild(#[from] ClientBuildError),

    /// An object or bucket operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    /// Returns the storage error kind, if this is a storage error.
    pub fn storage_kind(&self) -> Option<StorageErrorKind> {
        match self {
            Error::Storage(err) => Some(err.kind()),
            _ => None,
        }
    }

    /// Returns whether the caller may retry the operation as-is.
    ///
    /// Configuration and client-build errors are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Config(_) | Error::ClientBuild(_) => false,
            Error::Credential(err) => err.is_retryable(),
            Error::Storage(err) => err.is_retryable(),
        }
    }

    /// Returns whether this error reports a missing bucket or object.
    pub fn is_not_found(&self) -> bool {
        self.storage_kind() == Some(StorageErrorKind::NotFound)
    }
}

/// Configuration resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable required by the selected backend is unset or empty.
    #[error("missing required setting `{variable}` for the {backend} backend")]
    Missing {
        /// Name of the environment variable.
        variable: &'static str,
        /// Backend that requires it.
        backend: BackendKind,
    },

    /// A variable is set but its value cannot be used.
    #[error("invalid value for `{variable}`: {reason}")]
    Invalid {
        /// Name of the environment variable.
        variable: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(variable: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            variable,
            reason: reason.into(),
        }
    }
}

/// Token service exchange failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// The token service could not be reached or timed out.
    #[error("token service unreachable: {0}")]
    Network(String),

    /// The token service answered with an error.
    #[error("token service rejected the request ({code}): {message}")]
    Rejected {
        /// Service error code, e.g. `AccessDenied`.
        code: String,
        /// Service error message.
        message: String,
    },

    /// The token service answered without usable credentials.
    #[error("malformed token service response: {0}")]
    Malformed(String),

    /// The requested exchange is not possible with the current settings.
    #[error("credential exchange unavailable: {0}")]
    Unsupported(String),
}

impl CredentialError {
    /// Returns whether retrying the exchange later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CredentialError::Network(_) => true,
            CredentialError::Rejected { code, .. } => {
                matches!(code.as_str(), "Throttling" | "RequestExpired" | "ServiceUnavailable")
            }
            CredentialError::Malformed(_) | CredentialError::Unsupported(_) => false,
        }
    }
}

/// Backend client construction failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientBuildError {
    /// The endpoint URL cannot address an S3-compatible service.
    #[error("malformed endpoint `{endpoint}`: {reason}")]
    MalformedEndpoint {
        /// The endpoint, without embedded userinfo.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The endpoint, TLS and region combination is not supported by the backend.
    #[error("unsupported {backend} client configuration: {reason}")]
    Unsupported {
        /// Backend being built.
        backend: BackendKind,
        /// Why it was rejected.
        reason: String,
    },
}

/// Backend-independent classification of storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum StorageErrorKind {
    /// The bucket or object does not exist.
    NotFound,
    /// The credentials are not allowed to perform the operation.
    AccessDenied,
    /// Network failure, timeout or server-side error; safe to retry.
    Transient,
    /// The operation conflicts with existing state, e.g. a bucket owned by
    /// someone else or a non-empty bucket.
    Conflict,
    /// Bad bucket name, object key or request parameter.
    Invalid,
}

/// Object or bucket operation failure.
#[derive(Debug, thiserror::Error)]
#[error("{kind}{}", message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct StorageError {
    kind: StorageErrorKind,
    message: Option<String>,
    #[source]
    source: Option<BoxedError>,
}

impl StorageError {
    /// Creates a new error of the given kind.
    pub fn new(kind: StorageErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Creates a [`StorageErrorKind::NotFound`] error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::NotFound).with_message(message)
    }

    /// Creates a [`StorageErrorKind::AccessDenied`] error.
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::AccessDenied).with_message(message)
    }

    /// Creates a [`StorageErrorKind::Transient`] error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Transient).with_message(message)
    }

    /// Creates a [`StorageErrorKind::Conflict`] error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Conflict).with_message(message)
    }

    /// Creates a [`StorageErrorKind::Invalid`] error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Invalid).with_message(message)
    }

    /// Classifies a local file system error.
    pub fn from_io(err: std::io::Error, context: impl Into<String>) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => StorageErrorKind::AccessDenied,
            std::io::ErrorKind::Interrupted | std::io::ErrorKind::TimedOut => {
                StorageErrorKind::Transient
            }
            _ => StorageErrorKind::Invalid,
        };
        Self::new(kind).with_message(context).with_source(err)
    }

    /// Adds a message to this error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a source error to this error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    #[inline]
    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    /// Returns the error message, if any.
    #[inline]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns whether the caller may retry the operation as-is.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.kind == StorageErrorKind::Transient
    }

    /// Returns whether this error reports a missing bucket or object.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.kind == StorageErrorKind::NotFound
    }
}

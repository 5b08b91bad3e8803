#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for configuration resolution.
pub const TRACING_TARGET_CONFIG: &str = "stow_storage::config";

/// Tracing target for credential exchange and refresh.
///
/// Credential values are never recorded under this target, only masked
/// access keys, epochs and expiry timestamps.
pub const TRACING_TARGET_CREDENTIALS: &str = "stow_storage::credentials";

/// Tracing target for backend client construction and reuse.
pub const TRACING_TARGET_CLIENT: &str = "stow_storage::client";

/// Tracing target for object operations.
pub const TRACING_TARGET_OBJECTS: &str = "stow_storage::objects";

/// Tracing target for bucket operations.
pub const TRACING_TARGET_BUCKETS: &str = "stow_storage::buckets";

/// Tracing target for delegated (client-facing) credential issuance.
pub const TRACING_TARGET_DELEGATION: &str = "stow_storage::delegation";

pub mod backend;
pub mod config;
pub mod credentials;
pub mod delegation;
mod endpoint;
mod error;
mod storage;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;

#[doc(hidden)]
pub mod prelude;

#[cfg(test)]
mod stub_server;

pub use config::{BackendKind, Settings, StorageConfig};
pub use endpoint::EndpointChoice;
pub use error::{
    BoxedError, ClientBuildError, ConfigError, CredentialError, Error, Result, StorageError,
    StorageErrorKind,
};
pub use storage::{ARCHIVE_BUCKET, Storage, StorageBuilder};
pub use types::{BucketRef, ObjectRef};

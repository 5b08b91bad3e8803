//! Configuration resolution.
//!
//! [`StorageConfig`] holds the raw, environment-shaped values. Resolving it
//! yields an immutable [`Settings`] for exactly one [`BackendKind`], or a
//! [`ConfigError`](crate::ConfigError) naming the offending variable.

mod settings;
mod storage_config;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

pub use self::settings::Settings;
pub use self::storage_config::StorageConfig;

/// Literal value of `S3_TARGET` that selects the AWS backend.
pub const AWS_TARGET: &str = "AWS";

/// Object storage service targeted by this process.
///
/// Determined once from configuration and never changed afterwards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    /// Self-hosted S3-compatible store with static keys.
    #[default]
    Minio,
    /// Managed AWS S3 with STS-issued session credentials.
    Aws,
}

impl BackendKind {
    /// Selects the backend from the raw `S3_TARGET` value.
    ///
    /// Only the exact literal [`AWS_TARGET`] selects AWS. Any other value,
    /// including an empty or absent one, falls back to Minio.
    pub fn from_target(target: Option<&str>) -> Self {
        match target {
            Some(AWS_TARGET) => BackendKind::Aws,
            _ => BackendKind::Minio,
        }
    }
}

/// Masks a key for logging, keeping only its first four characters.
pub(crate) fn masked(key: &str) -> String {
    if key.chars().count() <= 4 {
        return "*".repeat(key.chars().count());
    }

    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}***")
}

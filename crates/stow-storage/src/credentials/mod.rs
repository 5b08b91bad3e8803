//! Credential acquisition for the active backend.
//!
//! Minio uses the configured static keys. AWS exchanges the long-lived keys
//! for short-lived session credentials through a [`TokenService`], caches them
//! and refreshes them once they come within the refresh margin of expiry.

mod provider;
mod session;
mod sts;

use async_trait::async_trait;

pub use self::provider::CredentialProvider;
pub use self::session::{IssuedCredentials, SessionCredentials};
pub use self::sts::{StsClient, StsTokenService};
use crate::error::CredentialError;

/// Issues session credentials in exchange for long-lived ones.
#[async_trait]
pub trait TokenService: Send + Sync + 'static {
    /// Performs one credential exchange.
    async fn exchange(&self) -> Result<IssuedCredentials, CredentialError>;
}

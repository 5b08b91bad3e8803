use std::fmt;
use std::sync::Arc;

use jiff::{SignedDuration, Timestamp};
use tokio::sync::Mutex;

use super::{SessionCredentials, StsTokenService, TokenService};
use crate::TRACING_TARGET_CREDENTIALS;
use crate::config::{BackendKind, Settings};
use crate::error::CredentialError;

/// Supplies the credentials backend clients are built with.
///
/// Static keys are returned as-is. Session credentials are cached and
/// refreshed through the [`TokenService`] once they come within the refresh
/// margin of expiry. The cache lock is held across the exchange, so concurrent
/// callers during a refresh wait for the one exchange in flight instead of
/// starting their own.
pub struct CredentialProvider {
    source: Source,
}

enum Source {
    Static(Arc<SessionCredentials>),
    Session(SessionCache),
}

struct SessionCache {
    service: Arc<dyn TokenService>,
    refresh_margin: SignedDuration,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    current: Option<Arc<SessionCredentials>>,
    epoch: u64,
}

impl CredentialProvider {
    /// Creates a provider for static keys.
    pub fn fixed(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        let credentials = SessionCredentials::fixed(access_key, secret_key);
        Self {
            source: Source::Static(Arc::new(credentials)),
        }
    }

    /// Creates a provider for session credentials issued by `service`.
    pub fn session(service: Arc<dyn TokenService>, refresh_margin: SignedDuration) -> Self {
        Self {
            source: Source::Session(SessionCache {
                service,
                refresh_margin,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Creates the provider matching the configured backend.
    ///
    /// Builds the STS client for AWS, which does not touch the network.
    pub fn from_settings(settings: &Settings) -> Result<Self, CredentialError> {
        match settings.backend() {
            BackendKind::Minio => Ok(Self::fixed(settings.access_key(), settings.secret_key())),
            BackendKind::Aws => {
                let service = StsTokenService::from_settings(settings)?;
                Ok(Self::session(Arc::new(service), settings.refresh_margin()))
            }
        }
    }

    /// Returns credentials that stay valid for longer than the refresh margin.
    ///
    /// A failed exchange is returned to the caller and the next call tries
    /// again; no retries happen here.
    pub async fn credentials(&self) -> Result<Arc<SessionCredentials>, CredentialError> {
        match &self.source {
            Source::Static(credentials) => Ok(credentials.clone()),
            Source::Session(cache) => cache.get().await,
        }
    }
}

impl SessionCache {
    async fn get(&self) -> Result<Arc<SessionCredentials>, CredentialError> {
        let mut state = self.state.lock().await;

        if let Some(current) = state.current.as_ref()
            && current.is_fresh(Timestamp::now(), self.refresh_margin)
        {
            return Ok(current.clone());
        }

        tracing::debug!(
            target: TRACING_TARGET_CREDENTIALS,
            epoch = state.epoch,
            "Session credentials missing or about to expire, exchanging"
        );

        let issued = self.service.exchange().await.inspect_err(|err| {
            tracing::warn!(
                target: TRACING_TARGET_CREDENTIALS,
                error = %err,
                retryable = err.is_retryable(),
                "Session credential exchange failed"
            );
        })?;

        state.epoch += 1;
        let fresh = Arc::new(SessionCredentials::issued(issued, state.epoch));
        state.current = Some(fresh.clone());

        tracing::info!(
            target: TRACING_TARGET_CREDENTIALS,
            epoch = fresh.epoch(),
            access_key = %fresh.access_key_masked(),
            expiry = ?fresh.expiry(),
            "Session credentials refreshed"
        );

        Ok(fresh)
    }
}

impl fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Static(credentials) => f
                .debug_struct("CredentialProvider")
                .field("kind", &"static")
                .field("access_key", &credentials.access_key_masked())
                .finish(),
            Source::Session(cache) => f
                .debug_struct("CredentialProvider")
                .field("kind", &"session")
                .field("refresh_margin", &cache.refresh_margin)
                .finish_non_exhaustive(),
        }
    }
}

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};

use crate::credentials::{IssuedCredentials, TokenService};
use crate::error::CredentialError;

/// Fake token service counting exchanges and issuing numbered credentials.
///
/// Lifetimes and failures are consumed in order; once the script runs out,
/// every exchange succeeds with the default lifetime.
#[derive(Debug)]
pub struct ScriptedTokenService {
    default_lifetime: SignedDuration,
    lifetimes: Mutex<VecDeque<SignedDuration>>,
    failures: Mutex<VecDeque<CredentialError>>,
    delay: Duration,
    exchanges: AtomicUsize,
}

impl ScriptedTokenService {
    /// Creates a service issuing credentials valid for `default_lifetime`.
    pub fn new(default_lifetime: SignedDuration) -> Self {
        Self {
            default_lifetime,
            lifetimes: Mutex::new(VecDeque::new()),
            failures: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            exchanges: AtomicUsize::new(0),
        }
    }

    /// Scripts the lifetimes of the next exchanges.
    pub fn with_lifetimes(self, lifetimes: impl IntoIterator<Item = SignedDuration>) -> Self {
        self.lifetimes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(lifetimes);
        self
    }

    /// Makes every exchange take `delay`, so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes the next exchange fail with `err`.
    pub fn fail_next(&self, err: CredentialError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(err);
    }

    /// Returns how many exchanges were attempted, failed ones included.
    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    fn next_failure(&self) -> Option<CredentialError> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn next_lifetime(&self) -> SignedDuration {
        self.lifetimes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.default_lifetime)
    }
}

#[async_trait]
impl TokenService for ScriptedTokenService {
    async fn exchange(&self) -> Result<IssuedCredentials, CredentialError> {
        let serial = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(err) = self.next_failure() {
            return Err(err);
        }

        Ok(IssuedCredentials {
            access_key: format!("ASIAMOCK{serial:08}"),
            secret_key: format!("mock-secret-{serial}"),
            session_token: format!("mock-token-{serial}"),
            expiration: Timestamp::now() + self.next_lifetime(),
        })
    }
}

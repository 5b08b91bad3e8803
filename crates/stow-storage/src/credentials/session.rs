use std::fmt;

use jiff::{SignedDuration, Timestamp};

use crate::config::masked;

/// Credentials returned by a single token service exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCredentials {
    /// Temporary access key.
    pub access_key: String,
    /// Temporary secret key.
    pub secret_key: String,
    /// Session token bound to the key pair.
    pub session_token: String,
    /// Instant after which the credentials are rejected.
    pub expiration: Timestamp,
}

impl fmt::Debug for IssuedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredentials")
            .field("access_key", &masked(&self.access_key))
            .field("secret_key", &"***")
            .field("session_token", &"***")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Credentials a backend client signs its requests with.
///
/// The epoch identifies the credential set: it is `0` for static keys and
/// increases by one with every session refresh, so a client built from an
/// older epoch is known to be stale.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    access_key: String,
    secret_key: String,
    session_token: Option<String>,
    expiry: Option<Timestamp>,
    epoch: u64,
}

impl SessionCredentials {
    /// Wraps static keys that never expire.
    pub fn fixed(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: None,
            expiry: None,
            epoch: 0,
        }
    }

    /// Wraps exchanged credentials under the given epoch.
    pub fn issued(credentials: IssuedCredentials, epoch: u64) -> Self {
        Self {
            access_key: credentials.access_key,
            secret_key: credentials.secret_key,
            session_token: Some(credentials.session_token),
            expiry: Some(credentials.expiration),
            epoch,
        }
    }

    #[inline]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    #[inline]
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    #[inline]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Returns the expiry, or `None` for credentials that never expire.
    #[inline]
    pub fn expiry(&self) -> Option<Timestamp> {
        self.expiry
    }

    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the masked access key for logging.
    pub fn access_key_masked(&self) -> String {
        masked(&self.access_key)
    }

    /// Returns whether the credentials remain usable for longer than `margin`.
    pub fn is_fresh(&self, now: Timestamp, margin: SignedDuration) -> bool {
        match self.expiry {
            None => true,
            Some(expiry) => expiry.duration_since(now) > margin,
        }
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key", &self.access_key_masked())
            .field("secret_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .field("expiry", &self.expiry)
            .field("epoch", &self.epoch)
            .finish()
    }
}

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};

use crate::delegation::{DelegatedAccess, DelegatedCredentials, Delegation};
use crate::error::CredentialError;

/// Delegation that records each request and issues fake credentials.
#[derive(Debug, Default)]
pub struct RecordingDelegation {
    requests: Mutex<Vec<(String, DelegatedAccess)>>,
}

impl RecordingDelegation {
    /// Returns the `(bucket, access)` pairs requested so far.
    pub fn requests(&self) -> Vec<(String, DelegatedAccess)> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Delegation for RecordingDelegation {
    async fn delegate(
        &self,
        bucket: &str,
        access: &DelegatedAccess,
    ) -> Result<DelegatedCredentials, CredentialError> {
        let serial = {
            let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
            requests.push((bucket.to_owned(), access.clone()));
            requests.len()
        };

        Ok(DelegatedCredentials {
            bucket: bucket.to_owned(),
            key: match access {
                DelegatedAccess::Upload => None,
                DelegatedAccess::Download { key } => Some(key.clone()),
            },
            access_key_id: format!("ASIADELEGATE{serial:04}"),
            secret_access_key: format!("delegated-secret-{serial}"),
            session_token: format!("delegated-token-{serial}"),
            expiration: Timestamp::now() + SignedDuration::from_hours(1),
        })
    }
}

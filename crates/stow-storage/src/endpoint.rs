//! Endpoint selection per network path.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use url::Url;

use crate::config::Settings;

/// Network path the result of an operation is consumed on.
///
/// Operations the service performs itself (uploads, deletes, reads it
/// consumes) use [`Internal`](EndpointChoice::Internal). Anything handed to an
/// external consumer, such as a presigned link, uses
/// [`External`](EndpointChoice::External).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EndpointChoice {
    /// Intra-network address of the store.
    Internal,
    /// Publicly routable address of the store.
    External,
}

impl Settings {
    /// Returns the endpoint for the given network path.
    ///
    /// For AWS both choices resolve to the same address.
    pub fn endpoint(&self, choice: EndpointChoice) -> &Url {
        match choice {
            EndpointChoice::Internal => self.internal_endpoint(),
            EndpointChoice::External => self.external_endpoint(),
        }
    }
}

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A bucket as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRef {
    /// Bucket name.
    pub name: String,
    /// Creation time, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<Timestamp>,
}

impl BucketRef {
    /// Creates a reference with no creation time.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created: None,
        }
    }
}

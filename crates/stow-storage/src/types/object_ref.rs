use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// An object as reported by the backend after a write, head or listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Entity tag, when the backend reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Last modification time, when the backend reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
}

impl ObjectRef {
    /// Creates a reference with only location and size known.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, size: u64) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            size,
            etag: None,
            last_modified: None,
        }
    }

    /// Sets the entity tag.
    pub fn with_etag(mut self, etag: Option<impl Into<String>>) -> Self {
        self.etag = etag.map(Into::into);
        self
    }

    /// Sets the last modification time.
    pub fn with_last_modified(mut self, last_modified: Option<Timestamp>) -> Self {
        self.last_modified = last_modified;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_camel_case_without_unknown_fields() {
        let object = ObjectRef::new("docs", "reports/q1.pdf", 42).with_etag(Some("\"abc\""));
        let json = serde_json::to_value(&object).expect("serializable");

        assert_eq!(
            json,
            serde_json::json!({
                "bucket": "docs",
                "key": "reports/q1.pdf",
                "size": 42,
                "etag": "\"abc\"",
            })
        );
    }
}

//! Bucket name and object key validation.
//!
//! Both backends share the S3 naming rules, so names are checked once before
//! any request is built.

use std::net::Ipv4Addr;

use crate::error::StorageError;

const MAX_KEY_BYTES: usize = 1024;

/// Checks a bucket name against the S3 naming rules.
pub fn validate_bucket_name(bucket: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::invalid(format!("bucket `{bucket}` {reason}"));

    if !(3..=63).contains(&bucket.len()) {
        return Err(invalid("must be 3 to 63 characters long"));
    }

    if !bucket
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        return Err(invalid(
            "may only contain lowercase letters, digits, hyphens and dots",
        ));
    }

    let edges = [bucket.as_bytes()[0], bucket.as_bytes()[bucket.len() - 1]];
    if !edges.iter().all(u8::is_ascii_alphanumeric) {
        return Err(invalid("must start and end with a letter or digit"));
    }

    if bucket.contains("..") || bucket.contains(".-") || bucket.contains("-.") {
        return Err(invalid("must not contain adjacent dots or dot-hyphen pairs"));
    }

    if bucket.parse::<Ipv4Addr>().is_ok() {
        return Err(invalid("must not be formatted as an IP address"));
    }

    Ok(())
}

/// Checks an object key: non-empty and at most 1024 bytes of UTF-8.
pub fn validate_object_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::invalid("object key must not be empty"));
    }

    if key.len() > MAX_KEY_BYTES {
        return Err(StorageError::invalid(format!(
            "object key is {} bytes, the limit is {MAX_KEY_BYTES}",
            key.len()
        )));
    }

    Ok(())
}

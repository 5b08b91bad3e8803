//! Backend-independent data types.

mod bucket_ref;
mod names;
mod object_ref;

pub use self::bucket_ref::BucketRef;
pub use self::names::{validate_bucket_name, validate_object_key};
pub use self::object_ref::ObjectRef;

//! Commonly used items from stow-storage.
//!
//! ```rust,ignore
//! use stow_storage::prelude::*;
//! ```

pub use crate::backend::{ClientFactory, ObjectStorage, ObjectStream, StorageClient};
pub use crate::credentials::{CredentialProvider, SessionCredentials, TokenService};
pub use crate::delegation::{DelegatedAccess, DelegatedCredentials, Delegation};
pub use crate::{
    ARCHIVE_BUCKET, BackendKind, BucketRef, EndpointChoice, Error, ObjectRef, Result, Settings,
    Storage, StorageBuilder, StorageConfig, StorageError, StorageErrorKind,
};

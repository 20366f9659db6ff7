//! Data Provider Module
//!
//! General file-backed blob store. Knows nothing about audio:
//! - Provider handles, leases and scoped read/write streams
//! - The manager owning the storage root and resource bookkeeping
//! - The persisted id→file manifest

pub mod manager;
pub mod manifest;
pub mod provider;

pub use manager::{DataProviderManager, RelocationFailure, RelocationReport};
pub use manifest::{ManifestEntry, ProviderManifest, MANIFEST_FILE_NAME};
pub use provider::{
    copy_exact, DataProvider, ProviderId, ProviderLease, ProviderReader, ProviderWriter,
};

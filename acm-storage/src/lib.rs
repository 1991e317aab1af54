//! Content/config fingerprinting, the `StorageProvider` capability boundary,
//! and the artifact index that backs skip logic (spec.md §4.6, §6.1).

pub mod artifact_index;
pub mod capability;
pub mod hashing;
pub mod skip;

pub use artifact_index::{ArtifactIndex, ArtifactKey};
pub use capability::{
    BatchWriteEntry, InMemoryStorage, ReadResult, StorageCapabilities, StorageError,
    StorageProvider,
};
pub use hashing::{config_hash, content_hash};
pub use skip::{decide as decide_skip, SkipDecision};

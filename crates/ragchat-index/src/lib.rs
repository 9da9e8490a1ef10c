//! ragchat-index
//!
//! In-memory vector index plus LanceDB-backed snapshots.

pub mod index;
pub mod schema;
pub mod snapshot;
pub mod store;

pub use index::VectorIndex;
pub use snapshot::SnapshotManifest;
pub use store::IndexStore;

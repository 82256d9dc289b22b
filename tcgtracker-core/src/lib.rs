pub mod decklist;
pub mod errors;
pub mod filters;
pub mod ledger;
pub mod models;
pub mod repo;
pub mod sample;
pub mod snapshot;
pub mod stats;
pub mod validate;

pub use errors::*;
pub use filters::*;
pub use ledger::*;
pub use models::*;
pub use repo::memory::MemoryRepo;
pub use repo::*;
pub use sample::*;
pub use snapshot::{Snapshot, SnapshotError, SNAPSHOT_FORMAT, SNAPSHOT_VERSION};
pub use stats::*;

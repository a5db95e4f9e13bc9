//! WOPI lock store.
//!
//! A lock record binds one file id to the opaque lock value a WOPI client
//! chose. Records expire `ttl` after they were last written; an expired
//! record reads as absent and may be overwritten by the next `put`.
//!
//! # Store Operations
//!
//! Every mutation is a single compare-and-set step:
//! - `put`: create when absent (or expired)
//! - `replace`: swap the value when the current one matches, resetting expiry
//! - `remove`: delete when the current value matches
//!
//! `replace(v, v)` is how a lock is refreshed.
//!
//! # Implementations
//!
//! - [`MemoryLockStore`]: process-local map
//! - [`FileLockStore`]: one JSON file per locked file id under
//!   `.wopilock/locks/`, created with **create_new** semantics
//!
//! [`acquire_section`] takes a short-lived guard file the same way, so
//! processes sharing a workspace serialize their per-document sections.

mod file;
mod guard;
mod memory;
mod record;
mod store;


pub use file::FileLockStore;
pub use guard::{SectionGuard, acquire_section};
pub use memory::MemoryLockStore;
pub use record::{LockRecord, get_owner_string};
pub use store::{LockStore, LockStoreError, StoreResult};

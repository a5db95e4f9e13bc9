//! Filesystem utilities for wopilock.
//!
//! File-backed lock records, item versions and document manifests are all
//! written through [`atomic_write`], so a reader never sees a torn file.

pub mod atomic;

pub use atomic::atomic_write;
pub use atomic::atomic_write_file;

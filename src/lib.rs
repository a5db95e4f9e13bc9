//! wopilock: WOPI file-lock coordination for document repositories.
//!
//! The [`engine::LockEngine`] keeps per-file WOPI locks consistent with a
//! repository's own document-level lock, serves content mutations under
//! those locks, and tracks item versions. [`files::FilesEndpoint`] shapes
//! its results into WOPI responses; the `wopilock` binary drives both over
//! a file-backed [`workspace::Workspace`].

pub mod bridge;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod files;
pub mod fs;
pub mod headers;
pub mod identity;
pub mod locks;
pub mod repository;
pub mod versions;
pub mod workspace;

#[cfg(test)]
mod test_support;

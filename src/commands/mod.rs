//! Command implementations for wopilock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, plus the response printer shared by the file commands.

mod doc;
mod file;
mod init;
mod locks;

#[cfg(test)]
mod tests;

use crate::cli::{Cli, Command, DocAction, LocksAction};
use crate::engine::{LockEngine, RequestContext};
use crate::error::{Result, WopiError};
use crate::files::{Body, FilesEndpoint, WopiResponse};
use crate::headers;
use crate::workspace::Workspace;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

/// Options shared by every command.
#[derive(Debug, Clone)]
pub(crate) struct Globals {
    pub root: Option<PathBuf>,
    pub user: String,
}

impl Globals {
    pub fn from_cli(root: Option<PathBuf>, user: Option<String>) -> Self {
        Self {
            root,
            user: user.unwrap_or_else(default_user),
        }
    }

    /// The workspace enclosing `--root`, or the current directory.
    pub fn workspace(&self) -> Result<Workspace> {
        match &self.root {
            Some(root) => Workspace::resolve_from(root),
            None => Workspace::resolve(),
        }
    }

    pub fn context(&self) -> RequestContext {
        RequestContext::new(&self.user)
    }

    pub fn engine(&self) -> Result<Arc<LockEngine>> {
        Ok(Arc::new(self.workspace()?.open_engine()?))
    }

    pub fn endpoint(&self) -> Result<FilesEndpoint> {
        Ok(FilesEndpoint::new(self.engine()?))
    }
}

fn default_user() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "anonymous".to_string())
}

/// Dispatch a command to its implementation.
pub fn dispatch(cli: Cli) -> Result<()> {
    let globals = Globals::from_cli(cli.root, cli.user);

    match cli.command {
        Command::Init => init::cmd_init(&globals),
        Command::Doc(doc_cmd) => match doc_cmd.action {
            DocAction::Add(args) => doc::cmd_doc_add(&globals, args),
            DocAction::List => doc::cmd_doc_list(&globals),
        },
        Command::FileId(args) => doc::cmd_file_id(&globals, args),
        Command::Info(args) => file::cmd_info(&globals, args),
        Command::Get(args) => file::cmd_get(&globals, args),
        Command::Lock(args) => file::cmd_lock(&globals, args),
        Command::Unlock(args) => file::cmd_unlock(&globals, args),
        Command::Refresh(args) => file::cmd_refresh(&globals, args),
        Command::GetLock(args) => file::cmd_get_lock(&globals, args),
        Command::Put(args) => file::cmd_put(&globals, args),
        Command::Rename(args) => file::cmd_rename(&globals, args),
        Command::PutRelative(args) => file::cmd_put_relative(&globals, args),
        Command::ShareUrl(args) => file::cmd_share_url(&globals, args),
        Command::NativeLock(args) => locks::cmd_native_lock(&globals, args),
        Command::Locks(locks_cmd) => match locks_cmd.action {
            LocksAction::List => locks::cmd_locks_list(&globals),
            LocksAction::Reap => locks::cmd_locks_reap(&globals),
        },
    }
}

/// Print a response, or the error response of a failed request, and pass
/// the outcome through.
pub(crate) fn respond(result: Result<WopiResponse>) -> Result<WopiResponse> {
    match result {
        Ok(response) => {
            print_response(&response);
            Ok(response)
        }
        Err(err) => {
            print_response(&WopiResponse::from_error(&err));
            Err(err)
        }
    }
}

pub(crate) fn print_response(response: &WopiResponse) {
    println!("{} {}", response.status, reason_phrase(response.status));
    if let Some(lock) = &response.lock {
        println!("{}: {}", headers::LOCK, lock);
    }
    if let Some(version) = response.item_version {
        println!("{}: {}", headers::ITEM_VERSION, version);
    }
    match &response.body {
        Body::Empty => {}
        Body::Json(value) => {
            println!();
            match serde_json::to_string_pretty(value) {
                Ok(text) => println!("{}", text),
                Err(_) => println!("{}", value),
            }
        }
        Body::Bytes(bytes) => {
            println!();
            println!("{}", String::from_utf8_lossy(bytes));
        }
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        412 => "Precondition Failed",
        501 => "Not Implemented",
        _ => "Internal Server Error",
    }
}

/// Read a command's input file.
pub(crate) fn read_input(path: &std::path::Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        WopiError::Storage(format!("failed to read input file '{}': {}", path.display(), e))
    })
}

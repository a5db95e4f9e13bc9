//! CLI argument parsing for wopilock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; implementations are in the
//! `commands` module.

use crate::repository::Permission;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default content field of a document.
pub const DEFAULT_FIELD: &str = "file:content";

/// wopilock: WOPI file-lock coordination over a local document repository.
///
/// State lives in a `.wopilock/` directory:
/// - documents and their blobs under `docs/`
/// - one lock file per locked file id under `locks/`
/// - item versions and an audit log next to them
///
/// File commands print the response a WOPI host would send: status,
/// `X-WOPI-Lock`, `X-WOPI-ItemVersion` and the body.
#[derive(Parser, Debug)]
#[command(name = "wopilock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Workspace directory (default: nearest ancestor holding `.wopilock/`).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Principal to act as (default: $USER).
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Log requests, evaluated conditions and responses to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for wopilock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a workspace.
    ///
    /// Creates `.wopilock/` with its state directories and a default config.
    Init,

    /// Document management commands.
    Doc(DocCommand),

    /// Print the file id of a document's content field.
    FileId(FileIdArgs),

    /// CheckFileInfo: print file metadata.
    Info(FileArgs),

    /// GetFile: fetch a file's content.
    Get(GetArgs),

    /// LOCK, or UNLOCK_AND_RELOCK when --old-lock is given.
    Lock(LockArgs),

    /// UNLOCK.
    Unlock(LockValueArgs),

    /// REFRESH_LOCK.
    Refresh(LockValueArgs),

    /// GET_LOCK.
    GetLock(FileArgs),

    /// PUT: replace a file's content.
    Put(PutArgs),

    /// RENAME_FILE.
    Rename(RenameArgs),

    /// PUT_RELATIVE: store content under a new name.
    PutRelative(PutRelativeArgs),

    /// GET_SHARE_URL.
    ShareUrl(ShareUrlArgs),

    /// Set or clear a document's native lock, as a non-WOPI user would.
    NativeLock(NativeLockArgs),

    /// Lock store maintenance.
    ///
    /// List lock records or reap expired ones.
    Locks(LocksCommand),
}

/// Document subcommands.
#[derive(Parser, Debug)]
pub struct DocCommand {
    #[command(subcommand)]
    pub action: DocAction,
}

/// Available document actions.
#[derive(Subcommand, Debug)]
pub enum DocAction {
    /// Add a document holding one file.
    Add(DocAddArgs),

    /// List documents and their file ids.
    List,
}

/// Arguments for the `doc add` command.
#[derive(Parser, Debug)]
pub struct DocAddArgs {
    /// Document id (letters, digits, '-', '_' or '.').
    pub doc_id: String,

    /// File whose bytes become the document's content.
    pub file: PathBuf,

    /// Content field to store the file under.
    #[arg(long, default_value = DEFAULT_FIELD)]
    pub field: String,

    /// Document title (default: the file name).
    #[arg(long)]
    pub title: Option<String>,

    /// Containing folder title.
    #[arg(long)]
    pub folder: Option<String>,

    /// Access grants as user=permission (read or write).
    #[arg(long = "grant", value_parser = parse_grant)]
    pub grants: Vec<(String, Permission)>,
}

/// Arguments for the `file-id` command.
#[derive(Parser, Debug)]
pub struct FileIdArgs {
    /// Document id.
    pub doc_id: String,

    /// Content field.
    #[arg(long, default_value = DEFAULT_FIELD)]
    pub field: String,
}

/// A single file id.
#[derive(Parser, Debug)]
pub struct FileArgs {
    /// File id (see `wopilock file-id`).
    pub file_id: String,
}

/// Arguments for the `get` command.
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// File id.
    pub file_id: String,

    /// Value of X-WOPI-MaxExpectedSize. Non-numeric values are ignored.
    #[arg(long)]
    pub max_expected_size: Option<String>,

    /// Write the content here instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

/// Arguments for the `lock` command.
#[derive(Parser, Debug)]
pub struct LockArgs {
    /// File id.
    pub file_id: String,

    /// Lock value.
    pub lock: String,

    /// Lock value to replace (UNLOCK_AND_RELOCK).
    #[arg(long)]
    pub old_lock: Option<String>,
}

/// A file id and the lock value presented for it.
#[derive(Parser, Debug)]
pub struct LockValueArgs {
    /// File id.
    pub file_id: String,

    /// Lock value.
    pub lock: String,
}

/// Arguments for the `put` command.
#[derive(Parser, Debug)]
pub struct PutArgs {
    /// File id.
    pub file_id: String,

    /// File holding the new content.
    pub input: PathBuf,

    /// Lock value held on the file.
    #[arg(long)]
    pub lock: Option<String>,
}

/// Arguments for the `rename` command.
#[derive(Parser, Debug)]
pub struct RenameArgs {
    /// File id.
    pub file_id: String,

    /// New name without extension.
    pub name: String,

    /// Lock value held on the file.
    #[arg(long)]
    pub lock: Option<String>,
}

/// Arguments for the `put-relative` command.
#[derive(Parser, Debug)]
pub struct PutRelativeArgs {
    /// File id of the source file.
    pub file_id: String,

    /// File holding the content to store.
    pub input: PathBuf,

    /// X-WOPI-SuggestedTarget: a file name, or an extension starting with '.'.
    #[arg(long)]
    pub suggested: Option<String>,

    /// X-WOPI-RelativeTarget: an exact file name.
    #[arg(long)]
    pub relative: Option<String>,

    /// Convert in place instead of creating a new document.
    #[arg(long)]
    pub convert: bool,

    /// Lock value held on the source file.
    #[arg(long)]
    pub lock: Option<String>,
}

/// Arguments for the `share-url` command.
#[derive(Parser, Debug)]
pub struct ShareUrlArgs {
    /// File id.
    pub file_id: String,

    /// X-WOPI-UrlType (ReadOnly or ReadWrite).
    #[arg(long = "type", default_value = "ReadOnly")]
    pub url_type: String,
}

/// Arguments for the `native-lock` command.
#[derive(Parser, Debug)]
pub struct NativeLockArgs {
    /// Document id.
    pub doc_id: String,

    /// Native lock owner.
    #[arg(long, default_value = "Administrator")]
    pub owner: String,

    /// Clear the lock instead of setting it.
    #[arg(long)]
    pub release: bool,
}

/// Lock store subcommands.
#[derive(Parser, Debug)]
pub struct LocksCommand {
    #[command(subcommand)]
    pub action: LocksAction,
}

/// Available lock store actions.
#[derive(Subcommand, Debug)]
pub enum LocksAction {
    /// List lock records, expired ones included.
    List,

    /// Purge expired locks and release drained native locks.
    Reap,
}

fn parse_grant(value: &str) -> Result<(String, Permission), String> {
    let (user, permission) = value
        .split_once('=')
        .ok_or_else(|| format!("expected user=permission, got '{}'", value))?;
    if user.is_empty() {
        return Err(format!("missing user in '{}'", value));
    }
    Ok((user.to_string(), permission.parse()?))
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["wopilock", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init));
        assert!(cli.root.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "wopilock", "get-lock", "abc", "--user", "john", "--root", "/tmp/ws", "-v",
        ])
        .unwrap();
        assert_eq!(cli.user.as_deref(), Some("john"));
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/ws")));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::GetLock(FileArgs { ref file_id }) if file_id == "abc"));
    }

    #[test]
    fn parse_doc_add() {
        let cli = Cli::try_parse_from([
            "wopilock",
            "doc",
            "add",
            "report",
            "report.docx",
            "--grant",
            "john=write",
            "--grant",
            "joe=read",
            "--folder",
            "Workspace",
        ])
        .unwrap();
        let Command::Doc(DocCommand {
            action: DocAction::Add(args),
        }) = cli.command
        else {
            panic!("Expected doc add command");
        };
        assert_eq!(args.doc_id, "report");
        assert_eq!(args.field, DEFAULT_FIELD);
        assert_eq!(
            args.grants,
            vec![
                ("john".to_string(), Permission::ReadWrite),
                ("joe".to_string(), Permission::Read)
            ]
        );
        assert_eq!(args.folder.as_deref(), Some("Workspace"));
    }

    #[test]
    fn parse_doc_add_rejects_bad_grant() {
        assert!(Cli::try_parse_from(["wopilock", "doc", "add", "r", "f", "--grant", "john"]).is_err());
        assert!(
            Cli::try_parse_from(["wopilock", "doc", "add", "r", "f", "--grant", "john=admin"]).is_err()
        );
    }

    #[test]
    fn parse_lock_with_old_lock() {
        let cli =
            Cli::try_parse_from(["wopilock", "lock", "abc", "new", "--old-lock", "old"]).unwrap();
        if let Command::Lock(args) = cli.command {
            assert_eq!(args.lock, "new");
            assert_eq!(args.old_lock.as_deref(), Some("old"));
        } else {
            panic!("Expected Lock command");
        }
    }

    #[test]
    fn parse_lock_requires_value() {
        assert!(Cli::try_parse_from(["wopilock", "lock", "abc"]).is_err());
    }

    #[test]
    fn parse_put_relative() {
        let cli = Cli::try_parse_from([
            "wopilock",
            "put-relative",
            "abc",
            "out.pdf",
            "--suggested",
            ".pdf",
            "--convert",
        ])
        .unwrap();
        if let Command::PutRelative(args) = cli.command {
            assert_eq!(args.suggested.as_deref(), Some(".pdf"));
            assert!(args.relative.is_none());
            assert!(args.convert);
        } else {
            panic!("Expected PutRelative command");
        }
    }

    #[test]
    fn parse_native_lock_defaults() {
        let cli = Cli::try_parse_from(["wopilock", "native-lock", "report"]).unwrap();
        if let Command::NativeLock(args) = cli.command {
            assert_eq!(args.owner, "Administrator");
            assert!(!args.release);
        } else {
            panic!("Expected NativeLock command");
        }
    }

    #[test]
    fn parse_locks_subcommands() {
        let cli = Cli::try_parse_from(["wopilock", "locks", "list"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Locks(LocksCommand {
                action: LocksAction::List
            })
        ));
        let cli = Cli::try_parse_from(["wopilock", "locks", "reap"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Locks(LocksCommand {
                action: LocksAction::Reap
            })
        ));
    }

    #[test]
    fn parse_share_url_type() {
        let cli = Cli::try_parse_from(["wopilock", "share-url", "abc", "--type", "ReadWrite"]).unwrap();
        if let Command::ShareUrl(args) = cli.command {
            assert_eq!(args.url_type, "ReadWrite");
        } else {
            panic!("Expected ShareUrl command");
        }
    }
}

//! End-to-end tests of the command layer against a temporary workspace.

use super::*;
use crate::exit_codes;
use crate::identity::FileId;
use crate::repository::{DocumentRef, DocumentRepository};
use crate::test_support::{create_workspace, create_workspace_with_config};
use clap::Parser;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn run_as(root: &Path, user: &str, args: &[&str]) -> Result<()> {
    let root = root.to_string_lossy().to_string();
    let mut argv = vec!["wopilock", "--root", root.as_str(), "--user", user];
    argv.extend_from_slice(args);
    dispatch(Cli::try_parse_from(argv).unwrap())
}

fn run(root: &Path, args: &[&str]) -> Result<()> {
    run_as(root, "john", args)
}

/// Workspace holding document `report` with john as writer and joe as reader.
fn workspace_with_report(temp: &TempDir) -> String {
    let input = temp.path().join("report.txt");
    fs::write(&input, "first draft").unwrap();
    run(
        temp.path(),
        &["doc", "add", "report", input.to_str().unwrap(), "--grant", "joe=read"],
    )
    .unwrap();
    FileId::compute("default", "report", "file:content").to_string()
}

fn report_doc() -> DocumentRef {
    DocumentRef::new("default", "report")
}

#[test]
fn init_is_idempotent() {
    let temp = TempDir::new().unwrap();
    run(temp.path(), &["init"]).unwrap();
    run(temp.path(), &["init"]).unwrap();

    let workspace = Workspace::at(temp.path());
    assert!(workspace.exists());
    let events = workspace.event_log().read_all().unwrap();
    assert_eq!(events.len(), 1);
}

#[test]
fn commands_need_a_workspace() {
    let temp = TempDir::new().unwrap();
    let err = run(temp.path(), &["locks", "list"]).unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
}

#[test]
fn doc_add_and_file_id() {
    let temp = create_workspace();
    let file_id = workspace_with_report(&temp);

    let repository = Workspace::at(temp.path()).repository();
    let info = repository.document("report").unwrap().unwrap();
    assert_eq!(info.title, "report.txt");
    assert_eq!(info.creator, "john");
    assert!(repository.can_write(&report_doc(), "john").unwrap());
    assert!(!repository.can_write(&report_doc(), "joe").unwrap());

    run(temp.path(), &["file-id", "report"]).unwrap();
    run(temp.path(), &["info", &file_id]).unwrap();
    run(temp.path(), &["doc", "list"]).unwrap();

    let err = run(temp.path(), &["file-id", "missing"]).unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::NOT_FOUND);
}

#[test]
fn lock_put_unlock_cycle() {
    let temp = create_workspace();
    let file_id = workspace_with_report(&temp);
    let update = temp.path().join("update.txt");
    fs::write(&update, "second draft").unwrap();
    let update = update.to_str().unwrap();

    run(temp.path(), &["lock", &file_id, "foo"]).unwrap();
    run(temp.path(), &["put", &file_id, update, "--lock", "foo"]).unwrap();
    run(temp.path(), &["refresh", &file_id, "foo"]).unwrap();
    run(temp.path(), &["lock", &file_id, "bar", "--old-lock", "foo"]).unwrap();
    run(temp.path(), &["get-lock", &file_id]).unwrap();
    run(temp.path(), &["unlock", &file_id, "bar"]).unwrap();

    let repository = Workspace::at(temp.path()).repository();
    assert_eq!(
        repository.read_blob(&report_doc(), "file:content").unwrap(),
        b"second draft"
    );
    assert_eq!(repository.native_lock(&report_doc()).unwrap(), None);
}

#[test]
fn conflicts_map_to_exit_codes() {
    let temp = create_workspace();
    let file_id = workspace_with_report(&temp);

    run(temp.path(), &["lock", &file_id, "foo"]).unwrap();
    let err = run(temp.path(), &["lock", &file_id, "bar"]).unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::LOCK_CONFLICT);
    assert_eq!(err.lock_header(), Some("foo"));

    let err = run_as(temp.path(), "joe", &["unlock", &file_id, "foo"]).unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::LOCK_CONFLICT);
    assert_eq!(err.lock_header(), None);

    let err = run(temp.path(), &["get-lock", "bm90LWEtZmlsZQ"]).unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::NOT_FOUND);
}

#[test]
fn native_lock_blocks_wopi_until_released() {
    let temp = create_workspace();
    let file_id = workspace_with_report(&temp);

    run(temp.path(), &["native-lock", "report"]).unwrap();
    let err = run(temp.path(), &["lock", &file_id, "foo"]).unwrap_err();
    assert_eq!(err.lock_header(), None);

    let err = run(temp.path(), &["native-lock", "report", "--owner", "someone", "--release"])
        .unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::LOCK_CONFLICT);

    run(temp.path(), &["native-lock", "report", "--release"]).unwrap();
    run(temp.path(), &["lock", &file_id, "foo"]).unwrap();
}

#[test]
fn get_writes_content_to_file() {
    let temp = create_workspace();
    let file_id = workspace_with_report(&temp);
    let out = temp.path().join("out.txt");

    run(temp.path(), &["get", &file_id, "--out", out.to_str().unwrap()]).unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), "first draft");

    let err = run(temp.path(), &["get", &file_id, "--max-expected-size", "3"]).unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::PRECONDITION_FAILED);
    run(temp.path(), &["get", &file_id, "--max-expected-size", "huge"]).unwrap();
}

#[test]
fn rename_and_share_url() {
    let temp = create_workspace();
    let file_id = workspace_with_report(&temp);

    run(temp.path(), &["rename", &file_id, "Résumé final"]).unwrap();
    let blob = Workspace::at(temp.path())
        .repository()
        .blob(&report_doc(), "file:content")
        .unwrap()
        .unwrap();
    assert_eq!(blob.filename, "Résumé final.txt");

    run(temp.path(), &["share-url", &file_id, "--type", "ReadWrite"]).unwrap();
    let err = run(temp.path(), &["share-url", &file_id, "--type", "Embed"]).unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::UNSUPPORTED);
}

#[test]
fn put_relative_creation_follows_config() {
    let temp = create_workspace_with_config("allow_put_relative_creation: false\n");
    let file_id = workspace_with_report(&temp);
    let input = temp.path().join("copy.txt");
    fs::write(&input, "copy").unwrap();
    let input = input.to_str().unwrap();

    let err = run(temp.path(), &["put-relative", &file_id, input, "--suggested", "copy.txt"])
        .unwrap_err();
    assert_eq!(err.exit_code(), exit_codes::UNSUPPORTED);

    run(
        temp.path(),
        &["put-relative", &file_id, input, "--suggested", ".md", "--convert"],
    )
    .unwrap();
    let repository = Workspace::at(temp.path()).repository();
    assert_eq!(
        repository
            .blob(&report_doc(), "file:content")
            .unwrap()
            .unwrap()
            .filename,
        "report.md"
    );
    assert_eq!(repository.document("report").unwrap().unwrap().version_label, "0.1+");
}

#[test]
fn locks_list_and_reap() {
    let temp = create_workspace();
    let file_id = workspace_with_report(&temp);

    run(temp.path(), &["locks", "list"]).unwrap();
    run(temp.path(), &["lock", &file_id, "foo"]).unwrap();
    run(temp.path(), &["locks", "list"]).unwrap();
    // Live locks survive a reap
    run(temp.path(), &["locks", "reap"]).unwrap();
    run(temp.path(), &["unlock", &file_id, "foo"]).unwrap();
}

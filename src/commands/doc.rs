//! Document commands: `doc add`, `doc list`, `file-id`.

use super::{Globals, read_input};
use crate::cli::{DocAddArgs, FileIdArgs};
use crate::error::{Result, WopiError};
use crate::events::{Event, EventAction};
use crate::identity::FileId;
use crate::repository::{DocumentRepository, DocumentSpec, Permission};
use crate::workspace::REPOSITORY_NAME;
use serde_json::json;

pub(super) fn cmd_doc_add(globals: &Globals, args: DocAddArgs) -> Result<()> {
    let workspace = globals.workspace()?;
    let content = read_input(&args.file)?;
    let filename = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            WopiError::Config(format!("'{}' has no file name", args.file.display()))
        })?;

    let mut spec = DocumentSpec::new(args.title.unwrap_or_else(|| filename.clone()))
        .with_id(&args.doc_id)
        .with_creator(&globals.user)
        .grant(&globals.user, Permission::ReadWrite);
    if let Some(folder) = args.folder {
        spec = spec.in_folder(folder);
    }
    for (user, permission) in args.grants {
        spec = spec.grant(user, permission);
    }
    spec = spec.blob(&args.field, &filename, content);

    let doc = workspace.repository().add_document(spec)?;
    let file_id = FileId::for_field(&doc, &args.field);

    let event = Event::new(EventAction::DocAdd, &globals.user)
        .with_file(&file_id)
        .with_details(json!({"document": doc.to_string(), "field": args.field, "name": filename}));
    if let Err(e) = workspace.event_log().append(&event) {
        eprintln!("Warning: failed to log doc_add event: {}", e);
    }

    println!("Added document {} ({})", doc, filename);
    println!("File id: {}", file_id);
    Ok(())
}

pub(super) fn cmd_doc_list(globals: &Globals) -> Result<()> {
    let repository = globals.workspace()?.repository();
    let ids = repository.document_ids()?;

    if ids.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc_id in ids {
        let Some(info) = repository.document(&doc_id)? else {
            continue;
        };
        println!("{} \"{}\" (version {})", info.doc_ref, info.title, info.version_label);
        if let Some(holder) = repository.native_lock(&info.doc_ref)? {
            println!("    Native lock: {}", holder);
        }
        for field in repository.blob_fields(&info.doc_ref)? {
            let name = repository
                .blob(&info.doc_ref, &field)?
                .map(|b| b.filename)
                .unwrap_or_default();
            println!("    {} {} -> {}", field, name, FileId::for_field(&info.doc_ref, &field));
        }
    }

    Ok(())
}

pub(super) fn cmd_file_id(globals: &Globals, args: FileIdArgs) -> Result<()> {
    let engine = globals.engine()?;
    let file_id = FileId::compute(REPOSITORY_NAME, &args.doc_id, &args.field);
    // Fails with NotFound when the document or field does not exist
    engine.resolve(&file_id)?;
    println!("{}", file_id);
    Ok(())
}

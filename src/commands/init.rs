//! Implementation of the `wopilock init` command.
//!
//! Creates `.wopilock/` under `--root` (or the current directory) with its
//! state directories and a default `config.yaml`. Idempotent: an existing
//! workspace is left as is.

use super::Globals;
use crate::error::{Result, WopiError};
use crate::events::{Event, EventAction};
use crate::workspace::Workspace;
use serde_json::json;
use std::env;

pub(super) fn cmd_init(globals: &Globals) -> Result<()> {
    let root = match &globals.root {
        Some(root) => root.clone(),
        None => env::current_dir().map_err(|e| {
            WopiError::Storage(format!("failed to get current working directory: {}", e))
        })?,
    };
    let workspace = Workspace::at(&root);
    let created = workspace.init()?;

    if created {
        let event = Event::new(EventAction::Init, &globals.user)
            .with_details(json!({"root": root.display().to_string()}));
        if let Err(e) = workspace.event_log().append(&event) {
            eprintln!("Warning: failed to log init event: {}", e);
        }
        println!("Initialized wopilock workspace.");
    } else {
        println!("wopilock workspace already initialized.");
    }
    println!();
    println!("State directory: {}", workspace.state_dir.display());
    println!("Config:          {}", workspace.config_path().display());
    println!();
    println!("Next: add a document with `wopilock doc add <doc-id> <file>`.");

    Ok(())
}

//! Lock maintenance commands: `locks list`, `locks reap`, `native-lock`.

use super::Globals;
use crate::cli::NativeLockArgs;
use crate::error::{Result, WopiError};

pub(super) fn cmd_locks_list(globals: &Globals) -> Result<()> {
    let engine = globals.engine()?;
    let records = engine.store().list()?;

    if records.is_empty() {
        println!("No locks.");
        return Ok(());
    }

    println!("Locks ({}):", records.len());
    println!();

    for record in &records {
        println!("  {}:", record.file_id);
        if let Ok(file_ref) = record.file_id.decode() {
            println!("    Document:   {}", file_ref.document);
            println!("    Field:      {}", file_ref.xpath);
        }
        println!("    Lock:       {}", record.lock);
        println!("    Owner:      {}", record.owner);
        println!("    Created:    {}", record.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("    Age:        {}", record.age_string());
        if record.is_live() {
            println!("    Expires in: {}", record.remaining_string());
        } else {
            println!("    Status:     EXPIRED");
        }
        println!();
    }

    let expired = records.iter().filter(|r| !r.is_live()).count();
    if expired > 0 {
        println!(
            "Note: {} lock(s) have expired. Use `wopilock locks reap` to purge them.",
            expired
        );
    }

    Ok(())
}

pub(super) fn cmd_locks_reap(globals: &Globals) -> Result<()> {
    let engine = globals.engine()?;
    let released = engine.reap_expired()?;

    if released.is_empty() {
        println!("No native locks released.");
    } else {
        for doc in &released {
            println!("Released native lock on {}", doc);
        }
    }
    Ok(())
}

pub(super) fn cmd_native_lock(globals: &Globals, args: NativeLockArgs) -> Result<()> {
    let engine = globals.engine()?;
    let ctx = globals.context();

    if args.release {
        if !engine.unlock_natively(&ctx, &args.doc_id, &args.owner)? {
            return Err(WopiError::conflict());
        }
        println!("Cleared native lock on {} held by {}", args.doc_id, args.owner);
    } else {
        engine.lock_natively(&ctx, &args.doc_id, &args.owner)?;
        println!("Native lock on {} held by {}", args.doc_id, args.owner);
    }
    Ok(())
}

//! File commands: one WOPI request each, printed as the host's response.

use super::{Globals, read_input, respond};
use crate::cli::{
    FileArgs, GetArgs, LockArgs, LockValueArgs, PutArgs, PutRelativeArgs, RenameArgs,
    ShareUrlArgs,
};
use crate::error::Result;
use crate::files::{Body, WopiResponse};
use crate::fs::atomic_write;
use crate::headers::{self, Operation, WopiHeaders};
use crate::identity::FileId;

fn override_headers(operation: Operation) -> WopiHeaders {
    WopiHeaders::new().with(headers::OVERRIDE, operation.as_str())
}

/// Send a `POST /files/{id}` request.
fn post(globals: &Globals, file_id: String, headers: WopiHeaders, body: &[u8]) -> Result<WopiResponse> {
    let files = globals.endpoint()?;
    respond(files.try_post(&globals.context(), &FileId::from_raw(file_id), &headers, body))
}

pub(super) fn cmd_info(globals: &Globals, args: FileArgs) -> Result<()> {
    let files = globals.endpoint()?;
    respond(files.try_check_file_info(&globals.context(), &FileId::from_raw(args.file_id)))?;
    Ok(())
}

pub(super) fn cmd_get(globals: &Globals, args: GetArgs) -> Result<()> {
    let files = globals.endpoint()?;
    let mut request = WopiHeaders::new();
    if let Some(max) = args.max_expected_size {
        request.insert(headers::MAX_EXPECTED_SIZE, max);
    }
    let file_id = FileId::from_raw(args.file_id);

    let Some(out) = args.out else {
        respond(files.try_get_file(&globals.context(), &file_id, &request))?;
        return Ok(());
    };

    let response = match files.try_get_file(&globals.context(), &file_id, &request) {
        Ok(response) => response,
        Err(err) => return respond(Err(err)).map(|_| ()),
    };
    if let Body::Bytes(bytes) = &response.body {
        atomic_write(&out, bytes)?;
        super::print_response(&WopiResponse {
            body: Body::Empty,
            ..response.clone()
        });
        println!();
        println!("Wrote {} bytes to {}", bytes.len(), out.display());
    }
    Ok(())
}

pub(super) fn cmd_lock(globals: &Globals, args: LockArgs) -> Result<()> {
    let mut request = override_headers(Operation::Lock).with(headers::LOCK, args.lock);
    if let Some(old_lock) = args.old_lock {
        request.insert(headers::OLD_LOCK, old_lock);
    }
    post(globals, args.file_id, request, &[])?;
    Ok(())
}

pub(super) fn cmd_unlock(globals: &Globals, args: LockValueArgs) -> Result<()> {
    let request = override_headers(Operation::Unlock).with(headers::LOCK, args.lock);
    post(globals, args.file_id, request, &[])?;
    Ok(())
}

pub(super) fn cmd_refresh(globals: &Globals, args: LockValueArgs) -> Result<()> {
    let request = override_headers(Operation::RefreshLock).with(headers::LOCK, args.lock);
    post(globals, args.file_id, request, &[])?;
    Ok(())
}

pub(super) fn cmd_get_lock(globals: &Globals, args: FileArgs) -> Result<()> {
    post(globals, args.file_id, override_headers(Operation::GetLock), &[])?;
    Ok(())
}

pub(super) fn cmd_put(globals: &Globals, args: PutArgs) -> Result<()> {
    let content = read_input(&args.input)?;
    let mut request = override_headers(Operation::Put);
    if let Some(lock) = args.lock {
        request.insert(headers::LOCK, lock);
    }
    let files = globals.endpoint()?;
    respond(files.try_post_contents(
        &globals.context(),
        &FileId::from_raw(args.file_id),
        &request,
        &content,
    ))?;
    Ok(())
}

pub(super) fn cmd_rename(globals: &Globals, args: RenameArgs) -> Result<()> {
    let mut request =
        override_headers(Operation::RenameFile).with(headers::REQUESTED_NAME, encode_utf7(&args.name));
    if let Some(lock) = args.lock {
        request.insert(headers::LOCK, lock);
    }
    post(globals, args.file_id, request, &[])?;
    Ok(())
}

pub(super) fn cmd_put_relative(globals: &Globals, args: PutRelativeArgs) -> Result<()> {
    let content = read_input(&args.input)?;
    let mut request = override_headers(Operation::PutRelative);
    if let Some(suggested) = &args.suggested {
        request.insert(headers::SUGGESTED_TARGET, encode_utf7(suggested));
    }
    if let Some(relative) = &args.relative {
        request.insert(headers::RELATIVE_TARGET, encode_utf7(relative));
    }
    if args.convert {
        request.insert(headers::FILE_CONVERSION, "True");
    }
    if let Some(lock) = args.lock {
        request.insert(headers::LOCK, lock);
    }
    post(globals, args.file_id, request, &content)?;
    Ok(())
}

pub(super) fn cmd_share_url(globals: &Globals, args: ShareUrlArgs) -> Result<()> {
    let request = override_headers(Operation::GetShareUrl).with(headers::URL_TYPE, args.url_type);
    post(globals, args.file_id, request, &[])?;
    Ok(())
}

/// Encode a name for a UTF-7 header. Printable ASCII other than `+` passes
/// through; everything else goes in a shifted base64 run of UTF-16.
fn encode_utf7(value: &str) -> String {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD_NO_PAD;

    let direct = |c: char| (' '..='~').contains(&c) && c != '+' && c != '\\';
    let mut out = String::with_capacity(value.len());
    let mut pending: Vec<u16> = Vec::new();

    let flush = |pending: &mut Vec<u16>, out: &mut String| {
        if pending.is_empty() {
            return;
        }
        let bytes: Vec<u8> = pending.iter().flat_map(|unit| unit.to_be_bytes()).collect();
        out.push('+');
        out.push_str(&STANDARD_NO_PAD.encode(bytes));
        out.push('-');
        pending.clear();
    };

    for c in value.chars() {
        if c == '+' && pending.is_empty() {
            out.push_str("+-");
        } else if direct(c) {
            flush(&mut pending, &mut out);
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            pending.extend_from_slice(c.encode_utf16(&mut units));
        }
    }
    flush(&mut pending, &mut out);
    out
}

//! Per-document critical sections.

use crate::error::Result;
use crate::locks::acquire_section;
use crate::repository::DocumentRef;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Duration;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// How long a caller waits for another process's section.
const SECTION_WAIT_SECS: i64 = 10;

/// Age after which a section lock file is considered abandoned.
const SECTION_STALE_SECS: i64 = 60;

/// One mutex per document, created on first use.
///
/// Holding a document's section makes the lock-store transition and the
/// bridge transition for that document a single step for every other
/// caller in the process. With a sections directory, a guard file per
/// document extends that to every process sharing the directory.
#[derive(Default)]
pub(crate) struct DocumentSections {
    sections: Mutex<HashMap<DocumentRef, Arc<Mutex<()>>>>,
    dir: Option<PathBuf>,
}

impl DocumentSections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sections that also take `<dir>/<document>.section`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            sections: Mutex::default(),
            dir: Some(dir.into()),
        }
    }

    /// Run `f` while holding the section of `doc`.
    pub fn run<T>(&self, doc: &DocumentRef, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let section = {
            let mut sections = self.sections.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(sections.entry(doc.clone()).or_default())
        };
        let _local = section.lock().unwrap_or_else(|e| e.into_inner());
        let _shared = match &self.dir {
            Some(dir) => Some(acquire_section(
                &dir.join(section_file_name(doc)),
                Duration::seconds(SECTION_WAIT_SECS),
                Duration::seconds(SECTION_STALE_SECS),
            )?),
            None => None,
        };
        f()
    }
}

fn section_file_name(doc: &DocumentRef) -> String {
    let key = format!("{}:{}", doc.repository, doc.doc_id);
    format!("{}.section", URL_SAFE_NO_PAD.encode(key))
}

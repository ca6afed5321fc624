//! Destination naming for received files.
//!
//! The sender's identifier is a path in whatever convention its platform
//! uses. Only the final segment is kept, and the destination file is
//! `<connection id>_<name>` created with create-new semantics, so two
//! connections never share a file even when accepted in the same instant.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};

use ferry_core::TransferError;

/// Name used when the identifier has no usable final segment.
pub const FALLBACK_NAME: &str = "unnamed";

/// Extra suffixes tried when a destination already exists on disk.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Final path segment of `identifier`, split on both `/` and `\`.
///
/// Characters that are invalid in file names on common platforms become
/// `_`; control characters are dropped.
pub fn base_name(identifier: &str) -> String {
    let last = identifier
        .rsplit(['/', '\\'])
        .find(|segment| !segment.trim().is_empty())
        .unwrap_or("");

    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();

    match cleaned.trim() {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        name => name.to_string(),
    }
}

/// Create a fresh destination file for connection `conn_id`.
///
/// Never opens an existing file. If `<id>_<name>` is taken (left over from
/// an earlier run), `<id>-<n>_<name>` is tried instead.
pub async fn create_destination(
    dir: &Path,
    conn_id: u64,
    name: &str,
) -> Result<(PathBuf, File), TransferError> {
    let mut attempt = 0u32;
    loop {
        let file_name = if attempt == 0 {
            format!("{conn_id}_{name}")
        } else {
            format!("{conn_id}-{attempt}_{name}")
        };
        let path = dir.join(file_name);

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                tracing::debug!(path = %path.display(), "destination exists, trying next suffix");
                attempt += 1;
            }
            Err(e) => return Err(TransferError::Storage { path, source: e }),
        }
    }
}

//! Durable read/write of the document file.
//!
//! A write serializes into a sibling temp file, fsyncs it, then renames it
//! over the destination. Readers of `path` therefore see either the previous
//! complete document or the new one, never a truncated file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::document::Document;
use crate::error::{Result, StoreError};

/// Serialized form written to disk: two-space indented JSON plus newline
pub fn to_bytes(doc: &Document) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(doc)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Read and parse the document.
///
/// `Ok(None)` when the file does not exist; [`StoreError::Corrupt`] when it
/// exists but is not a valid document.
pub fn read(path: &Path) -> Result<Option<Document>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Atomically replace `path` with `doc`
pub fn write(path: &Path, doc: &Document) -> Result<()> {
    stage(path, doc)?.commit()
}

/// First half of [`write`]: the new content is durable in a temp file next
/// to `path`, but `path` itself is untouched until [`StagedWrite::commit`].
///
/// Dropping a `StagedWrite` without committing removes the temp file and
/// leaves the destination as it was.
pub fn stage(path: &Path, doc: &Document) -> Result<StagedWrite> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(dir)?;

    temp.write_all(&to_bytes(doc)?)?;
    temp.as_file().sync_all()?;

    // Keep the mode of the file we replace; other processes may depend on it.
    if let Ok(meta) = fs::metadata(path) {
        temp.as_file().set_permissions(meta.permissions())?;
    }

    Ok(StagedWrite {
        temp,
        target: path.to_path_buf(),
    })
}

/// A fully written, fsynced temp file waiting to be renamed into place
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Rename over the destination and sync the directory entry
    pub fn commit(self) -> Result<()> {
        let dir = parent_dir(&self.target).to_path_buf();
        self.temp
            .persist(&self.target)
            .map_err(|e| StoreError::Io(e.error))?;

        #[cfg(unix)]
        {
            if let Ok(dir) = fs::File::open(&dir) {
                let _ = dir.sync_all();
            }
        }
        #[cfg(not(unix))]
        let _ = dir;

        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

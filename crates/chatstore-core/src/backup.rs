//! Pre-mutation backups.
//!
//! A snapshot copies the durable document file into the backup directory as
//! `<file>.bak.<YYYYMMDDTHHMMSSZ>`, with an optional `<backup>.note.txt`
//! sidecar. Files are created with create-new semantics and are never
//! overwritten or removed here. Two snapshots in the same second get a
//! `-1`, `-2`, ... suffix.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, ResultExt};
use crate::types::{compact_utc, now, Timestamp};

/// Suffix of the note sidecar file
pub const NOTE_SUFFIX: &str = ".note.txt";

const MAX_COLLISION_SUFFIX: u32 = 10_000;

/// A backup that was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub note_path: Option<PathBuf>,
    pub created_at: Timestamp,
}

/// Writes immutable copies of the document file
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `source` into a new timestamped backup; write `note` next to it
    /// when non-empty.
    pub fn snapshot(&self, source: &Path, note: &str) -> Result<BackupRecord> {
        let created_at = now();
        let base = format!("{}.bak.{}", file_name(source), compact_utc(created_at));
        let path = self
            .copy_new(source, &base)
            .with_context(|| format!("backing up {}", source.display()))?;

        let note_path = if note.is_empty() {
            None
        } else {
            let mut os = path.clone().into_os_string();
            os.push(NOTE_SUFFIX);
            let note_path = PathBuf::from(os);
            fs::write(&note_path, note)
                .with_context(|| format!("writing backup note {}", note_path.display()))?;
            Some(note_path)
        };

        tracing::info!(backup = %path.display(), "backup written");
        Ok(BackupRecord {
            path,
            note_path,
            created_at,
        })
    }

    /// Keep a copy of an unreadable document before it gets replaced
    pub fn quarantine(&self, source: &Path) -> Result<PathBuf> {
        let base = format!("{}.corrupt.{}", file_name(source), compact_utc(now()));
        self.copy_new(source, &base)
            .with_context(|| format!("quarantining {}", source.display()))
    }

    fn copy_new(&self, source: &Path, base: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let mut input = File::open(source)?;

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                base.to_string()
            } else {
                format!("{base}-{attempt}")
            };
            let dest = self.dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&dest) {
                Ok(mut out) => {
                    io::copy(&mut input, &mut out)?;
                    out.sync_all()?;
                    return Ok(dest);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    if attempt > MAX_COLLISION_SUFFIX {
                        return Err(e.into());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

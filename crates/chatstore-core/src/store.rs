//! DocumentStore: the in-memory document, its lock, and the mutation pipeline.
//!
//! Every mutation runs under one acquisition of the document lock:
//!
//! ```text
//! validate ─▶ backup snapshot ─▶ shield raise (flush) ─▶ body ─▶ shield release (flush)
//! ```
//!
//! Validation and not-found failures return before the backup, so a rejected
//! command leaves the file byte-for-byte untouched. The autosave task takes
//! the same lock, so it never sees a half-applied mutation.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::backup::{BackupManager, BackupRecord};
use crate::config::{BackupPolicy, StoreConfig};
use crate::document::{Chat, Document, IntegrityReport};
use crate::error::{Result, ResultExt, StoreError, ValidationError};
use crate::shield::{ShieldGuard, ShieldState};
use crate::storage::{atomic, DirtyTracker};
use crate::types::Millis;
use crate::validation::{validate_contact_number, validate_username};

/// Everything guarded by the document lock
#[derive(Debug)]
pub(crate) struct StoreState {
    pub(crate) document: Document,
    pub(crate) dirty: DirtyTracker,
    data_path: PathBuf,
}

impl StoreState {
    pub(crate) fn new(document: Document, data_path: PathBuf) -> Self {
        Self {
            document,
            dirty: DirtyTracker::default(),
            data_path,
        }
    }

    /// Write the document if dirty (or always, when forced).
    ///
    /// Returns whether a write happened. On failure the dirty flag stays set
    /// so the next autosave tick retries.
    pub(crate) fn flush(&mut self, force: bool) -> Result<bool> {
        if !self.dirty.needs_flush(force) {
            return Ok(false);
        }
        self.document.touch();
        atomic::write(&self.data_path, &self.document)
            .with_context(|| format!("saving {}", self.data_path.display()))?;
        self.dirty.clear();
        tracing::debug!(path = %self.data_path.display(), force, "document flushed");
        Ok(true)
    }
}

/// How the document was obtained at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Parsed from the existing file
    Loaded,
    /// No file existed; an empty document was created and written
    Created,
    /// The file could not be parsed; an empty document replaces it in memory.
    /// The unreadable file is copied to `quarantined` when that succeeded.
    Recovered {
        reason: String,
        quarantined: Option<PathBuf>,
    },
}

/// Counts removed by [`DocumentStore::delete_user`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteUserReport {
    pub removed_users: usize,
    pub removed_chats: usize,
    pub removed_requests: usize,
}

/// Counts touched by [`DocumentStore::rename_user`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenameReport {
    pub chats_updated: usize,
    pub inboxes_renamed: usize,
    pub messages_updated: usize,
    pub requests_updated: usize,
}

/// Read-only view of a user for listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub id: Value,
    pub username: String,
    pub contact_number: Option<String>,
}

/// Read-only view of a chat for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatSummary {
    pub id: String,
    pub kind: Option<String>,
    pub participants: Vec<String>,
    pub message_count: usize,
    pub updated_at: Option<Millis>,
}

/// The single owner of the in-memory document
#[derive(Debug)]
pub struct DocumentStore {
    state: Mutex<StoreState>,
    backups: BackupManager,
    config: StoreConfig,
}

impl DocumentStore {
    /// Load the document named by `config.data_path`.
    ///
    /// A missing file is created with empty collections and written
    /// immediately. An unparseable file is quarantined into the backup
    /// directory and replaced in memory by an empty document: that is data
    /// loss, and it is reported through [`LoadOutcome::Recovered`] for the
    /// caller to surface. Other I/O errors are returned.
    pub fn open(config: StoreConfig) -> Result<(Self, LoadOutcome)> {
        let backups = BackupManager::new(&config.backup_dir);
        let path = config.data_path.clone();

        let (document, outcome) = match atomic::read(&path) {
            Ok(Some(document)) => (document, LoadOutcome::Loaded),
            Ok(None) => (Document::new(), LoadOutcome::Created),
            Err(StoreError::Corrupt { reason, .. }) => {
                let quarantined = match backups.quarantine(&path) {
                    Ok(copy) => Some(copy),
                    Err(e) => {
                        tracing::warn!(error = %e, "could not quarantine unreadable document");
                        None
                    }
                };
                tracing::error!(
                    path = %path.display(),
                    %reason,
                    "document unreadable, continuing with an empty document"
                );
                (
                    Document::new(),
                    LoadOutcome::Recovered {
                        reason,
                        quarantined,
                    },
                )
            }
            Err(e) => return Err(e.context(format!("loading {}", path.display()))),
        };

        let mut state = StoreState::new(document, path.clone());
        if outcome == LoadOutcome::Created {
            state.dirty.mark();
            match state.flush(true) {
                Ok(_) => tracing::info!(path = %path.display(), "created empty document"),
                Err(e) => tracing::warn!(error = %e, "could not write initial document"),
            }
        }

        let report = state.document.integrity_report();
        if !report.is_clean() {
            tracing::warn!(
                dangling_participants = report.dangling_participants.len(),
                dangling_senders = report.dangling_senders.len(),
                dangling_requests = report.dangling_requests.len(),
                "document references unknown usernames"
            );
        }

        Ok((
            Self {
                state: Mutex::new(state),
                backups,
                config,
            },
            outcome,
        ))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn data_path(&self) -> &Path {
        &self.config.data_path
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────

    pub fn mark_dirty(&self) {
        self.state.lock().dirty.mark();
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty.is_dirty()
    }

    /// Flush only if there are unsaved changes; returns whether it wrote
    pub fn try_save(&self) -> Result<bool> {
        self.state.lock().flush(false)
    }

    /// Flush unconditionally
    pub fn force_save(&self) -> Result<()> {
        self.state.lock().flush(true).map(|_| ())
    }

    /// Take a backup of the durable file without mutating anything
    pub fn backup(&self, note: &str) -> Result<BackupRecord> {
        let mut state = self.state.lock();
        self.snapshot_locked(&mut state, note)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    pub fn list_users(&self) -> Vec<UserSummary> {
        let state = self.state.lock();
        state
            .document
            .users
            .iter()
            .map(|u| UserSummary {
                id: u.id.clone(),
                username: u.username.clone(),
                contact_number: u.contact_number.clone(),
            })
            .collect()
    }

    pub fn list_chats(&self) -> Vec<ChatSummary> {
        let state = self.state.lock();
        state
            .document
            .chats
            .iter()
            .map(|c| ChatSummary {
                id: c.label(),
                kind: c.kind.clone(),
                participants: c.participants.clone(),
                message_count: c.messages.len(),
                updated_at: c.updated_at_millis(),
            })
            .collect()
    }

    pub fn has_user(&self, username: &str) -> bool {
        self.state.lock().document.find_user(username).is_some()
    }

    pub fn has_chat(&self, chat_id: &str) -> bool {
        self.state.lock().document.find_chat(chat_id).is_some()
    }

    /// Clone of the whole in-memory document
    pub fn document(&self) -> Document {
        self.state.lock().document.clone()
    }

    pub fn integrity_report(&self) -> IntegrityReport {
        self.state.lock().document.integrity_report()
    }

    /// Shield as currently held in memory
    pub fn shield_state(&self) -> Option<ShieldState> {
        ShieldState::from_meta(&self.state.lock().document.meta)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────

    /// Run `body` inside the backup → shield → release pipeline.
    ///
    /// If `body` fails, the document is rolled back to its state before the
    /// body ran; the shield is cleared and flushed either way.
    pub fn mutate<T, F>(&self, note: &str, body: F) -> Result<T>
    where
        F: FnOnce(&mut Document) -> Result<T>,
    {
        let mut state = self.state.lock();
        self.run_mutation(&mut state, note, body)
    }

    /// Remove a user and cascade to their chats and contact requests
    pub fn delete_user(&self, username: &str) -> Result<DeleteUserReport> {
        let mut state = self.state.lock();
        if state.document.find_user(username).is_none() {
            return Err(StoreError::UserNotFound(username.to_string()));
        }

        let note = format!("Deleting user {username}");
        let report = self.run_mutation(&mut state, &note, |doc| {
            let mut report = DeleteUserReport::default();

            let before = doc.users.len();
            doc.users.retain(|u| u.username != username);
            report.removed_users = before - doc.users.len();

            let before = doc.contact_requests.len();
            doc.contact_requests.retain(|r| !r.involves(username));
            report.removed_requests = before - doc.contact_requests.len();

            let before = doc.chats.len();
            doc.chats.retain(|c| !c.has_participant(username));
            report.removed_chats = before - doc.chats.len();

            Ok(report)
        })?;

        tracing::info!(
            username,
            removed_users = report.removed_users,
            removed_chats = report.removed_chats,
            removed_requests = report.removed_requests,
            "user deleted"
        );
        Ok(report)
    }

    /// Remove one chat by id; returns how many were removed
    pub fn delete_chat(&self, chat_id: &str) -> Result<usize> {
        let mut state = self.state.lock();
        if state.document.find_chat(chat_id).is_none() {
            return Err(StoreError::ChatNotFound(chat_id.to_string()));
        }

        let note = format!("Deleting chat {chat_id}");
        let removed = self.run_mutation(&mut state, &note, |doc| {
            let before = doc.chats.len();
            doc.chats.retain(|c| c.id != chat_id);
            Ok(before - doc.chats.len())
        })?;

        tracing::info!(chat_id, removed, "chat deleted");
        Ok(removed)
    }

    /// Rename a user everywhere the username is referenced
    pub fn rename_user(&self, old: &str, new: &str) -> Result<RenameReport> {
        validate_username(new)?;

        let mut state = self.state.lock();
        if state.document.find_user(new).is_some() {
            return Err(ValidationError::UsernameTaken(new.to_string()).into());
        }
        if state.document.find_user(old).is_none() {
            return Err(StoreError::UserNotFound(old.to_string()));
        }
        let old_inbox = Chat::inbox_id(old);
        let new_inbox = Chat::inbox_id(new);
        let moves_inbox = state
            .document
            .chats
            .iter()
            .any(|c| c.is_inbox() && c.id == old_inbox && c.has_participant(old));
        if moves_inbox && state.document.find_chat(&new_inbox).is_some() {
            return Err(ValidationError::ChatIdTaken(new_inbox).into());
        }

        let note = format!("Renaming {old} -> {new}");
        let report = self.run_mutation(&mut state, &note, |doc| {
            let mut report = RenameReport::default();

            if let Some(user) = doc.find_user_mut(old) {
                user.username = new.to_string();
            }

            for chat in &mut doc.chats {
                let mut renamed = false;
                for p in chat.participants.iter_mut().filter(|p| p.as_str() == old) {
                    *p = new.to_string();
                    renamed = true;
                }
                if renamed {
                    report.chats_updated += 1;
                    if chat.is_inbox() && chat.id == old_inbox {
                        chat.id = new_inbox.clone();
                        report.inboxes_renamed += 1;
                    }
                }

                for message in &mut chat.messages {
                    if message.sender.as_deref() == Some(old) {
                        message.sender = Some(new.to_string());
                        report.messages_updated += 1;
                    }
                }
            }

            for request in &mut doc.contact_requests {
                let mut touched = false;
                for side in [&mut request.from, &mut request.to] {
                    if side.as_deref() == Some(old) {
                        *side = Some(new.to_string());
                        touched = true;
                    }
                }
                if touched {
                    report.requests_updated += 1;
                }
            }

            Ok(report)
        })?;

        tracing::info!(old, new, ?report, "user renamed");
        Ok(report)
    }

    /// Assign a new contact number; returns the previous one
    pub fn change_contact_number(
        &self,
        username: &str,
        new_contact: &str,
    ) -> Result<Option<String>> {
        validate_contact_number(new_contact)?;

        let mut state = self.state.lock();
        if state.document.find_user(username).is_none() {
            return Err(StoreError::UserNotFound(username.to_string()));
        }
        let taken = state.document.users.iter().any(|u| {
            u.username != username && u.contact_number.as_deref() == Some(new_contact)
        });
        if taken {
            return Err(ValidationError::ContactNumberTaken(new_contact.to_string()).into());
        }

        let note = format!("Changing contact number for {username} -> {new_contact}");
        let previous = self.run_mutation(&mut state, &note, |doc| {
            let user = doc
                .find_user_mut(username)
                .ok_or_else(|| StoreError::UserNotFound(username.to_string()))?;
            Ok(user.set_contact_number(new_contact))
        })?;

        tracing::info!(username, new_contact, "contact number changed");
        Ok(previous)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn snapshot_locked(&self, state: &mut StoreState, note: &str) -> Result<BackupRecord> {
        if !state.data_path.exists() {
            state.flush(true)?;
        }
        self.backups.snapshot(&state.data_path, note)
    }

    fn run_mutation<T, F>(&self, state: &mut StoreState, note: &str, body: F) -> Result<T>
    where
        F: FnOnce(&mut Document) -> Result<T>,
    {
        if let Err(e) = self.snapshot_locked(state, note) {
            match self.config.backup_policy {
                BackupPolicy::Required => {
                    return Err(StoreError::Backup {
                        source: Box::new(e),
                    })
                }
                BackupPolicy::BestEffort => {
                    tracing::warn!(error = %e, "backup failed, continuing with mutation");
                }
            }
        }

        let mut guard = ShieldGuard::raise(state, &self.config.actor)?;
        let before = guard.document().clone();

        match body(guard.document()) {
            Ok(value) => {
                guard
                    .release()
                    .context("change applied in memory but not yet saved")?;
                Ok(value)
            }
            Err(e) => {
                *guard.document() = before;
                if let Err(release_err) = guard.release() {
                    tracing::error!(error = %release_err, "failed to flush shield release");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded_store(dir: &Path) -> DocumentStore {
        let path = dir.join("data.json");
        std::fs::write(
            &path,
            serde_json::to_vec_pretty(&json!({
                "users": [
                    {"id": 1, "username": "alice", "contactNumber": "C-000001"},
                    {"id": 2, "username": "bob", "contactNumber": "C-000002"}
                ],
                "chats": [
                    {"id": "C1", "type": "direct", "participants": ["alice", "bob"],
                     "messages": [{"sender": "alice", "text": "hi"}, {"sender": "bob", "text": "yo"}]},
                    {"id": "inbox-alice", "type": "inbox", "participants": ["alice"], "messages": []},
                    {"id": "C2", "type": "direct", "participants": ["bob"], "messages": []}
                ],
                "contactRequests": [
                    {"from": "alice", "to": "bob", "status": "pending"},
                    {"from": "carol", "to": "bob"}
                ],
                "meta": {"lastModified": 1}
            }))
            .unwrap(),
        )
        .unwrap();

        let config = StoreConfig::new()
            .with_data_path(path)
            .with_backup_dir(dir.join("backups"));
        let (store, outcome) = DocumentStore::open(config).unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded);
        store
    }

    #[test]
    fn test_open_missing_file_writes_through() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sub").join("data.json");
        let config = StoreConfig::new()
            .with_data_path(&path)
            .with_backup_dir(tmp.path().join("backups"));

        let (store, outcome) = DocumentStore::open(config).unwrap();
        assert_eq!(outcome, LoadOutcome::Created);
        assert!(path.exists());
        assert!(!store.is_dirty());

        let on_disk = atomic::read(&path).unwrap().unwrap();
        assert!(on_disk.users.is_empty());
        assert!(on_disk.last_modified().is_some());
    }

    #[test]
    fn test_delete_user_reports_cascade_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());

        let report = store.delete_user("alice").unwrap();
        assert_eq!(
            report,
            DeleteUserReport {
                removed_users: 1,
                removed_chats: 2,
                removed_requests: 1
            }
        );

        let doc = store.document();
        assert!(doc.find_chat("C1").is_none());
        assert!(doc.find_chat("C2").is_some());
        assert_eq!(doc.contact_requests.len(), 1);
    }

    #[test]
    fn test_delete_chat_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());

        assert!(matches!(
            store.delete_chat("missing"),
            Err(StoreError::ChatNotFound(id)) if id == "missing"
        ));
        assert_eq!(store.delete_chat("C2").unwrap(), 1);
    }

    #[test]
    fn test_rename_report_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());

        let report = store.rename_user("alice", "alice2").unwrap();
        assert_eq!(
            report,
            RenameReport {
                chats_updated: 2,
                inboxes_renamed: 1,
                messages_updated: 1,
                requests_updated: 1
            }
        );
    }

    #[test]
    fn test_rename_refuses_to_duplicate_inbox_id() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());
        store
            .mutate("leftover inbox", |doc| {
                doc.chats.push(Chat {
                    id: Chat::inbox_id("alice2"),
                    kind: Some("inbox".into()),
                    participants: vec!["ghost".into()],
                    ..Default::default()
                });
                Ok(())
            })
            .unwrap();

        let err = store.rename_user("alice", "alice2").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::ChatIdTaken(ref id)) if id == "inbox-alice2"
        ));
        assert!(store.has_user("alice"));
        assert!(store.has_chat("inbox-alice"));

        // bob has no inbox to move, so the same target name is allowed.
        store.rename_user("bob", "alice2").unwrap();
        let doc = store.document();
        let inboxes = doc.chats.iter().filter(|c| c.id == "inbox-alice2").count();
        assert_eq!(inboxes, 1);
    }

    #[test]
    fn test_change_contact_allows_own_number() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());

        let previous = store.change_contact_number("alice", "C-000001").unwrap();
        assert_eq!(previous.as_deref(), Some("C-000001"));
    }

    #[test]
    fn test_failed_body_rolls_back_document() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());
        let before = store.document();

        let result: Result<()> = store.mutate("partial", |doc| {
            doc.users.clear();
            Err(StoreError::UserNotFound("boom".into()))
        });
        assert!(result.is_err());

        let after = store.document();
        assert_eq!(after.users, before.users);
        assert!(store.shield_state().is_none());
    }

    #[test]
    fn test_try_save_only_when_dirty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = seeded_store(tmp.path());

        assert!(!store.try_save().unwrap());
        store.mark_dirty();
        assert!(store.try_save().unwrap());
        assert!(!store.is_dirty());
    }
}

//! Chatstore Core - the document store behind the chat admin tool
//!
//! The chat application keeps all of its state (users, chats, contact
//! requests, metadata) in one JSON file. This crate lets an operator inspect
//! and mutate that file while the application keeps running against it.
//!
//! # Architecture
//!
//! 1. **AtomicFileStore** (`storage::atomic`): temp-file + fsync + rename writes
//! 2. **DirtyTracker** (`storage::dirty`, `storage::autosave`): unsaved-changes flag and 1s autosave
//! 3. **BackupManager** (`backup`): timestamped, never-overwritten copies before every mutation
//! 4. **ShieldSignal** (`shield`): advisory `meta.shield_disabled` flag visible to other processes
//! 5. **DocumentStore** (`store`): the lock, the document, and the mutation operations
//!
//! # Quick Start
//!
//! ```no_run
//! use chatstore_core::{DocumentStore, LoadOutcome, StoreConfig};
//!
//! # fn example() -> chatstore_core::Result<()> {
//! let config = StoreConfig::new()
//!     .with_data_path("data.json")
//!     .with_backup_dir("backups");
//!
//! let (store, outcome) = DocumentStore::open(config)?;
//! if let LoadOutcome::Recovered { reason, .. } = &outcome {
//!     eprintln!("data.json was unreadable ({reason}); starting empty");
//! }
//!
//! let report = store.delete_user("alice")?;
//! println!("removed {} chats", report.removed_chats);
//!
//! store.rename_user("bob", "robert")?;
//! store.force_save()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Limits
//!
//! - Single writer process. The file is not locked; the shield flag is a
//!   cooperative signal, not a lock.
//! - Referential integrity is soft. Cascades maintain it, nothing enforces
//!   it; see [`Document::integrity_report`].

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod backup;
pub mod config;
pub mod document;
pub mod error;
pub mod shield;
pub mod storage;
pub mod store;
pub mod types;
pub mod validation;

// Re-export commonly used types for convenience
pub use backup::{BackupManager, BackupRecord};
pub use config::{BackupPolicy, StoreConfig};
pub use document::{Chat, ContactRequest, Document, IntegrityReport, Message, User};
pub use error::{Result, ResultExt, StoreError, ValidationError};
pub use shield::{probe, ShieldState};
pub use storage::{spawn_autosave, AutosaveHandle};
pub use store::{
    ChatSummary, DeleteUserReport, DocumentStore, LoadOutcome, RenameReport, UserSummary,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default document path
pub const DEFAULT_DATA_PATH: &str = "data.json";

/// Default backup directory
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Default autosave period
pub const DEFAULT_AUTOSAVE_INTERVAL_MS: u64 = 1000;

/// Default value for `meta.shield_disabled_by`
pub const DEFAULT_ACTOR: &str = "admin_tool";

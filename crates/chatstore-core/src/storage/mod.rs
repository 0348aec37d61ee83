//! Persistence layer: a single JSON file
//!
//! Durability rests on two things only: the atomic temp-file-plus-rename
//! write in [`atomic`], and the in-process document lock held by
//! [`crate::DocumentStore`]. The file itself is never locked, so this layer
//! assumes one writer process.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    DocumentStore                     │
//! ├──────────────────────────────────────────────────────┤
//! │  mutation ──▶ DirtyTracker.mark ◀── autosave tick    │
//! │                      │                               │
//! │                      ▼                               │
//! │        atomic::write (tmp ─▶ fsync ─▶ rename)        │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod atomic;
pub mod autosave;
pub mod dirty;

pub use autosave::{spawn_autosave, AutosaveHandle};
pub use dirty::DirtyTracker;

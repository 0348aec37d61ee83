//! Cooperative "admin override in progress" signal.
//!
//! While an administrative mutation runs, `meta` carries
//! `shield_disabled = true`, `shield_disabled_by` and `shield_disabled_at`.
//! Both transitions are flushed to disk immediately, so a process polling
//! the file (see [`probe`]) sees the flag for exactly the duration of the
//! mutation.
//!
//! This is advisory. It only works if every process sharing the file honors
//! it, and it assumes a single writer process.
//!
//! [`ShieldGuard`] is the scoped form: raising it sets and flushes the flag,
//! and the flag is cleared and flushed again when the guard is released or
//! dropped, including on an error return or a panic in the mutation body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::document::{Document, LAST_MODIFIED};
use crate::error::Result;
use crate::storage::atomic;
use crate::store::StoreState;
use crate::types::{now_millis, Millis};

pub const SHIELD_DISABLED: &str = "shield_disabled";
pub const SHIELD_DISABLED_BY: &str = "shield_disabled_by";
pub const SHIELD_DISABLED_AT: &str = "shield_disabled_at";

/// Every key the shield owns in `meta`
pub const SHIELD_KEYS: [&str; 3] = [SHIELD_DISABLED, SHIELD_DISABLED_BY, SHIELD_DISABLED_AT];

/// An active shield as seen in `meta`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldState {
    pub disabled_by: Option<String>,
    pub disabled_at: Option<Millis>,
}

impl ShieldState {
    /// `Some` only when `meta.shield_disabled` is `true`
    pub fn from_meta(meta: &Map<String, Value>) -> Option<Self> {
        if meta.get(SHIELD_DISABLED).and_then(Value::as_bool) != Some(true) {
            return None;
        }
        Some(Self {
            disabled_by: meta
                .get(SHIELD_DISABLED_BY)
                .and_then(Value::as_str)
                .map(str::to_string),
            disabled_at: meta.get(SHIELD_DISABLED_AT).and_then(Value::as_i64),
        })
    }
}

/// Read the durable file the way a cooperating process would.
///
/// `Ok(None)` when no override is in progress or the file does not exist.
pub fn probe(path: &Path) -> Result<Option<ShieldState>> {
    Ok(atomic::read(path)?.and_then(|doc| ShieldState::from_meta(&doc.meta)))
}

/// Scoped shield over a locked store state
pub struct ShieldGuard<'a> {
    state: &'a mut StoreState,
    previous_meta: Map<String, Value>,
    released: bool,
}

impl<'a> ShieldGuard<'a> {
    /// Set the shield fields and flush them before returning.
    ///
    /// If the flush fails the guard is dropped on the way out, which clears
    /// the fields again.
    pub(crate) fn raise(state: &'a mut StoreState, actor: &str) -> Result<Self> {
        let previous_meta = state.document.meta.clone();

        let meta = &mut state.document.meta;
        meta.insert(SHIELD_DISABLED.to_string(), Value::Bool(true));
        meta.insert(SHIELD_DISABLED_BY.to_string(), Value::from(actor));
        meta.insert(SHIELD_DISABLED_AT.to_string(), Value::from(now_millis()));
        state.dirty.mark();

        let guard = Self {
            state,
            previous_meta,
            released: false,
        };
        guard.state.flush(true)?;
        tracing::info!(actor, "shield raised");
        Ok(guard)
    }

    /// The document under mutation
    pub fn document(&mut self) -> &mut Document {
        &mut self.state.document
    }

    /// Clear the shield and report whether the final flush succeeded
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.restore()
    }

    fn restore(&mut self) -> Result<()> {
        let meta = &mut self.state.document.meta;
        for key in SHIELD_KEYS {
            meta.shift_remove(key);
        }
        // Replay only the snapshot's own keys; keys added by the body stay.
        for (key, value) in &self.previous_meta {
            if SHIELD_KEYS.contains(&key.as_str()) || key == LAST_MODIFIED {
                continue;
            }
            meta.insert(key.clone(), value.clone());
        }

        self.state.document.touch();
        self.state.dirty.mark();
        self.state.flush(true)?;
        tracing::info!("shield released");
        Ok(())
    }
}

impl Drop for ShieldGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.restore() {
            tracing::error!(error = %e, "failed to flush shield release");
        }
    }
}

impl std::fmt::Debug for ShieldGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShieldGuard")
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

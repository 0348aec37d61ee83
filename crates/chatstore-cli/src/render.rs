//! Plain-text rendering of store data for the terminal.
//!
//! Everything here returns `String`s without color so the menu can be
//! driven from tests; `main` adds color at the edges.

use chatstore_core::types::{iso_from_millis, Millis};
use chatstore_core::{
    ChatSummary, DeleteUserReport, IntegrityReport, RenameReport, ShieldState, StoreError,
    UserSummary, ValidationError,
};
use serde_json::Value;

fn id_text(id: &Value) -> String {
    match id {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn user_line(user: &UserSummary) -> String {
    format!(
        "- {} (id={}, contact={})",
        user.username,
        id_text(&user.id),
        user.contact_number.as_deref().unwrap_or("-")
    )
}

/// ISO time when the value is a representable instant, otherwise the raw number
pub fn updated_at(ms: Option<Millis>) -> String {
    match ms {
        None => "-".to_string(),
        Some(ms) => iso_from_millis(ms).unwrap_or_else(|| ms.to_string()),
    }
}

pub fn chat_line(chat: &ChatSummary) -> String {
    format!(
        "- {} [{}] participants=({}) messages={} updatedAt={}",
        chat.id,
        chat.kind.as_deref().unwrap_or("?"),
        chat.participants.join(", "),
        chat.message_count,
        updated_at(chat.updated_at)
    )
}

pub fn delete_user_summary(username: &str, report: &DeleteUserReport) -> String {
    format!(
        "Deleted user '{}'. Removed {} chat(s) and {} contact request(s).",
        username, report.removed_chats, report.removed_requests
    )
}

pub fn rename_summary(old: &str, new: &str, report: &RenameReport) -> String {
    format!(
        "Renamed '{}' -> '{}'. Updated {} chat(s), {} message(s), {} contact request(s).",
        old, new, report.chats_updated, report.messages_updated, report.requests_updated
    )
}

pub fn shield_line(state: Option<&ShieldState>) -> String {
    match state {
        None => "No admin override in progress.".to_string(),
        Some(state) => format!(
            "Admin override in progress by {} since {}.",
            state.disabled_by.as_deref().unwrap_or("unknown"),
            updated_at(state.disabled_at)
        ),
    }
}

pub fn integrity_lines(report: &IntegrityReport) -> Vec<String> {
    if report.is_clean() {
        return vec!["All username references resolve.".to_string()];
    }

    let mut lines = vec![format!("{} dangling reference(s):", report.total())];
    for (chat, user) in &report.dangling_participants {
        lines.push(format!("  chat {chat}: participant '{user}' has no user record"));
    }
    for (chat, user) in &report.dangling_senders {
        lines.push(format!("  chat {chat}: sender '{user}' has no user record"));
    }
    for (index, user) in &report.dangling_requests {
        lines.push(format!("  contact request #{index}: '{user}' has no user record"));
    }
    lines
}

/// Operator-facing message for a failed command
pub fn error_message(err: &StoreError) -> String {
    match err.root() {
        StoreError::UserNotFound(name) => format!("User not found: {name}"),
        StoreError::ChatNotFound(id) => format!("Chat not found: {id}"),
        StoreError::Validation(ValidationError::InvalidUsername(_)) => {
            "New username contains invalid characters or length.".to_string()
        }
        StoreError::Validation(ValidationError::UsernameTaken(_)) => {
            "Target username already exists.".to_string()
        }
        StoreError::Validation(ValidationError::InvalidContactNumber(_)) => {
            "Contact number must be in format C-123456.".to_string()
        }
        StoreError::Validation(ValidationError::ContactNumberTaken(_)) => {
            "Contact number already in use.".to_string()
        }
        StoreError::Validation(ValidationError::ChatIdTaken(id)) => {
            format!("A chat with id '{id}' already exists; the inbox cannot be renamed.")
        }
        _ => format!("Operation failed: {err}"),
    }
}

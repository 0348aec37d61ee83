//! The persisted document: users, chats, contact requests and metadata.
//!
//! Every record keeps the fields it does not know about in a flattened
//! `extra` map, so a load/save cycle never drops data written by the chat
//! application itself.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::types::{next_stamp, Millis};

/// `meta` key holding the last modification stamp
pub const LAST_MODIFIED: &str = "lastModified";

const CONTACT_NUMBER: &str = "contactNumber";
const UPDATED_AT: &str = "updatedAt";

/// Chat type tag reserved for per-user inboxes
pub const INBOX_TYPE: &str = "inbox";

/// Whole persisted state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub users: Vec<User>,

    #[serde(default)]
    pub chats: Vec<Chat>,

    #[serde(default)]
    pub contact_requests: Vec<ContactRequest>,

    #[serde(default)]
    pub meta: Map<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Records are read leniently. A field the store interprets is lifted into
// its typed slot only when its JSON type fits; otherwise it stays in `extra`
// and is written back verbatim. A record is never rejected for the shape of
// a field, so an odd value written by the chat application cannot make the
// whole document unreadable.

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct User {
    /// Whatever the chat application uses as a primary key (string or number)
    pub id: Value,

    /// Empty when the record has no string username
    pub username: String,

    pub contact_number: Option<String>,

    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Chat {
    /// Empty when the record has no string id
    pub id: String,

    /// The `type` field
    pub kind: Option<String>,

    pub participants: Vec<String>,

    pub messages: Vec<Message>,

    pub updated_at: Option<Millis>,

    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Message {
    pub sender: Option<String>,

    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct ContactRequest {
    pub from: Option<String>,

    pub to: Option<String>,

    pub extra: Map<String, Value>,
}

/// Move `key` out of `fields` when its value has the shape `T` expects.
///
/// Anything else, `null` included, is left in `fields`.
fn take<T: DeserializeOwned>(fields: &mut Map<String, Value>, key: &str) -> Option<T> {
    let parsed = match fields.get(key) {
        None | Some(Value::Null) => return None,
        Some(value) => T::deserialize(value).ok()?,
    };
    fields.shift_remove(key);
    Some(parsed)
}

/// Typed fields first, then every untouched raw field not shadowed by one
fn merge(mut fields: Map<String, Value>, extra: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in extra {
        fields.entry(key).or_insert(value);
    }
    fields
}

impl From<Map<String, Value>> for User {
    fn from(mut extra: Map<String, Value>) -> Self {
        Self {
            id: take(&mut extra, "id").unwrap_or(Value::Null),
            username: take(&mut extra, "username").unwrap_or_default(),
            contact_number: take(&mut extra, CONTACT_NUMBER),
            extra,
        }
    }
}

impl From<User> for Map<String, Value> {
    fn from(user: User) -> Self {
        let mut fields = Map::new();
        if !user.id.is_null() {
            fields.insert("id".into(), user.id);
        }
        if !user.username.is_empty() {
            fields.insert("username".into(), user.username.into());
        }
        if let Some(contact) = user.contact_number {
            fields.insert(CONTACT_NUMBER.into(), contact.into());
        }
        merge(fields, user.extra)
    }
}

impl From<Map<String, Value>> for Chat {
    fn from(mut extra: Map<String, Value>) -> Self {
        Self {
            id: take(&mut extra, "id").unwrap_or_default(),
            kind: take(&mut extra, "type"),
            participants: take(&mut extra, "participants").unwrap_or_default(),
            messages: take(&mut extra, "messages").unwrap_or_default(),
            updated_at: take(&mut extra, UPDATED_AT),
            extra,
        }
    }
}

impl From<Chat> for Map<String, Value> {
    fn from(chat: Chat) -> Self {
        let mut fields = Map::new();
        if !chat.id.is_empty() {
            fields.insert("id".into(), chat.id.into());
        }
        if let Some(kind) = chat.kind {
            fields.insert("type".into(), kind.into());
        }
        // Collections default to `[]`, unless a raw value is being kept.
        if !chat.participants.is_empty() || !chat.extra.contains_key("participants") {
            fields.insert("participants".into(), chat.participants.into());
        }
        if !chat.messages.is_empty() || !chat.extra.contains_key("messages") {
            let messages = chat
                .messages
                .into_iter()
                .map(|m| Value::Object(m.into()))
                .collect();
            fields.insert("messages".into(), Value::Array(messages));
        }
        if let Some(ts) = chat.updated_at {
            fields.insert(UPDATED_AT.into(), ts.into());
        }
        merge(fields, chat.extra)
    }
}

impl From<Map<String, Value>> for Message {
    fn from(mut extra: Map<String, Value>) -> Self {
        Self {
            sender: take(&mut extra, "sender"),
            extra,
        }
    }
}

impl From<Message> for Map<String, Value> {
    fn from(message: Message) -> Self {
        let mut fields = Map::new();
        if let Some(sender) = message.sender {
            fields.insert("sender".into(), sender.into());
        }
        merge(fields, message.extra)
    }
}

impl From<Map<String, Value>> for ContactRequest {
    fn from(mut extra: Map<String, Value>) -> Self {
        Self {
            from: take(&mut extra, "from"),
            to: take(&mut extra, "to"),
            extra,
        }
    }
}

impl From<ContactRequest> for Map<String, Value> {
    fn from(request: ContactRequest) -> Self {
        let mut fields = Map::new();
        if let Some(from) = request.from {
            fields.insert("from".into(), from.into());
        }
        if let Some(to) = request.to {
            fields.insert("to".into(), to.into());
        }
        merge(fields, request.extra)
    }
}

impl Chat {
    /// Id of the inbox chat owned by `username`
    pub fn inbox_id(username: &str) -> String {
        format!("inbox-{username}")
    }

    pub fn is_inbox(&self) -> bool {
        self.kind.as_deref() == Some(INBOX_TYPE)
    }

    pub fn has_participant(&self, username: &str) -> bool {
        self.participants.iter().any(|p| p == username)
    }

    /// The id as shown to an operator, raw JSON when it is not a string
    pub fn label(&self) -> String {
        match self.extra.get("id") {
            Some(raw) if self.id.is_empty() => raw.to_string(),
            _ => self.id.clone(),
        }
    }

    /// `updatedAt` in whole milliseconds, fractional values truncated
    pub fn updated_at_millis(&self) -> Option<Millis> {
        self.updated_at.or_else(|| {
            self.extra
                .get(UPDATED_AT)
                .and_then(Value::as_f64)
                .filter(|ms| ms.is_finite())
                .map(|ms| ms as Millis)
        })
    }
}

impl User {
    /// Assign a contact number; returns the previous string value
    pub fn set_contact_number(&mut self, contact: &str) -> Option<String> {
        self.extra.shift_remove(CONTACT_NUMBER);
        self.contact_number.replace(contact.to_string())
    }
}

impl ContactRequest {
    pub fn involves(&self, username: &str) -> bool {
        self.from.as_deref() == Some(username) || self.to.as_deref() == Some(username)
    }
}

impl Document {
    /// Empty collections, `meta.lastModified` stamped now
    pub fn new() -> Self {
        let mut doc = Self::default();
        doc.touch();
        doc
    }

    // Records without a string username or id never match a lookup.

    pub fn find_user(&self, username: &str) -> Option<&User> {
        if username.is_empty() {
            return None;
        }
        self.users.iter().find(|u| u.username == username)
    }

    pub fn find_user_mut(&mut self, username: &str) -> Option<&mut User> {
        if username.is_empty() {
            return None;
        }
        self.users.iter_mut().find(|u| u.username == username)
    }

    pub fn find_chat(&self, chat_id: &str) -> Option<&Chat> {
        if chat_id.is_empty() {
            return None;
        }
        self.chats.iter().find(|c| c.id == chat_id)
    }

    pub fn last_modified(&self) -> Option<Millis> {
        self.meta.get(LAST_MODIFIED).and_then(Value::as_i64)
    }

    /// Advance `meta.lastModified`; returns the new stamp
    pub fn touch(&mut self) -> Millis {
        let stamp = next_stamp(self.last_modified());
        self.meta.insert(LAST_MODIFIED.to_string(), Value::from(stamp));
        stamp
    }

    /// References that point at usernames not present in `users`.
    ///
    /// Integrity is soft: cascades keep it, nothing enforces it. This only
    /// reports.
    pub fn integrity_report(&self) -> IntegrityReport {
        let known: BTreeSet<&str> = self.users.iter().map(|u| u.username.as_str()).collect();
        let mut report = IntegrityReport::default();

        for chat in &self.chats {
            for p in &chat.participants {
                if !known.contains(p.as_str()) {
                    report.dangling_participants.push((chat.id.clone(), p.clone()));
                }
            }
            for sender in chat.messages.iter().filter_map(|m| m.sender.as_deref()) {
                if !known.contains(sender) {
                    report
                        .dangling_senders
                        .push((chat.id.clone(), sender.to_string()));
                }
            }
        }

        for (idx, req) in self.contact_requests.iter().enumerate() {
            for name in [req.from.as_deref(), req.to.as_deref()].into_iter().flatten() {
                if !known.contains(name) {
                    report.dangling_requests.push((idx, name.to_string()));
                }
            }
        }

        report.dangling_senders.sort();
        report.dangling_senders.dedup();
        report
    }
}

/// Result of [`Document::integrity_report`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// `(chat id, username)`
    pub dangling_participants: Vec<(String, String)>,
    /// `(chat id, username)`, deduplicated
    pub dangling_senders: Vec<(String, String)>,
    /// `(index into contactRequests, username)`
    pub dangling_requests: Vec<(usize, String)>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.dangling_participants.is_empty()
            && self.dangling_senders.is_empty()
            && self.dangling_requests.is_empty()
    }

    pub fn total(&self) -> usize {
        self.dangling_participants.len() + self.dangling_senders.len() + self.dangling_requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = json!({
            "users": [{"id": 7, "username": "alice", "contactNumber": "C-000001", "avatar": "a.png"}],
            "chats": [{
                "id": "inbox-alice",
                "type": "inbox",
                "participants": ["alice"],
                "messages": [{"sender": "alice", "text": "hi", "ts": 1}],
                "updatedAt": 1700000000000i64,
                "pinned": true
            }],
            "contactRequests": [{"from": "alice", "to": "bob", "status": "pending"}],
            "meta": {"lastModified": 5, "schema": 2},
            "sessions": {"x": 1}
        });

        let doc: Document = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(doc.users[0].id, json!(7));
        assert_eq!(doc.users[0].extra["avatar"], json!("a.png"));
        assert!(doc.chats[0].is_inbox());
        assert_eq!(doc.extra["sessions"], json!({"x": 1}));

        assert_eq!(serde_json::to_value(&doc).unwrap(), raw);
    }

    #[test]
    fn test_mistyped_fields_are_kept_verbatim() {
        let raw = json!({
            "users": [
                {"id": null, "username": 5, "contactNumber": 123456},
                {"id": 2, "username": "bob"}
            ],
            "chats": [{
                "id": 42,
                "type": ["odd"],
                "participants": ["bob", 9],
                "messages": [{"sender": 7}, "loose text"],
                "updatedAt": 1700000000000.5
            }],
            "contactRequests": [{"from": {"id": 1}, "to": "bob"}],
            "meta": {}
        });

        let doc: Document = serde_json::from_value(raw.clone()).unwrap();
        let chat = &doc.chats[0];
        assert_eq!(chat.id, "");
        assert_eq!(chat.label(), "42");
        assert!(chat.participants.is_empty());
        assert!(chat.messages.is_empty());
        assert_eq!(chat.updated_at, None);
        assert_eq!(chat.updated_at_millis(), Some(1700000000000));
        assert_eq!(doc.users[0].username, "");
        assert_eq!(doc.contact_requests[0].to.as_deref(), Some("bob"));

        // Nothing the store does not understand is lost or rewritten.
        assert_eq!(serde_json::to_value(&doc).unwrap(), raw);
    }

    #[test]
    fn test_empty_name_matches_nothing() {
        let doc: Document = serde_json::from_value(json!({
            "users": [{"username": 5}],
            "chats": [{"id": 42}]
        }))
        .unwrap();
        assert!(doc.find_user("").is_none());
        assert!(doc.find_chat("").is_none());
    }

    #[test]
    fn test_set_contact_number_replaces_raw_value() {
        let mut doc: Document = serde_json::from_value(json!({
            "users": [{"username": "alice", "contactNumber": 111111}]
        }))
        .unwrap();

        let user = doc.find_user_mut("alice").unwrap();
        assert_eq!(user.set_contact_number("C-111111"), None);

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["users"][0]["contactNumber"], json!("C-111111"));
    }

    #[test]
    fn test_missing_collections_default_to_empty() {
        let doc: Document = serde_json::from_str("{}").unwrap();
        assert!(doc.users.is_empty());
        assert!(doc.chats.is_empty());
        assert!(doc.contact_requests.is_empty());
        assert_eq!(doc.last_modified(), None);
    }

    #[test]
    fn test_touch_advances_last_modified() {
        let mut doc = Document::new();
        let first = doc.last_modified().unwrap();
        let second = doc.touch();
        assert!(second > first);
        assert_eq!(doc.last_modified(), Some(second));
    }

    #[test]
    fn test_integrity_report_finds_dangling_references() {
        let doc: Document = serde_json::from_value(json!({
            "users": [{"username": "alice"}],
            "chats": [{
                "id": "c1",
                "participants": ["alice", "ghost"],
                "messages": [{"sender": "ghost"}, {"sender": "ghost"}, {"sender": "alice"}]
            }],
            "contactRequests": [{"from": "alice", "to": "nobody"}]
        }))
        .unwrap();

        let report = doc.integrity_report();
        assert_eq!(report.dangling_participants, vec![("c1".into(), "ghost".into())]);
        assert_eq!(report.dangling_senders, vec![("c1".into(), "ghost".into())]);
        assert_eq!(report.dangling_requests, vec![(0, "nobody".into())]);
        assert_eq!(report.total(), 3);
        assert!(!report.is_clean());
    }
}

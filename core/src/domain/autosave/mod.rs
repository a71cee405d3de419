//! Auto-Save Handler (§4.9)
//!
//! Invoked inline by the Consumer Loop for messages on the shared auto-save
//! stream. Writes a conversation row through the store's idempotent upsert
//! and classifies any failure into acknowledge-and-drop or leave-pending.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::data::store::{ConversationWrite, Store};
use crate::domain::metrics::LastSaveTracker;

/// Fields carried by one auto-save stream message (§3 Stream Message,
/// auto-save variant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSaveMessage {
    pub user_message: String,
    pub assistant_message: String,
    pub project: Option<String>,
    pub session: String,
    pub timestamp: i64,
}

impl AutoSaveMessage {
    pub fn into_fields(self) -> HashMap<String, String> {
        let mut fields = HashMap::from([
            ("user_message".to_string(), self.user_message),
            ("assistant_message".to_string(), self.assistant_message),
            ("session".to_string(), self.session),
            ("timestamp".to_string(), self.timestamp.to_string()),
        ]);
        if let Some(project) = self.project {
            fields.insert("project".to_string(), project);
        }
        fields
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            user_message: fields.get("user_message")?.clone(),
            assistant_message: fields.get("assistant_message")?.clone(),
            project: fields.get("project").cloned(),
            session: fields.get("session")?.clone(),
            timestamp: fields.get("timestamp")?.parse().ok()?,
        })
    }

    /// Truncated content hash the store keys idempotency on, alongside
    /// (session, timestamp) (§4.9 step 2, §6 store interface).
    fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.user_message.as_bytes());
        hasher.update(self.assistant_message.as_bytes());
        let digest = hasher.finalize();
        hex_prefix(&digest, 16)
    }
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    bytes
        .iter()
        .take(chars.div_ceil(2))
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
        .chars()
        .take(chars)
        .collect()
}

/// What the Consumer Loop should do with the dequeued auto-save message
/// (§4.9 steps 3-4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveOutcome {
    Acknowledge,
    LeavePending,
}

#[derive(Clone)]
pub struct AutoSaveHandler {
    store: Arc<dyn Store>,
    last_save: Option<Arc<LastSaveTracker>>,
}

impl AutoSaveHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            last_save: None,
        }
    }

    /// Record every successful upsert's wall-clock time on `tracker`, read
    /// back by the Metrics Aggregator's `last_save` figure (§4.11, §6).
    pub fn with_last_save_tracker(mut self, tracker: Arc<LastSaveTracker>) -> Self {
        self.last_save = Some(tracker);
        self
    }

    /// Parse `fields` and upsert the conversation row, classifying any
    /// failure (§4.9). An unparseable message is non-retryable: it is
    /// acknowledged and dropped rather than retried forever.
    pub async fn handle(&self, fields: &HashMap<String, String>) -> AutoSaveOutcome {
        let Some(message) = AutoSaveMessage::from_fields(fields) else {
            tracing::warn!("dropping unparseable auto-save message");
            return AutoSaveOutcome::Acknowledge;
        };

        let content_hash = message.content_hash();
        let write = ConversationWrite {
            session: message.session,
            project: message.project,
            timestamp: message.timestamp,
            content_hash,
            user_message: message.user_message,
            assistant_message: message.assistant_message,
        };

        match self.store.upsert_conversation(write).await {
            Ok(()) => {
                if let Some(tracker) = &self.last_save {
                    tracker.record(Utc::now().timestamp());
                }
                AutoSaveOutcome::Acknowledge
            }
            Err(e) => {
                // A malformed message is caught by the parse step above
                // before the store is ever called, so any failure here is
                // a transient connectivity/database problem (§4.9 step 4).
                tracing::warn!(error = %e, "auto-save upsert failed, leaving message pending");
                AutoSaveOutcome::LeavePending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::MemoryStore;

    fn message() -> AutoSaveMessage {
        AutoSaveMessage {
            user_message: "hi".to_string(),
            assistant_message: "hello".to_string(),
            project: Some("acme/widgets".to_string()),
            session: "session-1".to_string(),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn round_trips_through_field_map() {
        let fields = message().into_fields();
        let decoded = AutoSaveMessage::from_fields(&fields).unwrap();
        assert_eq!(decoded, message());
    }

    #[test]
    fn missing_required_field_fails_to_decode() {
        let fields = HashMap::from([("session".to_string(), "s".to_string())]);
        assert!(AutoSaveMessage::from_fields(&fields).is_none());
    }

    #[tokio::test]
    async fn successful_upsert_acknowledges() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let handler = AutoSaveHandler::new(store.clone());
        let outcome = handler.handle(&message().into_fields()).await;
        assert_eq!(outcome, AutoSaveOutcome::Acknowledge);
    }

    #[tokio::test]
    async fn duplicate_message_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let handler = AutoSaveHandler::new(store.clone());
        handler.handle(&message().into_fields()).await;
        handler.handle(&message().into_fields()).await;
        assert_eq!(store.conversation_count(), 1);
    }

    #[tokio::test]
    async fn unparseable_message_is_acknowledged_and_dropped() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let handler = AutoSaveHandler::new(store);
        let fields = HashMap::from([("session".to_string(), "s".to_string())]);
        let outcome = handler.handle(&fields).await;
        assert_eq!(outcome, AutoSaveOutcome::Acknowledge);
    }
}

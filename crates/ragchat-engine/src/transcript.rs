//! Per-session conversation transcripts, kept in memory.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use ragchat_core::types::ChatMessage;

pub const DEFAULT_SESSION: &str = "default";

/// Ordered, append-only list of turns for one session.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Mutex<Vec<ChatMessage>>,
    max_turns: Option<usize>,
}

impl Transcript {
    pub fn new(max_turns: Option<usize>) -> Self {
        Self { turns: Mutex::new(Vec::new()), max_turns }
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.turns.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.turns.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Append a completed user/assistant exchange. With a cap, the oldest whole
    /// exchanges go first, so history always starts with a user turn.
    pub async fn record_exchange(&self, user: impl Into<String>, assistant: impl Into<String>) {
        let mut turns = self.turns.lock().await;
        turns.push(ChatMessage::user(user));
        turns.push(ChatMessage::assistant(assistant));
        if let Some(max) = self.max_turns {
            if turns.len() > max {
                let excess = (turns.len() - max).div_ceil(2) * 2;
                turns.drain(..excess);
            }
        }
    }
}

/// Transcripts by session id. Requests without a session share [`DEFAULT_SESSION`].
#[derive(Debug, Default)]
pub struct TranscriptStore {
    sessions: Mutex<HashMap<String, Arc<Transcript>>>,
    max_turns: Option<usize>,
}

impl TranscriptStore {
    pub fn new(max_turns: Option<usize>) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), max_turns }
    }

    pub async fn session(&self, id: Option<&str>) -> Arc<Transcript> {
        let id = id.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SESSION);
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Transcript::new(self.max_turns)))
            .clone()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cap_drops_oldest_turns() {
        let t = Transcript::new(Some(4));
        t.record_exchange("q1", "a1").await;
        t.record_exchange("q2", "a2").await;
        t.record_exchange("q3", "a3").await;
        let contents: Vec<String> = t.history().await.into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["q2", "a2", "q3", "a3"]);
    }

    #[tokio::test]
    async fn odd_cap_never_splits_an_exchange() {
        let t = Transcript::new(Some(3));
        t.record_exchange("q1", "a1").await;
        t.record_exchange("q2", "a2").await;
        t.record_exchange("q3", "a3").await;
        let history = t.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ChatMessage::user("q3"));
        assert_eq!(history[1], ChatMessage::assistant("a3"));
    }

    #[tokio::test]
    async fn unbounded_by_default() {
        let t = Transcript::default();
        for i in 0..50 {
            t.record_exchange(format!("q{i}"), format!("a{i}")).await;
        }
        assert_eq!(t.len().await, 100);
    }

    #[tokio::test]
    async fn missing_session_id_maps_to_default() {
        let store = TranscriptStore::new(None);
        let a = store.session(None).await;
        let b = store.session(Some("  ")).await;
        let c = store.session(Some(DEFAULT_SESSION)).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c));
        let other = store.session(Some("alice")).await;
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(store.session_count().await, 2);
    }
}

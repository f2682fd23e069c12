//! Conversation state for the interactive chat.
//!
//! The controller owns the local message list and the current session
//! pointer. A conversation starts in `NoSession`; the first message creates a
//! server-side session titled after it and moves to `Active`. Every message is
//! persisted through the `Outbox`, so history writes reach the server in the
//! order they were produced.

use async_trait::async_trait;
use shared::{ChatSession, HistoryEntry, Role};

use crate::api::ApiError;
use crate::model::{ModelClient, ModelError, Turn};
use crate::outbox::{FlushReport, HistorySink, Outbox};

const TITLE_MAX_CHARS: usize = 50;

#[async_trait]
pub trait ChatBackend: HistorySink {
    async fn create_session(&self, title: &str) -> Result<i64, ApiError>;
    async fn history(&self, session_id: Option<i64>) -> Result<Vec<HistoryEntry>, ApiError>;
    async fn list_sessions(&self) -> Result<Vec<ChatSession>, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversation {
    NoSession,
    Active { session_id: i64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("chat session {0} not found")]
    UnknownSession(i64),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Result of one user message
#[derive(Debug)]
pub struct Exchange {
    pub session_id: i64,
    pub reply: String,
    pub flush: FlushReport,
}

/// Session title derived from the opening message.
pub fn session_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    title.push_str("...");
    title
}

pub struct ChatController<B, M> {
    backend: B,
    model: M,
    system_prompt: String,
    state: Conversation,
    messages: Vec<Turn>,
    outbox: Outbox,
}

impl<B: ChatBackend, M: ModelClient> ChatController<B, M> {
    pub fn new(backend: B, model: M, system_prompt: &str, max_attempts: u32) -> Self {
        Self {
            backend,
            model,
            system_prompt: system_prompt.to_string(),
            state: Conversation::NoSession,
            messages: Vec::new(),
            outbox: Outbox::new(max_attempts),
        }
    }

    pub fn state(&self) -> Conversation {
        self.state
    }

    pub fn messages(&self) -> &[Turn] {
        &self.messages
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Drop the local conversation. Undelivered history stays queued.
    pub fn new_conversation(&mut self) {
        self.state = Conversation::NoSession;
        self.messages.clear();
    }

    /// Load a stored session and continue it. The session must belong to the
    /// caller; state is left untouched otherwise.
    pub async fn resume(&mut self, session_id: i64) -> Result<usize, ControllerError> {
        let sessions = self.backend.list_sessions().await?;
        if !sessions.iter().any(|s| s.id == session_id) {
            return Err(ControllerError::UnknownSession(session_id));
        }

        let entries = self.backend.history(Some(session_id)).await?;
        self.messages = entries
            .into_iter()
            .map(|e| Turn::new(e.role, e.content))
            .collect();
        self.state = Conversation::Active { session_id };

        tracing::info!(
            "Resumed session {} with {} messages",
            session_id,
            self.messages.len()
        );
        Ok(self.messages.len())
    }

    pub async fn flush(&mut self) -> FlushReport {
        self.outbox.flush(&self.backend).await
    }

    pub async fn send(&mut self, text: &str) -> Result<Exchange, ControllerError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ControllerError::EmptyMessage);
        }

        let session_id = match self.state {
            Conversation::Active { session_id } => session_id,
            Conversation::NoSession => {
                let session_id = self.backend.create_session(&session_title(text)).await?;
                tracing::info!("Created chat session {}", session_id);
                self.state = Conversation::Active { session_id };
                session_id
            }
        };

        // Nothing is recorded until the model answers, so a failed turn can be
        // sent again without duplicating it
        self.messages.push(Turn::new(Role::User, text));
        let reply = match self.model.generate(&self.messages, &self.system_prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                self.messages.pop();
                return Err(e.into());
            }
        };

        self.messages.push(Turn::new(Role::Assistant, reply.clone()));
        self.outbox.enqueue(Some(session_id), Role::User, text);
        self.outbox.enqueue(Some(session_id), Role::Assistant, &reply);
        let flush = self.flush().await;

        Ok(Exchange {
            session_id,
            reply,
            flush,
        })
    }
}

/// In-memory backend and model used by the controller and chat loop tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use shared::AppendHistoryRequest;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub titles: Mutex<Vec<String>>,
        pub appended: Mutex<Vec<AppendHistoryRequest>>,
        pub stored: Vec<HistoryEntry>,
        pub fail_appends: Mutex<u32>,
        pub fail_creates: Mutex<u32>,
    }

    fn unavailable() -> ApiError {
        ApiError::Status {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    fn take_failure(counter: &Mutex<u32>) -> bool {
        let mut left = counter.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return true;
        }
        false
    }

    impl FakeBackend {
        pub fn contents(&self) -> Vec<String> {
            self.appended
                .lock()
                .unwrap()
                .iter()
                .map(|r| format!("{}:{}", r.role, r.content))
                .collect()
        }
    }

    #[async_trait]
    impl HistorySink for FakeBackend {
        async fn append(&self, req: &AppendHistoryRequest) -> Result<(), ApiError> {
            if take_failure(&self.fail_appends) {
                return Err(unavailable());
            }
            self.appended.lock().unwrap().push(req.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl ChatBackend for FakeBackend {
        async fn create_session(&self, title: &str) -> Result<i64, ApiError> {
            if take_failure(&self.fail_creates) {
                return Err(unavailable());
            }
            let mut titles = self.titles.lock().unwrap();
            titles.push(title.to_string());
            Ok(titles.len() as i64)
        }

        async fn history(&self, session_id: Option<i64>) -> Result<Vec<HistoryEntry>, ApiError> {
            Ok(self
                .stored
                .iter()
                .filter(|e| session_id.is_none() || e.session_id == session_id)
                .cloned()
                .collect())
        }

        async fn list_sessions(&self) -> Result<Vec<ChatSession>, ApiError> {
            let created = self.titles.lock().unwrap().len() as i64;
            let mut ids: Vec<i64> = (1..=created)
                .chain(self.stored.iter().filter_map(|e| e.session_id))
                .collect();
            ids.sort_unstable();
            ids.dedup();
            Ok(ids
                .into_iter()
                .map(|id| ChatSession {
                    id,
                    user_id: 1,
                    title: format!("session {}", id),
                    created_at: None,
                })
                .collect())
        }
    }

    /// Echoes the last turn, failing the first `failures` calls.
    #[derive(Default)]
    pub(crate) struct EchoModel {
        pub failures: Mutex<u32>,
    }

    impl EchoModel {
        pub fn failing(times: u32) -> Self {
            Self {
                failures: Mutex::new(times),
            }
        }
    }

    #[async_trait]
    impl ModelClient for EchoModel {
        async fn generate(&self, turns: &[Turn], _system: &str) -> Result<String, ModelError> {
            if take_failure(&self.failures) {
                return Err(ModelError::EmptyResponse);
            }
            let last = turns.last().map(|t| t.content.as_str()).unwrap_or_default();
            Ok(format!("echo: {} ({} turns)", last, turns.len()))
        }

        async fn analyze(&self, _: &[u8], _: &str, _: &str) -> Result<String, ModelError> {
            Ok("analysis".to_string())
        }
    }

    pub(crate) fn entry(id: i64, session_id: i64, role: Role, content: &str) -> HistoryEntry {
        HistoryEntry {
            id,
            user_id: 1,
            session_id: Some(session_id),
            role,
            content: content.to_string(),
            created_at: Some("2024-01-01 00:00:00".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{entry, EchoModel, FakeBackend};
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_session_title() {
        assert_eq!(session_title("  short question "), "short question");
        let long = "a".repeat(60);
        let title = session_title(&long);
        assert_eq!(title, format!("{}...", "a".repeat(50)));
        assert_eq!(session_title(&"é".repeat(50)), "é".repeat(50));
    }

    #[tokio::test]
    async fn test_first_message_creates_session() {
        let mut ctl = ChatController::new(FakeBackend::default(), EchoModel::default(), "sys", 3);
        assert_eq!(ctl.state(), Conversation::NoSession);

        let exchange = ctl.send("What is a normal resting heart rate?").await.unwrap();
        assert_eq!(exchange.session_id, 1);
        assert_eq!(ctl.state(), Conversation::Active { session_id: 1 });
        assert!(exchange.flush.is_clean());
        assert_eq!(exchange.flush.delivered, 2);
        assert_eq!(
            ctl.backend().titles.lock().unwrap().as_slice(),
            ["What is a normal resting heart rate?"]
        );

        let appended = ctl.backend().appended.lock().unwrap().clone();
        assert_eq!(appended.len(), 2);
        assert_eq!(appended[0].role, Role::User);
        assert_eq!(appended[1].role, Role::Assistant);
        assert!(appended.iter().all(|r| r.session_id == Some(1)));
    }

    #[tokio::test]
    async fn test_follow_up_reuses_session_and_context() {
        let mut ctl = ChatController::new(FakeBackend::default(), EchoModel::default(), "sys", 3);
        ctl.send("first").await.unwrap();
        let exchange = ctl.send("second").await.unwrap();

        assert_eq!(exchange.session_id, 1);
        assert_eq!(exchange.reply, "echo: second (3 turns)");
        assert_eq!(ctl.messages().len(), 4);
        assert_eq!(ctl.backend().titles.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_new_conversation_resets_to_no_session() {
        let mut ctl = ChatController::new(FakeBackend::default(), EchoModel::default(), "sys", 3);
        ctl.send("first").await.unwrap();

        ctl.new_conversation();
        assert_eq!(ctl.state(), Conversation::NoSession);
        assert!(ctl.messages().is_empty());

        let exchange = ctl.send("another topic").await.unwrap();
        assert_eq!(exchange.session_id, 2);
    }

    #[tokio::test]
    async fn test_resume_loads_history() {
        let backend = FakeBackend {
            stored: vec![
                entry(1, 7, Role::User, "hi"),
                entry(2, 7, Role::Assistant, "hello"),
                entry(3, 8, Role::User, "elsewhere"),
            ],
            ..Default::default()
        };
        let mut ctl = ChatController::new(backend, EchoModel::default(), "sys", 3);

        assert_eq!(ctl.resume(7).await.unwrap(), 2);
        assert_eq!(ctl.state(), Conversation::Active { session_id: 7 });

        let exchange = ctl.send("and now?").await.unwrap();
        assert_eq!(exchange.session_id, 7);
        assert_eq!(exchange.reply, "echo: and now? (3 turns)");
        assert!(ctl.backend().titles.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_unknown_session_keeps_state() {
        let backend = FakeBackend {
            stored: vec![entry(1, 7, Role::User, "hi")],
            ..Default::default()
        };
        let mut ctl = ChatController::new(backend, EchoModel::default(), "sys", 3);

        assert!(matches!(
            ctl.resume(999).await,
            Err(ControllerError::UnknownSession(999))
        ));
        assert_eq!(ctl.state(), Conversation::NoSession);
        assert!(ctl.messages().is_empty());

        // The next message still gets a real session
        let exchange = ctl.send("hello").await.unwrap();
        assert_eq!(exchange.session_id, 1);
        assert!(exchange.flush.is_clean());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let mut ctl = ChatController::new(FakeBackend::default(), EchoModel::default(), "sys", 3);
        assert!(matches!(
            ctl.send("   ").await,
            Err(ControllerError::EmptyMessage)
        ));
        assert_eq!(ctl.state(), Conversation::NoSession);
    }

    #[tokio::test]
    async fn test_failed_write_is_held_and_retried_in_order() {
        let backend = FakeBackend {
            fail_appends: Mutex::new(1),
            ..Default::default()
        };
        let mut ctl = ChatController::new(backend, EchoModel::default(), "sys", 3);

        let exchange = ctl.send("hello").await.unwrap();
        assert_eq!(exchange.flush.delivered, 0);
        assert_eq!(exchange.flush.pending, 2);
        assert!(!exchange.flush.is_clean());

        let report = ctl.flush().await;
        assert_eq!(report.delivered, 2);
        assert!(report.is_clean());
        assert_eq!(
            ctl.backend().contents(),
            vec!["user:hello", "assistant:echo: hello (1 turns)"]
        );
    }

    #[tokio::test]
    async fn test_model_failure_records_nothing_and_resend_is_stored_once() {
        let mut ctl = ChatController::new(FakeBackend::default(), EchoModel::failing(1), "sys", 3);

        assert!(matches!(
            ctl.send("hello").await,
            Err(ControllerError::Model(ModelError::EmptyResponse))
        ));
        assert!(ctl.messages().is_empty());
        assert!(ctl.backend().appended.lock().unwrap().is_empty());
        assert_eq!(ctl.outbox().pending(), 0);

        let exchange = ctl.send("hello").await.unwrap();
        assert_eq!(exchange.reply, "echo: hello (1 turns)");
        assert_eq!(ctl.messages().len(), 2);
        assert_eq!(
            ctl.backend().contents(),
            vec!["user:hello", "assistant:echo: hello (1 turns)"]
        );
    }
}

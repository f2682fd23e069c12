//! Ordered outbound queue for chat history writes.
//!
//! Every message appended locally is enqueued here with a per-session sequence
//! number. `flush` delivers entries strictly in enqueue order, awaiting each
//! one, so the store sees a conversation's messages in the order they were
//! created. A retryable failure leaves the entry at the head for the next
//! flush; once an entry has used up its attempts, or fails with a
//! non-retryable error, it moves to the dead-letter list and is reported.

use async_trait::async_trait;
use shared::{AppendHistoryRequest, Role};
use std::collections::{HashMap, VecDeque};

use crate::api::ApiError;

#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn append(&self, req: &AppendHistoryRequest) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub seq: u64,
    pub session_id: Option<i64>,
    pub role: Role,
    pub content: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl PendingEntry {
    fn request(&self) -> AppendHistoryRequest {
        AppendHistoryRequest {
            role: self.role,
            content: self.content.clone(),
            session_id: self.session_id,
        }
    }
}

/// Outcome of one `flush` call
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FlushReport {
    pub delivered: usize,
    /// Entries still queued after this flush
    pub pending: usize,
    /// Entries moved to the dead-letter list during this flush
    pub failed: Vec<PendingEntry>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.pending == 0 && self.failed.is_empty()
    }

    pub fn absorb(&mut self, later: FlushReport) {
        self.delivered += later.delivered;
        self.pending = later.pending;
        self.failed.extend(later.failed);
    }
}

pub struct Outbox {
    queue: VecDeque<PendingEntry>,
    dead_letters: Vec<PendingEntry>,
    next_seq: HashMap<Option<i64>, u64>,
    max_attempts: u32,
}

impl Outbox {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            dead_letters: Vec::new(),
            next_seq: HashMap::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Queue a message and return its sequence number within the session.
    pub fn enqueue(&mut self, session_id: Option<i64>, role: Role, content: &str) -> u64 {
        let counter = self.next_seq.entry(session_id).or_insert(0);
        *counter += 1;
        let seq = *counter;

        self.queue.push_back(PendingEntry {
            seq,
            session_id,
            role,
            content: content.to_string(),
            attempts: 0,
            last_error: None,
        });
        seq
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn dead_letters(&self) -> &[PendingEntry] {
        &self.dead_letters
    }

    pub async fn flush(&mut self, sink: &dyn HistorySink) -> FlushReport {
        let mut report = FlushReport::default();

        while let Some(entry) = self.queue.front_mut() {
            match sink.append(&entry.request()).await {
                Ok(()) => {
                    tracing::debug!(
                        "Delivered history entry seq {} (session {:?})",
                        entry.seq,
                        entry.session_id
                    );
                    self.queue.pop_front();
                    report.delivered += 1;
                }
                Err(e) => {
                    entry.attempts += 1;
                    entry.last_error = Some(e.to_string());

                    if e.is_retryable() && entry.attempts < self.max_attempts {
                        tracing::warn!(
                            "History write seq {} failed (attempt {}/{}): {}",
                            entry.seq,
                            entry.attempts,
                            self.max_attempts,
                            e
                        );
                        break;
                    }

                    tracing::error!(
                        "Giving up on history write seq {} (session {:?}): {}",
                        entry.seq,
                        entry.session_id,
                        e
                    );
                    if let Some(dead) = self.queue.pop_front() {
                        report.failed.push(dead.clone());
                        self.dead_letters.push(dead);
                    }
                }
            }
        }

        report.pending = self.queue.len();
        report
    }
}

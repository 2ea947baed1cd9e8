use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AuditLog, AuditLogEntry, MessageStore, SampleFilter, SampledMessage, StoreError};

/// Message store held in memory, with per-call failure injection.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMessageStore {
    messages: Arc<Mutex<Vec<SampledMessage>>>,
    failing_samples: Arc<Mutex<Vec<SampleFilter>>>,
    failing_lookups: Arc<Mutex<HashSet<String>>>,
    sample_calls: Arc<AtomicUsize>,
    lookup_calls: Arc<AtomicUsize>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: impl IntoIterator<Item = SampledMessage>) -> Self {
        let store = Self::new();
        for message in messages {
            store.push(message);
        }
        store
    }

    pub fn push(&self, message: SampledMessage) {
        self.messages.lock().expect("lock messages").push(message);
    }

    /// Make every sample request with this filter fail.
    pub fn fail_sampling(&self, filter: SampleFilter) {
        self.failing_samples
            .lock()
            .expect("lock failing samples")
            .push(filter);
    }

    pub fn fail_lookup(&self, message_id: impl Into<String>) {
        self.failing_lookups
            .lock()
            .expect("lock failing lookups")
            .insert(message_id.into());
    }

    pub fn sample_calls(&self) -> usize {
        self.sample_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn sample_messages(
        &self,
        sample_size: usize,
        filter: SampleFilter,
    ) -> Result<Vec<SampledMessage>, StoreError> {
        self.sample_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_samples
            .lock()
            .expect("lock failing samples")
            .contains(&filter)
        {
            return Err(StoreError::Unavailable("sampling disabled".to_string()));
        }

        let messages = self.messages.lock().expect("lock messages");
        Ok(messages
            .iter()
            .filter(|message| !filter.unassigned_only || message.assignee_email.is_none())
            .take(sample_size)
            .cloned()
            .collect())
    }

    async fn sender_email(&self, message_id: &str) -> Result<Option<String>, StoreError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_lookups
            .lock()
            .expect("lock failing lookups")
            .contains(message_id)
        {
            return Err(StoreError::Unavailable(format!(
                "lookup disabled for {message_id}"
            )));
        }

        let messages = self.messages.lock().expect("lock messages");
        Ok(messages
            .iter()
            .find(|message| message.id == message_id)
            .and_then(|message| message.sender_email.clone()))
    }
}

/// Audit log held in memory. Returns every recorded entry regardless of `since`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditLogEntry>>>,
    fail: Arc<AtomicBool>,
    list_calls: Arc<AtomicUsize>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: AuditLogEntry) {
        self.entries.lock().expect("lock entries").push(entry);
    }

    pub fn fail_listing(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn list_entries(&self, _since: DateTime<Utc>) -> Result<Vec<AuditLogEntry>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit log offline".to_string()));
        }
        Ok(self.entries.lock().expect("lock entries").clone())
    }
}

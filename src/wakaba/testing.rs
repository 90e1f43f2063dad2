//! In-memory stand-ins for the store, Discord and the dispatcher.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::discord::{snowflake_timestamp, MessageSurface, MessageTarget};
use crate::dispatch::Dispatcher;
use crate::error::{DiscordError, DispatchError, StoreError};
use crate::repository::TodoStore;
use crate::todo::TodoList;
use crate::types::{Message, MessagePayload, User, WorkerRequest};

#[derive(Default)]
pub struct RecordingDispatcher {
    requests: Mutex<Vec<WorkerRequest>>,
    fail: bool,
}

impl RecordingDispatcher {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn requests(&self) -> Vec<WorkerRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: &WorkerRequest) -> Result<(), DispatchError> {
        if self.fail {
            return Err(DispatchError::Invoke("throttled".to_string()));
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    lists: Mutex<HashMap<String, TodoList>>,
    puts: Mutex<usize>,
    fail_get: AtomicBool,
    fail_put: AtomicBool,
}

impl MemoryStore {
    pub fn with_list(list: TodoList) -> Self {
        let store = Self::default();
        store.lists.lock().unwrap().insert(list.channel_id.clone(), list);
        store
    }

    pub fn stored(&self, channel_id: &str) -> Option<TodoList> {
        self.lists.lock().unwrap().get(channel_id).cloned()
    }

    pub fn puts(&self) -> usize {
        *self.puts.lock().unwrap()
    }

    pub fn fail_gets(&self) {
        self.fail_get.store(true, Ordering::SeqCst);
    }

    pub fn fail_puts(&self) {
        self.fail_put.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TodoStore for MemoryStore {
    async fn get(&self, channel_id: &str) -> Result<TodoList, StoreError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("table unavailable".to_string()));
        }
        Ok(self
            .lists
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .unwrap_or_else(|| TodoList::new(channel_id)))
    }

    async fn put(&self, list: &TodoList) -> Result<(), StoreError> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("throughput exceeded".to_string()));
        }
        *self.puts.lock().unwrap() += 1;
        self.lists.lock().unwrap().insert(list.channel_id.clone(), list.clone());
        Ok(())
    }
}

#[derive(Default)]
struct SurfaceState {
    edits: Vec<(MessageTarget, MessagePayload)>,
    sent: Vec<(String, MessagePayload)>,
    ephemerals: Vec<String>,
    history: Vec<Message>,
    page_size: usize,
}

/// Records every call; history is served newest first like Discord does.
#[derive(Default)]
pub struct RecordingSurface {
    state: Mutex<SurfaceState>,
    fail_edits: AtomicBool,
    fail_history: AtomicBool,
}

impl RecordingSurface {
    pub fn message(id: &str, author: &str, content: &str) -> Message {
        Message {
            id: id.to_string(),
            content: content.to_string(),
            author: User { id: author.to_string() },
            timestamp: snowflake_timestamp(id)
                .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap().fixed_offset()),
        }
    }

    pub fn set_history(&self, newest_first: Vec<Message>, page_size: usize) {
        let mut state = self.state.lock().unwrap();
        state.history = newest_first;
        state.page_size = page_size;
    }

    pub fn fail_edits(&self) {
        self.fail_edits.store(true, Ordering::SeqCst);
    }

    pub fn fail_history(&self) {
        self.fail_history.store(true, Ordering::SeqCst);
    }

    pub fn edits(&self) -> Vec<(MessageTarget, MessagePayload)> {
        self.state.lock().unwrap().edits.clone()
    }

    pub fn sent(&self) -> Vec<(String, MessagePayload)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn ephemerals(&self) -> Vec<String> {
        self.state.lock().unwrap().ephemerals.clone()
    }

    /// Text of the last edit to the deferred placeholder.
    pub fn last_reply(&self) -> Option<String> {
        self.edits()
            .into_iter()
            .rev()
            .find(|(target, _)| matches!(target, MessageTarget::Original { .. }))
            .and_then(|(_, message)| message.content)
    }
}

fn failure() -> DiscordError {
    DiscordError::Api {
        status: 500,
        body: "internal".to_string(),
    }
}

#[async_trait]
impl MessageSurface for RecordingSurface {
    async fn edit_message(&self, target: &MessageTarget, message: &MessagePayload) -> Result<(), DiscordError> {
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(failure());
        }
        self.state.lock().unwrap().edits.push((target.clone(), message.clone()));
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, message: &MessagePayload) -> Result<String, DiscordError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push((channel_id.to_string(), message.clone()));
        Ok(format!("M{}", state.sent.len()))
    }

    async fn send_ephemeral(&self, _application_id: &str, _token: &str, content: &str) -> Result<(), DiscordError> {
        self.state.lock().unwrap().ephemerals.push(content.to_string());
        Ok(())
    }

    async fn channel_messages(
        &self,
        _channel_id: &str,
        before: Option<&str>,
        limit: u8,
    ) -> Result<Vec<Message>, DiscordError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(failure());
        }
        let state = self.state.lock().unwrap();
        let page = match state.page_size {
            0 => limit as usize,
            n => n.min(limit as usize),
        };
        let before: Option<u64> = before.and_then(|b| b.parse().ok());
        Ok(state
            .history
            .iter()
            .filter(|m| match (before, m.id.parse::<u64>()) {
                (Some(before), Ok(id)) => id < before,
                _ => true,
            })
            .take(page)
            .cloned()
            .collect())
    }
}

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::executor::CommandExecutor;
use crate::speckit::{SpecifyOutcome, SpecifyRunner};

/// Shared state for the command gateway
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<CommandExecutor>,
    pub server_name: Arc<str>,
}

impl AppState {
    pub fn new(executor: CommandExecutor, server_name: impl Into<Arc<str>>) -> Self {
        Self {
            executor: Arc::new(executor),
            server_name: server_name.into(),
        }
    }
}

/// Number of spec-kit invocations the web UI remembers
pub const HISTORY_CAPACITY: usize = 20;

/// One recorded spec-kit invocation
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub args: Vec<String>,
    pub result: SpecifyOutcome,
}

/// Fixed-capacity log of recent invocations, oldest first.
#[derive(Debug)]
pub struct CommandHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl CommandHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

/// Shared state for the spec-kit web service
#[derive(Clone)]
pub struct SpeckitState {
    pub runner: Arc<SpecifyRunner>,
    pub history: Arc<Mutex<CommandHistory>>,
}

impl SpeckitState {
    pub fn new(runner: SpecifyRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            history: Arc::new(Mutex::new(CommandHistory::default())),
        }
    }
}

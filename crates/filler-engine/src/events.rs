//! Progress reporting.
//!
//! The engine reports `{progress, message}` updates through a
//! [`ProgressSink`]. Closures are sinks, and [`EventEmitter`] fans updates out
//! over a [`tokio::sync::broadcast`] channel for observers such as a UI.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One progress update: a 0..=100 percentage plus the action being run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub progress: u8,
    pub message: ProgressMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub action: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl ProgressUpdate {
    /// Percentage for step `index` of `total`, rounded to the nearest integer.
    pub fn percent(index: usize, total: usize) -> u8 {
        if total == 0 {
            return 100;
        }
        ((index * 100 + total / 2) / total).min(100) as u8
    }
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<ProgressUpdate>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an update to all current subscribers.
    ///
    /// If there are no active receivers the update is silently dropped.
    pub fn emit(&self, update: ProgressUpdate) {
        let _ = self.sender.send(update);
    }

    /// Subscribe to updates. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressSink for EventEmitter {
    fn report(&self, update: ProgressUpdate) {
        self.emit(update);
    }
}

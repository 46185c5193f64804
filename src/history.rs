//! Bounded request/response/frame history for diagnostics.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Direction of a recorded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A request sent to the device.
    Send,
    /// A response received for a request.
    Receive,
    /// A frame pushed on the event stream.
    Push,
}

/// A recorded message in the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub msg_type: MessageType,
    /// Operation name, e.g. `set_brightness` or `events`.
    pub action: String,
    pub message: Value,
    /// Seconds since history creation
    pub timestamp: f64,
}

/// Keeps the most recent messages plus per-direction counters.
#[derive(Debug, Clone)]
pub struct MessageHistory {
    counts: HashMap<MessageType, usize>,
    last_error: Option<String>,
    last_push: Option<Instant>,
    start_time: Instant,
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHistory {
    pub const DEFAULT_MAX_ENTRIES: usize = 100;

    pub fn new() -> Self {
        Self::with_max_entries(Self::DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            counts: HashMap::new(),
            last_error: None,
            last_push: None,
            start_time: Instant::now(),
            entries: VecDeque::new(),
            max_entries,
        }
    }

    pub fn record(&mut self, msg_type: MessageType, action: &str, message: Value) {
        *self.counts.entry(msg_type).or_default() += 1;
        if msg_type == MessageType::Push {
            self.last_push = Some(Instant::now());
        }

        self.entries.push_back(HistoryEntry {
            msg_type,
            action: action.to_string(),
            message,
            timestamp: self.start_time.elapsed().as_secs_f64(),
        });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn record_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.entries.clear();
        self.last_error = None;
        self.last_push = None;
    }

    pub fn summary(&self) -> HistorySummary {
        let count = |t: MessageType| self.counts.get(&t).copied().unwrap_or(0);
        HistorySummary {
            send_count: count(MessageType::Send),
            receive_count: count(MessageType::Receive),
            push_count: count(MessageType::Push),
            total_entries: self.entries.len(),
            time_since_last_push: self.last_push.map(|t| t.elapsed().as_secs_f64()),
            last_error: self.last_error.clone(),
        }
    }
}

/// Summary of message history for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySummary {
    pub send_count: usize,
    pub receive_count: usize,
    pub push_count: usize,
    pub total_entries: usize,
    pub time_since_last_push: Option<f64>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_message() {
        let mut history = MessageHistory::new();
        history.record(
            MessageType::Send,
            "set_brightness",
            json!({"brightness": {"value": 50, "duration": 10}}),
        );

        assert_eq!(history.len(), 1);
        assert_eq!(history.summary().send_count, 1);
        assert!(history.summary().time_since_last_push.is_none());
    }

    #[test]
    fn test_push_sets_last_push() {
        let mut history = MessageHistory::new();
        history.record(MessageType::Push, "events", json!({"events": []}));
        let summary = history.summary();
        assert_eq!(summary.push_count, 1);
        assert!(summary.time_since_last_push.is_some());
    }

    #[test]
    fn test_max_entries_keeps_newest() {
        let mut history = MessageHistory::with_max_entries(2);
        for i in 0..5 {
            history.record(MessageType::Receive, &format!("call{i}"), Value::Null);
        }
        assert_eq!(history.len(), 2);
        let actions: Vec<&str> = history.entries().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["call3", "call4"]);
        assert_eq!(history.summary().receive_count, 5);
    }

    #[test]
    fn test_clear() {
        let mut history = MessageHistory::new();
        history.record(MessageType::Send, "new_token", Value::Null);
        history.record_error("timeout");
        history.clear();
        assert!(history.is_empty());
        assert!(history.last_error().is_none());
    }
}

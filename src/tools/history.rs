//! Bounded history of tool invocations.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of records retained.
pub const DEFAULT_TOOL_HISTORY_LIMIT: usize = 1000;

/// One tool invocation, created at dispatch time and completed once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    pub id: Uuid,
    pub provider_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
}

impl ToolCallRecord {
    pub fn is_complete(&self) -> bool {
        self.duration_ms.is_some()
    }

    pub fn succeeded(&self) -> bool {
        self.is_complete() && self.error.is_none()
    }
}

/// How a recorded invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallCompletion {
    Success(String),
    Failure(String),
}

#[derive(Debug, Default)]
struct HistoryState {
    records: HashMap<Uuid, ToolCallRecord>,
    order: VecDeque<Uuid>,
}

/// Thread-safe, bounded record store. Oldest records are evicted first.
#[derive(Debug)]
pub struct ToolHistory {
    state: Mutex<HistoryState>,
    limit: usize,
}

impl Default for ToolHistory {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_HISTORY_LIMIT)
    }
}

impl ToolHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(HistoryState::default()),
            limit: limit.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create an open record for a call about to start.
    pub fn start(&self, provider_id: &str, tool_name: &str, arguments: serde_json::Value) -> Uuid {
        let record = ToolCallRecord {
            id: Uuid::new_v4(),
            provider_id: provider_id.to_string(),
            tool_name: tool_name.to_string(),
            arguments,
            created_at: Utc::now(),
            result: None,
            error: None,
            duration_ms: None,
        };
        let id = record.id;

        let mut state = self.lock();
        state.order.push_back(id);
        state.records.insert(id, record);
        while state.order.len() > self.limit {
            if let Some(evicted) = state.order.pop_front() {
                state.records.remove(&evicted);
            }
        }
        id
    }

    /// Complete a record. Returns false if the record is unknown (evicted)
    /// or was already completed.
    pub fn complete(&self, id: Uuid, completion: CallCompletion, duration_ms: u64) -> bool {
        let mut state = self.lock();
        let Some(record) = state.records.get_mut(&id) else {
            return false;
        };
        if record.is_complete() {
            return false;
        }
        match completion {
            CallCompletion::Success(result) => record.result = Some(result),
            CallCompletion::Failure(error) => record.error = Some(error),
        }
        record.duration_ms = Some(duration_ms);
        true
    }

    pub fn get(&self, id: Uuid) -> Option<ToolCallRecord> {
        self.lock().records.get(&id).cloned()
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ToolCallRecord> {
        let state = self.lock();
        state
            .order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| state.records.get(id).cloned())
            .collect()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.records.clear();
        state.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_completes_exactly_once() {
        let history = ToolHistory::default();
        let id = history.start("fs", "read", json!({"path": "a"}));
        assert!(!history.get(id).unwrap().is_complete());

        assert!(history.complete(id, CallCompletion::Success("data".into()), 12));
        assert!(!history.complete(id, CallCompletion::Failure("late".into()), 99));

        let record = history.get(id).unwrap();
        assert!(record.succeeded());
        assert_eq!(record.result.as_deref(), Some("data"));
        assert_eq!(record.error, None);
        assert_eq!(record.duration_ms, Some(12));
    }

    #[test]
    fn oldest_records_are_evicted() {
        let history = ToolHistory::new(2);
        let first = history.start("p", "a", json!({}));
        let second = history.start("p", "b", json!({}));
        let third = history.start("p", "c", json!({}));

        assert_eq!(history.len(), 2);
        assert!(history.get(first).is_none());
        assert!(history.get(second).is_some());
        assert!(history.get(third).is_some());
        assert!(!history.complete(first, CallCompletion::Success("x".into()), 1));
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let history = ToolHistory::default();
        for name in ["a", "b", "c"] {
            history.start("p", name, json!({}));
        }
        let names: Vec<_> = history
            .recent(2)
            .into_iter()
            .map(|r| r.tool_name)
            .collect();
        assert_eq!(names, vec!["c", "b"]);
    }

    #[test]
    fn clear_empties_history() {
        let history = ToolHistory::default();
        history.start("p", "a", json!({}));
        history.clear();
        assert!(history.is_empty());
        assert!(history.recent(10).is_empty());
    }
}

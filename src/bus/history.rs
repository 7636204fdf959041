use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event_bus::BusEvent;
use super::event_types::EventType;
use super::policy::Priority;

pub const DEFAULT_MAX_HISTORY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub seq: u64,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

impl From<&BusEvent> for HistoryEntry {
    fn from(event: &BusEvent) -> Self {
        Self {
            seq: event.seq,
            event_type: event.event_type,
            payload: event.payload.clone(),
            priority: event.priority,
            attempt: event.attempt,
            timestamp: event.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryFilter {
    pub event_type: Option<EventType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Keep only the most recent N matches.
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn of_type(event_type: EventType) -> Self {
        Self {
            event_type: Some(event_type),
            ..Self::default()
        }
    }

    fn matches(&self, entry: &HistoryEntry) -> bool {
        if self.event_type.is_some_and(|t| t != entry.event_type) {
            return false;
        }
        if self.since.is_some_and(|since| entry.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| entry.timestamp > until) {
            return false;
        }
        true
    }
}

/// Bounded FIFO of executed events; the oldest entry is evicted first.
#[derive(Debug)]
pub(crate) struct EventHistory {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, event: &BusEvent) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry::from(event));
    }

    pub fn query(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        let mut matched: Vec<HistoryEntry> = self
            .entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            let excess = matched.len().saturating_sub(limit);
            matched.drain(..excess);
        }
        matched
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    fn event(seq: u64, event_type: EventType) -> BusEvent {
        BusEvent::new(seq, event_type, json!({ "n": seq }), Priority::Normal)
    }

    #[test]
    fn evicts_oldest_entries_at_capacity() {
        let mut history = EventHistory::new(3);
        for seq in 0..5 {
            history.record(&event(seq, EventType::SearchChanged));
        }
        let seqs: Vec<u64> = history.query(&HistoryFilter::default()).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn filters_by_type_time_and_limit() {
        let mut history = EventHistory::new(10);
        history.record(&event(1, EventType::FocusEntered));
        history.record(&event(2, EventType::SearchChanged));
        history.record(&event(3, EventType::FocusEntered));
        history.record(&event(4, EventType::FocusEntered));

        let focus = history.query(&HistoryFilter::of_type(EventType::FocusEntered));
        assert_eq!(focus.len(), 3);

        let latest = history.query(&HistoryFilter {
            limit: Some(2),
            ..HistoryFilter::of_type(EventType::FocusEntered)
        });
        assert_eq!(latest.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3, 4]);

        let future = history.query(&HistoryFilter {
            since: Some(Utc::now() + Duration::hours(1)),
            ..HistoryFilter::default()
        });
        assert!(future.is_empty());
    }
}

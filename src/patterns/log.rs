//! Interaction event log.
//!
//! Append-only and time-bounded: entries older than the retention horizon
//! (the largest analysis window) are evicted on append. Retention is
//! approximate, not strict - eviction only runs when new events arrive.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One recorded interaction from a collaborator (app launch, user action,
/// visibility change, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub timestamp: DateTime<Utc>,
    /// Originating app or actor tag.
    pub actor: String,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl InteractionEvent {
    pub fn new(actor: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            actor: actor.into(),
            event_type: event_type.into(),
            location: None,
            context: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Time-bounded append-only event log.
#[derive(Debug)]
pub struct InteractionLog {
    events: VecDeque<InteractionEvent>,
    retention: Duration,
}

impl InteractionLog {
    /// Create a log retaining events for at least `retention`.
    pub fn new(retention: std::time::Duration) -> Self {
        Self {
            events: VecDeque::new(),
            retention: Duration::from_std(retention).unwrap_or(Duration::hours(1)),
        }
    }

    /// Append an event, evicting entries past the retention horizon.
    pub fn record(&mut self, event: InteractionEvent) {
        let horizon = Utc::now() - self.retention;
        while let Some(front) = self.events.front() {
            if front.timestamp < horizon {
                self.events.pop_front();
            } else {
                break;
            }
        }
        self.events.push_back(event);
    }

    /// Events with timestamps inside `[now - window, ..]`, oldest first.
    pub fn window_at(&self, now: DateTime<Utc>, window: std::time::Duration) -> Vec<InteractionEvent> {
        let cutoff = now - Duration::from_std(window).unwrap_or(Duration::zero());
        self.events
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

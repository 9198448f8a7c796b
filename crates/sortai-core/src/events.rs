//! Observability surface: streaming status snapshots and subscriber notifications
//! (spec §4.10 "mode changes are observable", §6 "Outputs").
//!
//! Every component that changes shared, externally-interesting state emits a
//! [`SortAiEvent`] on a broadcast channel. There is no subscriber shipped here —
//! the GUI is out of scope (spec §1) — but the CLI and tests attach one to observe
//! pipeline behavior.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::router::RouterMode;

/// Depth of the broadcast channel's internal ring buffer. Slow subscribers drop the
/// oldest events rather than block publishers — publishers never await a subscriber.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum SortAiEvent {
    /// Phase-1 instant pass started for a scan.
    Phase1Started { file_count: usize, timestamp: DateTime<Utc> },
    /// Phase-1 instant pass finished.
    Phase1Completed {
        assigned: usize,
        clustered: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// Phase-2 background refinement queued an item.
    Phase2Queued { file_id: String, priority: String, timestamp: DateTime<Utc> },
    /// Phase-2 background refinement produced a proposal.
    Phase2Proposed {
        file_id: String,
        category_path: String,
        confidence: f32,
        timestamp: DateTime<Utc>,
    },
    /// The LLM router changed operating mode.
    RouterModeChanged {
        previous: RouterMode,
        current: RouterMode,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A provider cascade escalated past the first respondent.
    RouterEscalated {
        from_provider: String,
        to_provider: String,
        confidence: f32,
        timestamp: DateTime<Utc>,
    },
    /// The gatekeeper resolved a pending merge/split suggestion.
    GatekeeperDecision {
        suggestion_id: String,
        approved: bool,
        timestamp: DateTime<Utc>,
    },
    /// A file operation was committed by the Safe Organizer.
    FileMoved {
        log_entry_id: String,
        source: String,
        destination: String,
        timestamp: DateTime<Utc>,
    },
    /// An operation was undone.
    FileUndone { log_entry_id: String, timestamp: DateTime<Utc> },
    /// The watch manager's state machine transitioned.
    WatchStateChanged { previous: String, current: String, timestamp: DateTime<Utc> },
    /// A watched file became ready after its quiet period elapsed.
    WatchFileReady { path: String, size: u64, timestamp: DateTime<Utc> },
    /// A periodic pipeline status snapshot (spec §6 "Outputs").
    StatusSnapshot {
        phase: String,
        pending_review: usize,
        pending_escalation: usize,
        watch_queue_depth: usize,
        router_mode: RouterMode,
        timestamp: DateTime<Utc>,
    },
}

/// Shared broadcast publisher. Cloning is cheap (an `Arc` internally); every
/// component that needs to publish holds a clone.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SortAiEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SortAiEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Never blocks; returns silently if there are no subscribers.
    pub fn publish(&self, event: SortAiEvent) {
        let _ = self.sender.send(event);
    }
}

//! Event types for the feedenrich event system
//!
//! Provides the shared event definition and the broadcast `EventBus` that
//! carries enrichment progress to any number of subscribers (CLI progress
//! output, batch workers, an HTTP layer streaming to a UI).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Enrichment event types
///
/// Events are broadcast via EventBus and serialize with a `type` tag so they
/// can be forwarded as JSON lines or SSE frames unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum EnrichmentEvent {
    /// A pipeline run started for a record
    RunStarted {
        run_id: Uuid,
        record_id: String,
        /// Optimization scope identifier (e.g. "all", "title")
        scope: String,
        timestamp: DateTime<Utc>,
    },

    /// A pipeline stage started or completed
    StageProgress {
        run_id: Uuid,
        record_id: String,
        /// Stage name (e.g. "validating", "generating")
        stage: String,
        /// "started" or "completed"
        status: String,
        /// Stage duration, present on completion
        duration_ms: Option<u64>,
        timestamp: DateTime<Utc>,
    },

    /// An evidence source was skipped or failed; the run continues without it
    EvidenceDegraded {
        run_id: Uuid,
        record_id: String,
        /// Evidence source ("visual", "web")
        source: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A candidate proposal reached its disposition
    ProposalDecided {
        run_id: Uuid,
        record_id: String,
        field: String,
        /// "accepted", "rejected" or "human_review"
        disposition: String,
        risk_level: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A stage failed
    RunError {
        run_id: Uuid,
        record_id: String,
        stage: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A pipeline run reached a terminal status
    RunFinished {
        run_id: Uuid,
        record_id: String,
        /// "completed", "failed" or "cancelled"
        status: String,
        accepted: usize,
        rejected: usize,
        human_review: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl EnrichmentEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            EnrichmentEvent::RunStarted { .. } => "RunStarted",
            EnrichmentEvent::StageProgress { .. } => "StageProgress",
            EnrichmentEvent::EvidenceDegraded { .. } => "EvidenceDegraded",
            EnrichmentEvent::ProposalDecided { .. } => "ProposalDecided",
            EnrichmentEvent::RunError { .. } => "RunError",
            EnrichmentEvent::RunFinished { .. } => "RunFinished",
        }
    }

    /// Run this event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            EnrichmentEvent::RunStarted { run_id, .. }
            | EnrichmentEvent::StageProgress { run_id, .. }
            | EnrichmentEvent::EvidenceDegraded { run_id, .. }
            | EnrichmentEvent::ProposalDecided { run_id, .. }
            | EnrichmentEvent::RunError { run_id, .. }
            | EnrichmentEvent::RunFinished { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast event bus
///
/// Cloning the bus clones the sender; all clones feed the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EnrichmentEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers lag
    ///
    /// # Examples
    ///
    /// ```
    /// use feedenrich_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(1000);
    /// assert_eq!(event_bus.capacity(), 1000);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<EnrichmentEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EnrichmentEvent,
    ) -> Result<usize, broadcast::error::SendError<EnrichmentEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EnrichmentEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//! Workflow event bridge
//!
//! Forwards the per-run `PipelineEvent` channel onto the shared `EventBus`
//! as `EnrichmentEvent`s. State machine transitions stay internal; every
//! other event has a public counterpart.

use super::PipelineEvent;
use chrono::Utc;
use feedenrich_common::events::{EnrichmentEvent, EventBus};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Convert one pipeline event into its public form
///
/// Returns `None` for events that are not broadcast.
pub fn to_enrichment_event(event: PipelineEvent) -> Option<EnrichmentEvent> {
    let timestamp = Utc::now();
    match event {
        PipelineEvent::RunStarted {
            run_id,
            record_id,
            scope,
        } => Some(EnrichmentEvent::RunStarted {
            run_id,
            record_id,
            scope: scope.as_str().to_string(),
            timestamp,
        }),

        PipelineEvent::StageStarted {
            run_id,
            record_id,
            stage,
        } => Some(EnrichmentEvent::StageProgress {
            run_id,
            record_id,
            stage: stage.as_str().to_string(),
            status: "started".to_string(),
            duration_ms: None,
            timestamp,
        }),

        PipelineEvent::StageCompleted {
            run_id,
            record_id,
            stage,
            duration_ms,
        } => Some(EnrichmentEvent::StageProgress {
            run_id,
            record_id,
            stage: stage.as_str().to_string(),
            status: "completed".to_string(),
            duration_ms: Some(duration_ms),
            timestamp,
        }),

        PipelineEvent::StateChanged { .. } => None,

        PipelineEvent::EvidenceDegraded {
            run_id,
            record_id,
            source,
            reason,
        } => Some(EnrichmentEvent::EvidenceDegraded {
            run_id,
            record_id,
            source,
            reason,
            timestamp,
        }),

        PipelineEvent::ProposalEmitted {
            run_id,
            record_id,
            field,
            disposition,
            risk_level,
            ..
        } => Some(EnrichmentEvent::ProposalDecided {
            run_id,
            record_id,
            field,
            disposition: disposition.as_str().to_string(),
            risk_level: risk_level.map(|level| level.as_str().to_string()),
            timestamp,
        }),

        PipelineEvent::Error {
            run_id,
            record_id,
            stage,
            message,
        } => Some(EnrichmentEvent::RunError {
            run_id,
            record_id,
            stage: stage.as_str().to_string(),
            message,
            timestamp,
        }),

        PipelineEvent::Finished {
            run_id,
            record_id,
            status,
            accepted,
            rejected,
            human_review,
            duration_ms,
        } => Some(EnrichmentEvent::RunFinished {
            run_id,
            record_id,
            status: status.as_str().to_string(),
            accepted,
            rejected,
            human_review,
            duration_ms,
            timestamp,
        }),
    }
}

/// Bridge task that forwards pipeline events to the EventBus
///
/// Runs until every sender of `pipeline_rx` is dropped.
///
/// # Returns
/// Number of events broadcast
pub async fn bridge_pipeline_events(
    mut pipeline_rx: mpsc::Receiver<PipelineEvent>,
    event_bus: EventBus,
) -> usize {
    info!("Pipeline event bridge started");
    let mut forwarded = 0;

    while let Some(event) = pipeline_rx.recv().await {
        debug!("Bridge: Received pipeline event: {:?}", event);
        if let Some(public) = to_enrichment_event(event) {
            event_bus.emit_lossy(public);
            forwarded += 1;
        }
    }

    info!("Pipeline event bridge stopped after {} events", forwarded);
    forwarded
}

//! Integration tests for the enrichment pipeline
//!
//! Drives full runs against a scripted oracle and mock collectors:
//! - Disposition of every candidate (accepted, human review, rejected)
//! - Degraded evidence paths
//! - Failure, timeout and cancellation semantics with partial results
//! - Event stream ordering

mod helpers;

use feedenrich_agent::models::{PipelineState, ProposalStatus, RiskLevel, RunStatus, SourceType};
use feedenrich_agent::oracle::{OracleError, OracleTask};
use feedenrich_agent::workflow::{Disposition, PipelineEvent};
use feedenrich_agent::{OptimizationScope, Pipeline, PipelineConfig, Record};
use helpers::{bare_record, collect_events, complete_record, MockVisual, MockWeb, ScriptedOracle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const MIXED_PROPOSALS: &str = r#"{
  "analysis": {"score": 0.6, "missing_fields": ["color"], "weak_fields": ["title"], "violations": []},
  "proposals": [
    {"field": "title", "before": "Basket Nike Air Max 90 Homme Blanc",
     "after": "Basket Nike Air Max 90 Homme Blanc Cuir",
     "rationale": "Material from description", "sources": ["feed:title", "feed:description"], "confidence": 0.95},
    {"field": "color", "before": "", "after": "white", "sources": ["image:color"], "confidence": 0.9},
    {"field": "description", "after": "", "sources": ["feed:description"], "confidence": 0.9},
    {"field": "image_link", "after": "valid image URL without watermarks", "confidence": 0.9},
    {"field": "link", "after": "shop.example.com/p/air-max-90", "sources": ["feed:link"], "confidence": 0.9},
    {"field": "price", "after": "129.99 EUR", "sources": ["feed:price"], "confidence": 0.9},
    {"field": "gtin", "after": "0194501234567", "sources": ["inferred"], "confidence": 0.1}
  ]
}"#;

fn pipeline_with(oracle: Arc<ScriptedOracle>, config: PipelineConfig) -> Pipeline {
    Pipeline::new(config, oracle)
}

// ============================================================================
// Dispositions
// ============================================================================

#[tokio::test]
async fn test_mixed_candidates_reach_their_dispositions() {
    // Given: a compliant record, a confident visual observation and a mixed oracle answer
    let oracle = Arc::new(ScriptedOracle::new().proposals(MIXED_PROPOSALS));
    let pipeline = pipeline_with(Arc::clone(&oracle), PipelineConfig::default())
        .with_visual(Arc::new(MockVisual::observing(&[("color", "white", 0.9)])));
    let mut record = complete_record("sku-1");

    // When: the pipeline runs
    let result = pipeline.run(&mut record, CancellationToken::new()).await;

    // Then: the run completes with every stage recorded
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.state, PipelineState::Finalized);
    assert!(result.error.is_none());
    let stages: Vec<_> = result.stages.iter().map(|s| s.stage).collect();
    assert_eq!(
        stages,
        vec![
            PipelineState::Validating,
            PipelineState::EvidenceGathering,
            PipelineState::Generating,
            PipelineState::Screening,
            PipelineState::RiskAssessing,
        ]
    );
    assert!(result.validation.as_ref().unwrap().valid);

    // Then: the small feed-backed title edit is applied automatically
    assert_eq!(result.proposals.len(), 1);
    let title = &result.proposals[0];
    assert_eq!(title.field, "title");
    assert_eq!(title.status, ProposalStatus::Accepted);
    assert_eq!(title.risk_level, RiskLevel::Low);
    assert_eq!(title.source_type(), SourceType::Feed);
    assert!(title.sources.iter().all(|s| s.evidence_id.is_some()));
    assert_eq!(record.field_text("title"), "Basket Nike Air Max 90 Homme Blanc Cuir");
    assert_eq!(record.version, 2);

    // Then: the new color is escalated, not applied, and not discarded
    assert_eq!(result.human_required.len(), 1);
    let color = &result.human_required[0];
    assert_eq!(color.proposal.field, "color");
    assert_eq!(color.proposal.status, ProposalStatus::Proposed);
    assert_eq!(color.risk_level, RiskLevel::High);
    assert_eq!(record.field_text("color"), "");

    // Then: rejections keep generation order within each stage
    let rejected: Vec<_> = result
        .rejections
        .iter()
        .map(|r| (r.field.as_str(), r.stage))
        .collect();
    assert_eq!(
        rejected,
        vec![
            ("image_link", PipelineState::Generating),
            ("description", PipelineState::Screening),
            ("link", PipelineState::Screening),
            ("price", PipelineState::Screening),
            ("gtin", PipelineState::Screening),
        ]
    );
    assert_eq!(result.rejections[0].reason, "placeholder value instead of concrete data");
    assert_eq!(result.rejections[1].reason, "empty value");
    assert_eq!(result.rejections[2].reason, "invalid URL");
    assert_eq!(result.rejections[3].reason, "unchanged value");
    assert!(result.rejections[4].reason.starts_with("confidence 0.10"));

    // Then: the summary counts every candidate once
    let summary = result.summary.as_ref().unwrap();
    assert_eq!(summary.proposals_created, 7);
    assert_eq!(summary.proposals_accepted, 1);
    assert_eq!(summary.proposals_rejected, 5);
    assert_eq!(summary.human_review_needed, 1);
    assert_eq!(summary.total_stages, 5);
    assert!((summary.score_before - 0.6).abs() < 1e-9);
    assert!((summary.score_after - 0.65).abs() < 1e-9);

    // Then: the verified visual fact reached the oracle as an allowed fact
    let calls = oracle.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].task, OracleTask::Proposals);
    assert!(calls[0].user.contains("\"color\": \"white\""));
    assert!(calls[0].user.contains("Image Analysis Results:"));
}

#[tokio::test]
async fn test_aliased_feed_keys_are_linked_as_canonical_fields() {
    // Given: a French-keyed feed and an image that disagrees with the feed color
    let oracle = Arc::new(ScriptedOracle::new().proposals(
        r#"{"proposals": [{"field": "title", "after": "Basket Nike Air Max 90 Homme Bleu Cuir",
            "sources": ["feed:titre", "feed:couleur"], "confidence": 0.95}]}"#,
    ));
    let pipeline = pipeline_with(Arc::clone(&oracle), PipelineConfig::default())
        .with_visual(Arc::new(MockVisual::observing(&[("color", "rouge", 0.9)])));
    let mut record = Record::from_json_value(serde_json::json!({
        "id": "sku-fr",
        "titre": "Basket Nike Air Max 90 Homme Bleu",
        "couleur": "bleu",
        "marque": "Nike",
        "url": "https://shop.example.com/p/air-max-90-bleu",
        "imageLink": "https://cdn.example.com/img/air-max-90-bleu.jpg"
    }))
    .unwrap();

    // When
    let result = pipeline.run(&mut record, CancellationToken::new()).await;

    // Then: feed evidence is filed under canonical names, keeping the feed key as source
    let trail = result.evidence_trail.as_array().unwrap();
    let feed_color = trail
        .iter()
        .find(|e| e["origin"] == "original-feed" && e["field"] == "color")
        .expect("feed color registered as color");
    assert_eq!(feed_color["source"]["field"], "couleur");
    let feed_title = trail
        .iter()
        .find(|e| e["origin"] == "original-feed" && e["field"] == "title")
        .expect("feed title registered as title");
    assert!(trail.iter().all(|e| e["field"] != "couleur" && e["field"] != "titre"));

    // Then: the feed value outranks the verified visual one in the allowed facts
    let user = &oracle.calls()[0].user;
    let facts = user
        .split("ALLOWED FACTS")
        .nth(1)
        .and_then(|rest| rest.split("\n\n").next())
        .unwrap();
    assert!(facts.contains("\"color\": \"bleu\""), "{}", facts);
    assert!(facts.contains("\"title\": \"Basket Nike Air Max 90 Homme Bleu\""), "{}", facts);
    assert!(!facts.contains("couleur"), "{}", facts);
    assert!(!facts.contains("rouge"), "{}", facts);

    // Then: aliased source labels resolve to the feed entries
    assert_eq!(result.proposals.len(), 1);
    let sources = &result.proposals[0].sources;
    let ids: Vec<_> = sources.iter().map(|s| s.evidence_id.map(|id| id.to_string())).collect();
    assert_eq!(
        ids,
        vec![
            feed_title["id"].as_str().map(str::to_string),
            feed_color["id"].as_str().map(str::to_string),
        ]
    );
    assert_eq!(record.current.get("titre").map(|v| v.to_display_string()).as_deref(),
        Some("Basket Nike Air Max 90 Homme Bleu Cuir"));
}

#[tokio::test]
async fn test_surfaced_proposals_always_change_the_value() {
    let oracle = Arc::new(ScriptedOracle::new().proposals(MIXED_PROPOSALS));
    let pipeline = pipeline_with(oracle, PipelineConfig::default());
    let mut record = complete_record("sku-2");

    let result = pipeline.run(&mut record, CancellationToken::new()).await;

    let surfaced = result
        .proposals
        .iter()
        .chain(result.human_required.iter().map(|h| &h.proposal));
    for proposal in surfaced {
        assert!(!proposal.after.trim().is_empty());
        assert_ne!(proposal.after, proposal.before_text());
    }
}

#[tokio::test]
async fn test_web_claim_with_health_keyword_goes_to_human() {
    // Given: the oracle cites a web page for an organic material claim
    let oracle = Arc::new(ScriptedOracle::new().proposals(
        r#"{"proposals": [{"field": "material", "after": "organic cotton",
            "sources": ["https://brand.example.com/spec"], "confidence": 0.8}]}"#,
    ));
    let pipeline = pipeline_with(oracle, PipelineConfig::default()).with_web(Arc::new(MockWeb::finding(&[(
        "material",
        "organic cotton",
        "https://brand.example.com/spec",
        0.8,
    )])));
    let mut record = complete_record("sku-3");

    // When
    let result = pipeline.run(&mut record, CancellationToken::new()).await;

    // Then: escalated with the keyword named, linked to the page evidence
    assert!(result.proposals.is_empty());
    let item = &result.human_required[0];
    assert_eq!(item.risk_level, RiskLevel::High);
    assert!(item.reason.contains("organic"));
    assert_eq!(item.proposal.source_type(), SourceType::Web);
    assert!(item.proposal.sources[0].evidence_id.is_some());
    assert_eq!(record.field_text("material"), "");
}

#[tokio::test]
async fn test_scope_limits_accepted_fields() {
    // Given: a title-scoped run and an oracle that also proposes a color
    let oracle = Arc::new(ScriptedOracle::new().proposals(
        r#"{"score": 0.5, "proposals": [
            {"field": "color", "before": "", "after": "white", "sources": ["image:color"], "confidence": 0.9},
            {"field": "titre", "after": "Basket Nike Air Max 90 Homme Blanc Cuir", "sources": ["feed:title"], "confidence": 0.95}
        ]}"#,
    ));
    let config = PipelineConfig {
        scope: OptimizationScope::Title,
        ..PipelineConfig::default()
    };
    let (tx, rx) = mpsc::channel(128);
    let pipeline = pipeline_with(oracle, config).with_events(tx);
    let mut record = complete_record("sku-4");

    // When
    let result = pipeline.run(&mut record, CancellationToken::new()).await;
    drop(pipeline);
    let events = collect_events(rx).await;

    // Then: the color is out of scope, the aliased title is accepted
    assert_eq!(result.rejections.len(), 1);
    assert_eq!(result.rejections[0].field, "color");
    assert_eq!(result.rejections[0].reason, "outside optimization scope");
    assert_eq!(result.proposals[0].field, "title");
    assert_eq!(result.summary.unwrap().score_before, 0.5);

    // Then: title scope never asks for web evidence
    let degraded: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::EvidenceDegraded { source, .. } => Some(source.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(degraded, vec!["visual"]);
}

// ============================================================================
// Degraded evidence
// ============================================================================

#[tokio::test]
async fn test_feed_only_run_without_image_or_search_key() {
    // Given: no image_link and no web retriever configured
    let oracle = Arc::new(ScriptedOracle::new().proposals(r#"{"analysis": {"score": 0.3}, "proposals": []}"#));
    let (tx, rx) = mpsc::channel(128);
    let pipeline = pipeline_with(oracle, PipelineConfig::default())
        .with_visual(Arc::new(MockVisual::observing(&[("color", "white", 0.95)])))
        .with_events(tx);
    let mut record = bare_record("sku-5");

    // When
    let result = pipeline.run(&mut record, CancellationToken::new()).await;
    drop(pipeline);
    let events = collect_events(rx).await;

    // Then: a completed run with nothing accepted, not an error
    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.error.is_none());
    assert!(result.proposals.is_empty());
    assert!(result.human_required.is_empty());
    assert!(!result.validation.as_ref().unwrap().valid);

    // Then: only feed evidence was registered
    let trail = result.evidence_trail.as_array().unwrap();
    assert_eq!(trail.len(), 3);
    assert!(trail.iter().all(|e| e["origin"] == "original-feed"));

    // Then: both degradations were reported with their reason
    let reasons: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::EvidenceDegraded { source, reason, .. } => Some((source.as_str(), reason.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(
        reasons,
        vec![("visual", "no image URL"), ("web", "no web retriever configured")]
    );
}

#[tokio::test]
async fn test_collector_failures_do_not_fail_the_run() {
    // Given: both collectors fail
    let oracle = Arc::new(ScriptedOracle::new().proposals(r#"{"proposals": []}"#));
    let pipeline = pipeline_with(oracle, PipelineConfig::default())
        .with_visual(Arc::new(MockVisual::failing("connection reset")))
        .with_web(Arc::new(MockWeb::failing("quota exceeded")));
    let mut record = complete_record("sku-6");

    // When
    let result = pipeline.run(&mut record, CancellationToken::new()).await;

    // Then: the run completes and the evidence stage explains the degradation
    assert_eq!(result.status, RunStatus::Completed);
    let output = &result.stage(PipelineState::EvidenceGathering).unwrap().output;
    assert_eq!(output["visual"]["status"], "degraded");
    assert!(output["visual"]["reason"].as_str().unwrap().contains("connection reset"));
    assert_eq!(output["web"]["status"], "degraded");
    assert!(output["web"]["reason"].as_str().unwrap().contains("quota exceeded"));
}

#[tokio::test]
async fn test_slow_collector_times_out() {
    let oracle = Arc::new(ScriptedOracle::new().proposals(r#"{"proposals": []}"#));
    let config = PipelineConfig {
        evidence_timeout: Duration::from_millis(50),
        ..PipelineConfig::default()
    };
    let pipeline = pipeline_with(oracle, config).with_visual(Arc::new(
        MockVisual::observing(&[("color", "white", 0.9)]).delayed(Duration::from_secs(5)),
    ));
    let mut record = complete_record("sku-7");

    let result = pipeline.run(&mut record, CancellationToken::new()).await;

    assert_eq!(result.status, RunStatus::Completed);
    let output = &result.stage(PipelineState::EvidenceGathering).unwrap().output;
    assert!(output["visual"]["reason"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_web_fact_corroborated_by_image_is_verified() {
    // Given: the image and a web page agree on the color
    let oracle = Arc::new(ScriptedOracle::new().proposals(r#"{"proposals": []}"#));
    let pipeline = pipeline_with(Arc::clone(&oracle), PipelineConfig::default())
        .with_visual(Arc::new(MockVisual::observing(&[("color", "White", 0.9)])))
        .with_web(Arc::new(MockWeb::finding(&[
            ("color", "white", "https://nike.example.com/air-max-90", 0.7),
            ("material", "leather", "https://nike.example.com/air-max-90", 0.7),
        ])));
    let mut record = complete_record("sku-8");

    // When
    let result = pipeline.run(&mut record, CancellationToken::new()).await;

    // Then: only the corroborated web fact is verified
    let trail = result.evidence_trail.as_array().unwrap();
    let web: Vec<_> = trail.iter().filter(|e| e["origin"] == "external-page").collect();
    assert_eq!(web.len(), 2);
    let color = web.iter().find(|e| e["field"] == "color").unwrap();
    assert_eq!(color["verified"], true);
    assert_eq!(color["verified_by"], "visual-corroboration");
    let material = web.iter().find(|e| e["field"] == "material").unwrap();
    assert_eq!(material["verified"], false);

    // Then: unverified web facts are not allowed facts
    let user = &oracle.calls()[0].user;
    assert!(!user.contains("\"material\": \"leather\""));
    assert!(user.contains("Web Search Results:"));
}

// ============================================================================
// Failure and cancellation
// ============================================================================

#[tokio::test]
async fn test_oracle_failure_returns_partial_result() {
    // Given: the oracle is unreachable
    let oracle = Arc::new(ScriptedOracle::new().respond(
        OracleTask::Proposals,
        Err(OracleError::Network("connection refused".into())),
    ));
    let pipeline = pipeline_with(oracle, PipelineConfig::default());
    let mut record = complete_record("sku-9");
    let before = record.clone();

    // When
    let result = pipeline.run(&mut record, CancellationToken::new()).await;

    // Then: failed in generation, with earlier stages and evidence kept
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.state, PipelineState::Failed);
    let failure = result.error.as_ref().unwrap();
    assert_eq!(failure.stage, PipelineState::Generating);
    assert!(failure.message.contains("connection refused"));
    assert!(result.validation.is_some());
    assert!(result.stage(PipelineState::EvidenceGathering).unwrap().error.is_none());
    assert!(result.stage(PipelineState::Generating).unwrap().error.is_some());
    assert!(!result.evidence_trail.as_array().unwrap().is_empty());
    assert!(result.summary.is_some());
    assert_eq!(record.current, before.current);
}

#[tokio::test]
async fn test_malformed_oracle_response_is_stage_failure() {
    let oracle = Arc::new(ScriptedOracle::new().proposals("Sure! Here are my suggestions: make it better."));
    let pipeline = pipeline_with(oracle, PipelineConfig::default());
    let mut record = complete_record("sku-10");

    let result = pipeline.run(&mut record, CancellationToken::new()).await;

    assert_eq!(result.status, RunStatus::Failed);
    let failure = result.error.unwrap();
    assert_eq!(failure.stage, PipelineState::Generating);
    assert!(failure.message.contains("Parse error"));
}

#[tokio::test]
async fn test_oracle_timeout_fails_generation() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .proposals(r#"{"proposals": []}"#)
            .delayed(Duration::from_secs(5)),
    );
    let config = PipelineConfig {
        oracle_timeout: Duration::from_millis(50),
        ..PipelineConfig::default()
    };
    let pipeline = pipeline_with(oracle, config);
    let mut record = complete_record("sku-11");

    let result = pipeline.run(&mut record, CancellationToken::new()).await;

    assert_eq!(result.status, RunStatus::Failed);
    let failure = result.error.unwrap();
    assert_eq!(failure.stage, PipelineState::Generating);
    assert_eq!(failure.message, "Stage generating timed out");
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let oracle = Arc::new(ScriptedOracle::new().proposals(r#"{"proposals": []}"#));
    let pipeline = pipeline_with(Arc::clone(&oracle), PipelineConfig::default());
    let mut record = complete_record("sku-12");
    let token = CancellationToken::new();
    token.cancel();

    let result = pipeline.run(&mut record, token).await;

    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.state, PipelineState::Cancelled);
    assert_eq!(result.error.unwrap().stage, PipelineState::Initialized);
    assert!(result.stages.is_empty());
    assert!(oracle.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_during_oracle_call() {
    // Given: an oracle that would answer far too late
    let oracle = Arc::new(
        ScriptedOracle::new()
            .proposals(MIXED_PROPOSALS)
            .delayed(Duration::from_secs(30)),
    );
    let pipeline = pipeline_with(oracle, PipelineConfig::default());
    let mut record = complete_record("sku-13");
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    // When
    let result = tokio::time::timeout(Duration::from_secs(5), pipeline.run(&mut record, token))
        .await
        .expect("cancellation must interrupt the oracle call");

    // Then: cancelled, not failed, and nothing applied
    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.error.unwrap().stage, PipelineState::Generating);
    assert!(result.proposals.is_empty());
    assert_eq!(record.version, 1);
}

// ============================================================================
// Event stream
// ============================================================================

#[tokio::test]
async fn test_event_stream_order() {
    let oracle = Arc::new(ScriptedOracle::new().proposals(MIXED_PROPOSALS));
    let (tx, rx) = mpsc::channel(256);
    let pipeline = pipeline_with(oracle, PipelineConfig::default())
        .with_visual(Arc::new(MockVisual::observing(&[("color", "white", 0.9)])))
        .with_events(tx);
    let mut record = complete_record("sku-14");

    let result = pipeline.run(&mut record, CancellationToken::new()).await;
    drop(pipeline);
    let events = collect_events(rx).await;

    assert!(matches!(events.first(), Some(PipelineEvent::RunStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::Finished { status: RunStatus::Completed, accepted: 1, rejected: 5, human_review: 1, .. })
    ));
    assert!(events.iter().all(|e| e.record_id() == "sku-14"));

    let started: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StageStarted { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(started.len(), 5);
    assert_eq!(started[0], PipelineState::Validating);
    assert_eq!(started[4], PipelineState::RiskAssessing);

    let decided: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::ProposalEmitted { field, disposition, .. } => Some((field.as_str(), *disposition)),
            _ => None,
        })
        .collect();
    assert_eq!(decided.len(), 7);
    assert!(decided.contains(&("title", Disposition::Accepted)));
    assert!(decided.contains(&("color", Disposition::HumanReview)));
    assert_eq!(decided[0], ("image_link", Disposition::Rejected));

    let finalized = events.iter().any(|e| {
        matches!(e, PipelineEvent::StateChanged { to: PipelineState::Finalized, .. })
    });
    assert!(finalized);
    assert_eq!(result.run_id, match &events[0] {
        PipelineEvent::RunStarted { run_id, .. } => *run_id,
        _ => unreachable!(),
    });
}

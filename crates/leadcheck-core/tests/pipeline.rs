//! End-to-end runs of the diagnostic pipeline against the in-memory store.

use std::time::Duration;

use async_trait::async_trait;
use leadcheck_core::findings::{NoticeKind, Signal, StageName, StageStatus, Target, Verdict};
use leadcheck_core::inspect::{LeadAnalysed, OutputKind};
use leadcheck_core::models::{Document, Filter};
use leadcheck_core::store::memory::{InMemoryStore, Operation};
use leadcheck_core::store::{DocumentCursor, StoreError, StoreHandle, StoreResult};
use leadcheck_core::{DiagnosticPipeline, Findings};
use serde_json::{json, Value};

const DB: &str = "Yamini";
const COLL: &str = "customerChats";

// ─── Helpers ────────────────────────────────────────────────────────

fn target() -> Target {
    Target::new(DB, COLL, 200)
}

fn store_with(docs: Vec<Value>) -> InMemoryStore {
    InMemoryStore::new().with_collection(DB, COLL, docs)
}

async fn run(store: &InMemoryStore) -> Findings {
    DiagnosticPipeline::new(Duration::from_secs(5))
        .run(store, target())
        .await
}

fn analysed_lead(session: &str) -> Value {
    json!({
        "_id": {"$oid": "65a1b2c3d4e5f60718293a4b"},
        "sessionId": session,
        "leadAnalysed": true,
        "messageLength": 2,
        "analysedAt": {"$date": "2024-05-01T10:00:00Z"},
        "output": {
            "intent": "buy",
            "qualified": true,
            "confidence": 0.9,
            "signals": ["budget"],
            "summary": "Ready to purchase"
        },
        "messages": [
            {"type": "human", "data": {"content": "hello"}},
            {"type": "ai", "data": {"content": "hi, how can I help?"}}
        ]
    })
}

fn pending_lead(session: &str) -> Value {
    json!({"sessionId": session, "leadAnalysed": false, "output": []})
}

// ─── Halting behaviour ──────────────────────────────────────────────

#[tokio::test]
async fn connect_failure_halts_before_anything_else() {
    let store = store_with(vec![analysed_lead("s1")])
        .fail_on(Operation::Ping, StoreError::Connection("bad auth : authentication failed".into()));
    let findings = run(&store).await;

    let conn = findings.connection.as_ref().unwrap();
    assert!(!conn.connected);
    assert_eq!(
        conn.error.as_deref(),
        Some("connection failed: bad auth : authentication failed")
    );
    assert_eq!(findings.stages.len(), 1);
    assert_eq!(findings.halted_at(), Some(StageName::Connect));
    assert!(findings.databases.is_none());
    assert!(findings.collections.is_none());
    assert!(findings.total_count.is_none());
    assert!(findings.sample.is_none());
    assert!(findings.stats.is_none());
    assert_eq!(store.calls(), vec![Operation::Ping]);
    assert_eq!(findings.verdict(), Verdict::Halted { stage: StageName::Connect });
}

#[tokio::test]
async fn slow_ping_times_out() {
    let store = store_with(vec![analysed_lead("s1")]).with_ping_delay(Duration::from_millis(500));
    let findings = DiagnosticPipeline::new(Duration::from_millis(20))
        .run(&store, target())
        .await;

    let conn = findings.connection.as_ref().unwrap();
    assert!(!conn.connected);
    assert!(conn.error.as_deref().unwrap().contains("timed out"));
    assert!(findings.has_notice(NoticeKind::ConnectionFailed));
    assert_eq!(findings.halted_at(), Some(StageName::Connect));
}

#[tokio::test]
async fn missing_collection_skips_remaining_stages() {
    let store = InMemoryStore::new().with_collection(DB, "otherChats", vec![analysed_lead("s1")]);
    let findings = run(&store).await;

    assert_eq!(findings.halted_at(), Some(StageName::ListCollections));
    assert_eq!(findings.collections, Some(vec!["otherChats".to_string()]));
    assert!(findings.has_notice(NoticeKind::CollectionMissing));
    assert!(!store.was_called(Operation::CountDocuments));
    assert!(!store.was_called(Operation::FindOne));
    assert!(!store.was_called(Operation::FindMany));
    for stage in [
        StageName::CountDocuments,
        StageName::InspectSample,
        StageName::AggregateStats,
    ] {
        assert!(!findings.reached(stage));
    }
}

#[tokio::test]
async fn empty_collection_records_zero_and_halts() {
    let store = store_with(vec![]);
    let findings = run(&store).await;

    assert_eq!(findings.total_count, Some(0));
    assert_eq!(findings.halted_at(), Some(StageName::CountDocuments));
    assert!(findings.has_notice(NoticeKind::EmptyCollection));
    assert!(findings.sample.is_none());
    assert!(findings.stats.is_none());
    assert!(!store.was_called(Operation::FindOne));
    assert!(!store.was_called(Operation::FindMany));
}

#[tokio::test]
async fn unlisted_database_is_only_a_warning() {
    let store = store_with(vec![analysed_lead("s1")]).hide_database(DB);
    let findings = run(&store).await;

    let record = findings.record(StageName::ListDatabases).unwrap();
    assert_eq!(record.status, StageStatus::Warning);
    assert_eq!(record.signal, Signal::Continue);
    assert!(findings.has_notice(NoticeKind::DatabaseNotListed));
    assert!(findings.reached(StageName::AggregateStats));
    assert_eq!(findings.verdict(), Verdict::Healthy);
}

#[tokio::test]
async fn query_failure_while_listing_databases_continues() {
    let store = store_with(vec![analysed_lead("s1")]).fail_on(
        Operation::ListDatabaseNames,
        StoreError::Query("not authorized on admin to execute command".into()),
    );
    let findings = run(&store).await;

    assert_eq!(
        findings.record(StageName::ListDatabases).unwrap().status,
        StageStatus::Failed
    );
    assert!(findings.databases.is_none());
    assert!(findings.has_notice(NoticeKind::StoreFailure));
    assert!(findings.reached(StageName::AggregateStats));
}

#[tokio::test]
async fn infrastructure_failure_after_connect_halts() {
    let store = store_with(vec![analysed_lead("s1")])
        .fail_on(Operation::ListDatabaseNames, StoreError::Connection("reset by peer".into()));
    let findings = run(&store).await;

    assert_eq!(findings.halted_at(), Some(StageName::ListDatabases));
    let notice = findings.notices_for(StageName::ListDatabases).next().unwrap();
    assert_eq!(notice.kind, NoticeKind::ConnectionFailed);
    assert!(notice.message.contains("reset by peer"));
}

#[tokio::test]
async fn failed_count_is_recorded_before_halting() {
    let store = store_with(vec![analysed_lead("s1")])
        .fail_on(Operation::CountDocuments, StoreError::Query("operation exceeded time limit".into()));
    let findings = run(&store).await;

    assert_eq!(findings.halted_at(), Some(StageName::CountDocuments));
    assert!(findings.total_count.is_none());
    let notice = findings.notices_for(StageName::CountDocuments).next().unwrap();
    assert!(notice.message.contains("operation exceeded time limit"));
}

#[tokio::test]
async fn failed_sample_fetch_does_not_halt() {
    let store = store_with(vec![analysed_lead("s1")])
        .fail_on(Operation::FindOne, StoreError::Query("cursor killed".into()));
    let findings = run(&store).await;

    assert!(findings.sample.is_none());
    assert_eq!(
        findings.record(StageName::InspectSample).unwrap().signal,
        Signal::Continue
    );
    assert!(findings.stats.is_some());
}

#[tokio::test]
async fn failed_scan_keeps_exact_counts_and_drift() {
    let store = store_with(vec![
        json!({"sessionId": "b1", "leadAnalysed": true, "output": []}),
        json!({"sessionId": "s1", "leadAnalysed": "true", "output": []}),
        json!({"sessionId": "s2", "leadAnalysed": "true", "output": []}),
    ])
    .fail_on(Operation::FindMany, StoreError::Query("cursor killed".into()));
    let findings = run(&store).await;

    let stats = findings.stats.as_ref().unwrap();
    assert_eq!(stats.analysed_true_count, 1);
    assert_eq!(stats.analysed_string_count, 2);
    assert_eq!(stats.scanned, 0);
    assert!(!stats.scan_complete);

    let kinds: Vec<NoticeKind> = findings
        .notices_for(StageName::AggregateStats)
        .map(|n| n.kind)
        .collect();
    assert_eq!(kinds, vec![NoticeKind::LeadAnalysedDrift, NoticeKind::StoreFailure]);

    let record = findings.record(StageName::AggregateStats).unwrap();
    assert_eq!(record.signal, Signal::Continue);
    assert_eq!(record.status, StageStatus::Failed);
    assert_eq!(findings.halted_at(), None);
    assert_eq!(findings.verdict(), Verdict::AnalysedButEmptyOutput);
}

#[tokio::test]
async fn connection_lost_during_scan_halts_but_keeps_counts() {
    let store = store_with(vec![analysed_lead("s1")])
        .fail_on(Operation::FindMany, StoreError::Connection("reset by peer".into()));
    let findings = run(&store).await;

    let stats = findings.stats.as_ref().unwrap();
    assert_eq!(stats.analysed_true_count, 1);
    assert!(!stats.scan_complete);
    assert!(findings.has_notice(NoticeKind::ConnectionFailed));
    assert_eq!(findings.verdict(), Verdict::Halted { stage: StageName::AggregateStats });
}

#[tokio::test]
async fn completed_scan_is_marked_complete() {
    let findings = run(&store_with(vec![analysed_lead("s1")])).await;
    assert!(findings.stats.as_ref().unwrap().scan_complete);
}

/// Delegates to an [`InMemoryStore`] but never finds a sample, as when the
/// only document is deleted between the count and the fetch.
struct VanishingSample(InMemoryStore);

#[async_trait]
impl StoreHandle for VanishingSample {
    async fn ping(&self) -> StoreResult<()> {
        self.0.ping().await
    }

    async fn list_database_names(&self) -> StoreResult<Vec<String>> {
        self.0.list_database_names().await
    }

    async fn list_collection_names(&self, db: &str) -> StoreResult<Vec<String>> {
        self.0.list_collection_names(db).await
    }

    async fn count_documents(&self, db: &str, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.0.count_documents(db, collection, filter).await
    }

    async fn find_one(&self, _db: &str, _collection: &str, _filter: &Filter) -> StoreResult<Option<Document>> {
        Ok(None)
    }

    async fn find_many(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        limit: u64,
    ) -> StoreResult<Box<dyn DocumentCursor>> {
        self.0.find_many(db, collection, filter, limit).await
    }
}

#[tokio::test]
async fn missing_sample_is_a_warning_and_continues() {
    let store = VanishingSample(store_with(vec![analysed_lead("s1")]));
    let findings = DiagnosticPipeline::default().run(&store, target()).await;

    assert!(findings.sample.is_none());
    assert!(findings.has_notice(NoticeKind::NoSampleDocument));
    let record = findings.record(StageName::InspectSample).unwrap();
    assert_eq!(record.signal, Signal::Continue);
    assert_eq!(record.status, StageStatus::Warning);
    assert_eq!(findings.stats.as_ref().unwrap().with_output_count, 1);
}

// ─── Statistics and verdicts ────────────────────────────────────────

#[tokio::test]
async fn string_encoded_flags_are_reported_as_drift() {
    let mut docs: Vec<Value> = (0..3)
        .map(|i| json!({"sessionId": format!("b{}", i), "leadAnalysed": true, "output": []}))
        .collect();
    docs.extend((0..2).map(|i| json!({"sessionId": format!("s{}", i), "leadAnalysed": "true", "output": []})));
    let findings = run(&store_with(docs)).await;

    let stats = findings.stats.as_ref().unwrap();
    assert_eq!(stats.analysed_true_count, 3);
    assert_eq!(stats.analysed_string_count, 2);

    let drift = findings
        .notices_for(StageName::AggregateStats)
        .find(|n| n.kind == NoticeKind::LeadAnalysedDrift)
        .unwrap();
    assert!(drift.message.starts_with("2 documents"));
    assert_eq!(findings.verdict(), Verdict::AnalysedButEmptyOutput);
}

#[tokio::test]
async fn healthy_when_any_output_is_present() {
    let findings = run(&store_with(vec![
        pending_lead("s2"),
        analysed_lead("s1"),
        json!({"sessionId": "s3", "leadAnalysed": true, "output": {}}),
    ]))
    .await;

    let stats = findings.stats.as_ref().unwrap();
    assert_eq!(stats.scanned, 3);
    assert_eq!(stats.with_output_count, 1);
    assert_eq!(stats.without_output_count, 2);
    assert_eq!(stats.analysed_without_output, 1);
    assert!(findings.has_notice(NoticeKind::AnalysedWithoutOutput));
    assert_eq!(findings.verdict(), Verdict::Healthy);
}

#[tokio::test]
async fn nothing_analysed_yet() {
    let findings = run(&store_with(vec![pending_lead("s1"), pending_lead("s2")])).await;

    let stats = findings.stats.as_ref().unwrap();
    assert_eq!(stats.with_output_count, 0);
    assert_eq!(stats.analysed_true_count, 0);
    assert_eq!(findings.verdict(), Verdict::NoAnalysedDocs);
}

#[tokio::test]
async fn scan_is_bounded_by_sample_limit() {
    let docs = (0..10).map(|i| pending_lead(&format!("s{}", i))).collect();
    let store = store_with(docs);
    let findings = DiagnosticPipeline::default()
        .run(&store, Target::new(DB, COLL, 4))
        .await;

    assert_eq!(findings.total_count, Some(10));
    assert_eq!(findings.stats.as_ref().unwrap().scanned, 4);
}

// ─── Sample inspection ──────────────────────────────────────────────

#[tokio::test]
async fn sample_is_first_document_without_id() {
    let findings = run(&store_with(vec![analysed_lead("first"), pending_lead("second")])).await;

    let sample = findings.sample.as_ref().unwrap();
    assert_eq!(sample.session_id, Some(json!("first")));
    assert!(!sample.has_field("_id"));
    assert_eq!(sample.output.kind(), OutputKind::ObjectWithSubfields);
    assert_eq!(sample.messages.count, 2);
    assert_eq!(sample.fields.get("analysedAt").map(String::as_str), Some("datetime"));
}

#[tokio::test]
async fn partially_analysed_sample() {
    let findings = run(&store_with(vec![json!({
        "sessionId": "s1",
        "leadAnalysed": true,
        "output": {"intent": "buy", "qualified": true, "confidence": 0.9},
        "messages": [{"type": "human", "data": {"content": "hello"}}]
    })]))
    .await;

    let sample = findings.sample.as_ref().unwrap();
    assert_eq!(sample.output.kind(), OutputKind::ObjectWithSubfields);
    let analysis = sample.output.analysis().unwrap();
    assert_eq!(analysis.summary, None);
    assert_eq!(analysis.missing_subfields(), vec!["signals", "summary"]);
    assert_eq!(sample.messages.count, 1);
    assert_eq!(sample.messages.first_type.as_deref(), Some("human"));
    assert_eq!(findings.stats.as_ref().unwrap().with_output_count, 1);
}

#[tokio::test]
async fn pending_sample_is_not_counted_as_output() {
    let findings = run(&store_with(vec![pending_lead("s2")])).await;

    let sample = findings.sample.as_ref().unwrap();
    assert_eq!(sample.output.kind(), OutputKind::EmptySequence);
    assert_eq!(sample.lead_analysed, LeadAnalysed::Boolean(false));
    assert_eq!(findings.stats.as_ref().unwrap().with_output_count, 0);
}

#[tokio::test]
async fn malformed_sample_output_is_flagged() {
    let findings = run(&store_with(vec![json!({
        "sessionId": "s1",
        "leadAnalysed": "true",
        "output": [{"intent": "buy"}]
    })]))
    .await;

    let sample = findings.sample.as_ref().unwrap();
    assert_eq!(sample.output.kind(), OutputKind::NonEmptySequence);
    let kinds: Vec<NoticeKind> = findings
        .notices_for(StageName::InspectSample)
        .map(|n| n.kind)
        .collect();
    assert!(kinds.contains(&NoticeKind::OutputMalformed));
    assert!(kinds.contains(&NoticeKind::LeadAnalysedDrift));
    assert_eq!(
        findings.record(StageName::InspectSample).unwrap().signal,
        Signal::Continue
    );

    let stats = findings.stats.as_ref().unwrap();
    assert_eq!(stats.scanned, 1);
    assert_eq!(stats.with_output_count, 0);
    assert_eq!(stats.without_output_count, 1);
}

// ─── Idempotence ────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_runs_yield_identical_findings() {
    let store = store_with(vec![
        analysed_lead("s1"),
        pending_lead("s2"),
        json!({"sessionId": "s3", "leadAnalysed": "true", "output": {}}),
    ]);
    let first = run(&store).await;
    let second = run(&store).await;
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}

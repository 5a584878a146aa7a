//! The diagnostic stages.
//!
//! Each stage is one self-contained check against the store. It reads and
//! extends the shared [`Findings`] and returns a [`Signal`] telling the
//! pipeline whether later stages still make sense.
//!
//! | Stage | Halts when |
//! |-------|------------|
//! | [`Connect`] | the liveness probe fails or times out |
//! | [`ListDatabases`] | never for data problems (infrastructure errors only) |
//! | [`ListCollections`] | the target collection is missing, or listing fails |
//! | [`CountDocuments`] | the collection is empty, or counting fails |
//! | [`InspectSample`] | never for data problems (infrastructure errors only) |
//! | [`AggregateStats`] | never for data problems (infrastructure errors only) |

use std::time::Duration;

use async_trait::async_trait;

use crate::findings::{
    AggregateStats as Stats, ConnectionStatus, Findings, NoticeKind, Signal, StageName, Target,
};
use crate::inspect::{self, LeadAnalysed, OutputShape};
use crate::models::{fields, Filter};
use crate::store::{StoreError, StoreHandle};

/// What a stage gets to work with.
pub struct StageContext<'a> {
    pub store: &'a dyn StoreHandle,
    pub target: &'a Target,
}

/// One check of the diagnostic pipeline.
#[async_trait]
pub trait DiagnosticStage: Send + Sync {
    fn name(&self) -> StageName;

    /// Run the check. Every failed store call must be recorded in
    /// `findings` before returning [`Signal::Halt`].
    async fn run(&self, ctx: &StageContext<'_>, findings: &mut Findings) -> Signal;
}

/// Record a failed store call. Infrastructure errors always halt; query
/// errors halt only when `halt_on_query_error` is set.
fn store_failed(
    findings: &mut Findings,
    stage: StageName,
    what: &str,
    err: &StoreError,
    halt_on_query_error: bool,
) -> Signal {
    let kind = if err.is_infrastructure() {
        NoticeKind::ConnectionFailed
    } else {
        NoticeKind::StoreFailure
    };
    tracing::warn!(stage = %stage, error = %err, "{} failed", what);
    findings.notice(stage, kind, format!("{}: {}", what, err));
    if err.is_infrastructure() || halt_on_query_error {
        Signal::Halt
    } else {
        Signal::Continue
    }
}

/// Liveness probe bounded by a timeout.
pub struct Connect {
    pub timeout: Duration,
}

#[async_trait]
impl DiagnosticStage for Connect {
    fn name(&self) -> StageName {
        StageName::Connect
    }

    async fn run(&self, ctx: &StageContext<'_>, findings: &mut Findings) -> Signal {
        let result = match tokio::time::timeout(self.timeout, ctx.store.ping()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        };
        match result {
            Ok(()) => {
                findings.connection = Some(ConnectionStatus {
                    connected: true,
                    error: None,
                });
                Signal::Continue
            }
            Err(err) => {
                findings.connection = Some(ConnectionStatus {
                    connected: false,
                    error: Some(err.to_string()),
                });
                findings.notice(self.name(), NoticeKind::ConnectionFailed, err.to_string());
                Signal::Halt
            }
        }
    }
}

/// Lists database names. A missing target database is only a warning:
/// some credentials cannot see databases they are allowed to read.
pub struct ListDatabases;

#[async_trait]
impl DiagnosticStage for ListDatabases {
    fn name(&self) -> StageName {
        StageName::ListDatabases
    }

    async fn run(&self, ctx: &StageContext<'_>, findings: &mut Findings) -> Signal {
        match ctx.store.list_database_names().await {
            Ok(names) => {
                if !names.iter().any(|n| n == &ctx.target.database) {
                    findings.notice(
                        self.name(),
                        NoticeKind::DatabaseNotListed,
                        format!("'{}' is not in the database list", ctx.target.database),
                    );
                }
                findings.databases = Some(names);
                Signal::Continue
            }
            Err(err) => store_failed(findings, self.name(), "cannot list databases", &err, false),
        }
    }
}

/// Lists the collections of the target database and halts when the target
/// collection is not among them.
pub struct ListCollections;

#[async_trait]
impl DiagnosticStage for ListCollections {
    fn name(&self) -> StageName {
        StageName::ListCollections
    }

    async fn run(&self, ctx: &StageContext<'_>, findings: &mut Findings) -> Signal {
        match ctx.store.list_collection_names(&ctx.target.database).await {
            Ok(names) => {
                let found = names.iter().any(|n| n == &ctx.target.collection);
                findings.collections = Some(names);
                if found {
                    Signal::Continue
                } else {
                    findings.notice(
                        self.name(),
                        NoticeKind::CollectionMissing,
                        format!(
                            "'{}' not found in database '{}'",
                            ctx.target.collection, ctx.target.database
                        ),
                    );
                    Signal::Halt
                }
            }
            Err(err) => store_failed(findings, self.name(), "cannot list collections", &err, true),
        }
    }
}

/// Counts all documents; an empty collection leaves nothing to inspect.
pub struct CountDocuments;

#[async_trait]
impl DiagnosticStage for CountDocuments {
    fn name(&self) -> StageName {
        StageName::CountDocuments
    }

    async fn run(&self, ctx: &StageContext<'_>, findings: &mut Findings) -> Signal {
        let t = ctx.target;
        match ctx.store.count_documents(&t.database, &t.collection, &Filter::All).await {
            Ok(total) => {
                findings.total_count = Some(total);
                if total == 0 {
                    findings.notice(
                        self.name(),
                        NoticeKind::EmptyCollection,
                        format!("collection '{}' is empty", t.collection),
                    );
                    Signal::Halt
                } else {
                    Signal::Continue
                }
            }
            Err(err) => store_failed(findings, self.name(), "count failed", &err, true),
        }
    }
}

/// Fetches one document in natural order and classifies it.
pub struct InspectSample;

#[async_trait]
impl DiagnosticStage for InspectSample {
    fn name(&self) -> StageName {
        StageName::InspectSample
    }

    async fn run(&self, ctx: &StageContext<'_>, findings: &mut Findings) -> Signal {
        let t = ctx.target;
        let mut doc = match ctx.store.find_one(&t.database, &t.collection, &Filter::All).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                findings.notice(
                    self.name(),
                    NoticeKind::NoSampleDocument,
                    "no document returned although the count was non-zero",
                );
                return Signal::Continue;
            }
            Err(err) => return store_failed(findings, self.name(), "find_one failed", &err, false),
        };

        if let Some(map) = doc.as_object_mut() {
            map.remove(fields::ID);
        }
        let report = inspect::classify(&doc);

        if let LeadAnalysed::StringEncoded(raw) = &report.lead_analysed {
            findings.notice(
                self.name(),
                NoticeKind::LeadAnalysedDrift,
                format!("sample stores leadAnalysed as the string {:?}", raw),
            );
        }
        if let OutputShape::Malformed(tag) = &report.output {
            findings.notice(
                self.name(),
                NoticeKind::OutputMalformed,
                format!("sample output is {} ({})", report.output.kind(), tag),
            );
        }
        if report.violates_invariant() {
            findings.notice(
                self.name(),
                NoticeKind::AnalysedWithoutOutput,
                format!(
                    "sample has leadAnalysed=true but output is {}",
                    report.output.kind()
                ),
            );
        }

        findings.sample = Some(report);
        Signal::Continue
    }
}

/// Exact drift counts plus a bounded scan of `output` shapes.
///
/// Counters are published to the findings as soon as each store call
/// succeeds, so a failure part way keeps what was already counted.
pub struct AggregateStats;

impl AggregateStats {
    async fn scan(ctx: &StageContext<'_>, stats: &mut Stats) -> Result<(), StoreError> {
        let t = ctx.target;
        let mut cursor = ctx
            .store
            .find_many(&t.database, &t.collection, &Filter::All, t.sample_limit)
            .await?;
        while let Some(doc) = cursor.next_document().await? {
            stats.scanned += 1;
            if OutputShape::decode(&doc).is_analysed() {
                stats.with_output_count += 1;
            } else {
                stats.without_output_count += 1;
                if LeadAnalysed::decode(&doc).is_true() {
                    stats.analysed_without_output += 1;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DiagnosticStage for AggregateStats {
    fn name(&self) -> StageName {
        StageName::AggregateStats
    }

    async fn run(&self, ctx: &StageContext<'_>, findings: &mut Findings) -> Signal {
        let t = ctx.target;
        let store = ctx.store;

        let analysed_true_count = match store
            .count_documents(&t.database, &t.collection, &Filter::eq(fields::LEAD_ANALYSED, true))
            .await
        {
            Ok(n) => n,
            Err(err) => {
                return store_failed(findings, self.name(), "count of boolean leadAnalysed failed", &err, false)
            }
        };
        let mut stats = Stats {
            analysed_true_count,
            ..Stats::default()
        };
        findings.stats = Some(stats.clone());

        stats.analysed_string_count = match store
            .count_documents(&t.database, &t.collection, &Filter::eq(fields::LEAD_ANALYSED, "true"))
            .await
        {
            Ok(n) => n,
            Err(err) => {
                return store_failed(findings, self.name(), "count of string leadAnalysed failed", &err, false)
            }
        };
        findings.stats = Some(stats.clone());
        if stats.analysed_string_count > 0 {
            findings.notice(
                self.name(),
                NoticeKind::LeadAnalysedDrift,
                format!(
                    "{} documents store leadAnalysed as the string \"true\" instead of a boolean",
                    stats.analysed_string_count
                ),
            );
        }

        let scanned = Self::scan(ctx, &mut stats).await;
        stats.scan_complete = scanned.is_ok();
        findings.stats = Some(stats.clone());
        if let Err(err) = scanned {
            return store_failed(findings, self.name(), "sample scan failed", &err, false);
        }

        if stats.analysed_without_output > 0 {
            findings.notice(
                self.name(),
                NoticeKind::AnalysedWithoutOutput,
                format!(
                    "{} of {} scanned documents have leadAnalysed=true but no analysis output",
                    stats.analysed_without_output, stats.scanned
                ),
            );
        }
        Signal::Continue
    }
}

/// The standard stage order.
pub fn standard_stages(connect_timeout: Duration) -> Vec<Box<dyn DiagnosticStage>> {
    vec![
        Box::new(Connect {
            timeout: connect_timeout,
        }),
        Box::new(ListDatabases),
        Box::new(ListCollections),
        Box::new(CountDocuments),
        Box::new(InspectSample),
        Box::new(AggregateStats),
    ]
}

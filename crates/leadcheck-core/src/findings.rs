//! The findings accumulator and the final verdict.
//!
//! A [`Findings`] record is created empty at the start of a run, mutated in
//! place by each stage, and handed to the presentation layer once the run
//! ends. Stages that never ran leave no trace in it: their fields stay
//! `None` and they have no [`StageRecord`], which reports render as
//! "not reached".

use serde::Serialize;

use crate::inspect::SampleReport;

/// The fixed stages of a diagnostic run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Connect,
    ListDatabases,
    ListCollections,
    CountDocuments,
    InspectSample,
    AggregateStats,
}

impl StageName {
    pub const ALL: [StageName; 6] = [
        StageName::Connect,
        StageName::ListDatabases,
        StageName::ListCollections,
        StageName::CountDocuments,
        StageName::InspectSample,
        StageName::AggregateStats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Connect => "connect",
            StageName::ListDatabases => "list_databases",
            StageName::ListCollections => "list_collections",
            StageName::CountDocuments => "count_documents",
            StageName::InspectSample => "inspect_sample",
            StageName::AggregateStats => "aggregate_stats",
        }
    }

    /// Human-readable title used in reports.
    pub fn title(&self) -> &'static str {
        match self {
            StageName::Connect => "Connecting to the store",
            StageName::ListDatabases => "Listing databases",
            StageName::ListCollections => "Checking the database",
            StageName::CountDocuments => "Counting documents",
            StageName::InspectSample => "Inspecting a sample document",
            StageName::AggregateStats => "Checking analysed documents",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Continuation signal returned by every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Continue,
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Warning,
    Failed,
}

/// One executed stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: StageName,
    pub status: StageStatus,
    pub signal: Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// What a [`Notice`] is about. Determines severity and remediation hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// The store could not be reached (refused, auth, timeout).
    ConnectionFailed,
    /// A store call failed after the connection was established.
    StoreFailure,
    DatabaseNotListed,
    CollectionMissing,
    EmptyCollection,
    NoSampleDocument,
    /// `leadAnalysed` stored as a string instead of a boolean.
    LeadAnalysedDrift,
    /// `output` is neither an object nor an empty sequence.
    OutputMalformed,
    /// `leadAnalysed` is `true` but `output` holds no analysis.
    AnalysedWithoutOutput,
}

impl NoticeKind {
    pub fn severity(&self) -> Severity {
        match self {
            NoticeKind::ConnectionFailed | NoticeKind::StoreFailure => Severity::Error,
            _ => Severity::Warning,
        }
    }

    pub fn hints(&self) -> &'static [&'static str] {
        match self {
            NoticeKind::ConnectionFailed => &[
                "Check MONGO_URI: user name, password, and auth source",
                "Make sure this machine's IP is on the cluster's network access list",
                "For a quick test, temporarily allow 0.0.0.0/0 in the network access list",
            ],
            NoticeKind::StoreFailure => {
                &["Check that the credential has read access to the target database"]
            }
            NoticeKind::DatabaseNotListed => &[
                "Fix MONGO_DB if it is misspelled",
                "Some credentials cannot list databases they are allowed to read; continuing",
            ],
            NoticeKind::CollectionMissing => &["Fix MONGO_COLLECTION to one of the listed collections"],
            NoticeKind::EmptyCollection => {
                &["Make sure the upstream workflow writes conversations to this collection"]
            }
            NoticeKind::NoSampleDocument => &[],
            NoticeKind::LeadAnalysedDrift => {
                &["Have the analysis writer store leadAnalysed as a boolean, not the string \"true\""]
            }
            NoticeKind::OutputMalformed => &[
                "output should be an object with intent, qualified, confidence, signals, summary",
            ],
            NoticeKind::AnalysedWithoutOutput => {
                &["Check the analysis workflow: results are not being saved to output"]
            }
        }
    }
}

/// A warning or error recorded by a stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub stage: StageName,
    pub kind: NoticeKind,
    pub severity: Severity,
    pub message: String,
}

/// Target of a diagnostic run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub database: String,
    pub collection: String,
    /// Cap on the documents read by the statistics scan.
    pub sample_limit: u64,
}

impl Target {
    pub fn new(database: impl Into<String>, collection: impl Into<String>, sample_limit: u64) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            sample_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    /// Raw driver error when the probe failed.
    pub error: Option<String>,
}

/// Counters collected by the statistics stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    /// Exact count of `leadAnalysed == true` (boolean).
    pub analysed_true_count: u64,
    /// Exact count of `leadAnalysed == "true"` (string).
    pub analysed_string_count: u64,
    /// Documents read by the bounded scan.
    pub scanned: u64,
    /// Scanned documents whose `output` is a non-empty object.
    pub with_output_count: u64,
    pub without_output_count: u64,
    /// Scanned documents with boolean `true` flag but no analysed output.
    pub analysed_without_output: u64,
    /// False when a store call failed part way; the counters then cover
    /// only what was read before the failure.
    pub scan_complete: bool,
}

/// Final classification of collection health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Healthy,
    AnalysedButEmptyOutput,
    NoAnalysedDocs,
    /// The run stopped before statistics could be collected.
    Halted { stage: StageName },
}

impl Verdict {
    /// Non-empty output wins over the analysed flag, even when both are set.
    pub fn from_counts(with_output_count: u64, analysed_true_count: u64) -> Self {
        if with_output_count > 0 {
            Verdict::Healthy
        } else if analysed_true_count > 0 {
            Verdict::AnalysedButEmptyOutput
        } else {
            Verdict::NoAnalysedDocs
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Verdict::Healthy)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Verdict::Healthy => "HEALTHY",
            Verdict::AnalysedButEmptyOutput => "ANALYSED_BUT_EMPTY_OUTPUT",
            Verdict::NoAnalysedDocs => "NO_ANALYSED_DOCS",
            Verdict::Halted { .. } => "HALTED",
        }
    }

    /// Likely cause, for the report banner.
    pub fn symptom(&self) -> &'static str {
        match self {
            Verdict::Healthy => "analysed leads are ready to display",
            Verdict::AnalysedButEmptyOutput => {
                "documents are marked analysed but output is empty: the analysis writer is not persisting results"
            }
            Verdict::NoAnalysedDocs => "no analysed documents found: the analysis has not run yet",
            Verdict::Halted { .. } => "the diagnostic stopped early; see the failed stage above",
        }
    }
}

/// Accumulated results of one diagnostic run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Findings {
    pub target: Target,
    /// Executed stages, in order.
    pub stages: Vec<StageRecord>,
    pub connection: Option<ConnectionStatus>,
    pub databases: Option<Vec<String>>,
    pub collections: Option<Vec<String>>,
    pub total_count: Option<u64>,
    pub sample: Option<SampleReport>,
    pub stats: Option<AggregateStats>,
    pub notices: Vec<Notice>,
}

impl Findings {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            stages: Vec::new(),
            connection: None,
            databases: None,
            collections: None,
            total_count: None,
            sample: None,
            stats: None,
            notices: Vec::new(),
        }
    }

    /// Record a notice; severity follows from `kind`.
    pub fn notice(&mut self, stage: StageName, kind: NoticeKind, message: impl Into<String>) {
        self.notices.push(Notice {
            stage,
            kind,
            severity: kind.severity(),
            message: message.into(),
        });
    }

    /// Close out a stage. Its status is derived from the notices it recorded.
    pub fn record_stage(&mut self, stage: StageName, signal: Signal) {
        let status = match self.notices_for(stage).map(|n| n.severity).max() {
            Some(Severity::Error) => StageStatus::Failed,
            Some(Severity::Warning) => StageStatus::Warning,
            None => StageStatus::Ok,
        };
        self.stages.push(StageRecord {
            stage,
            status,
            signal,
        });
    }

    pub fn notices_for(&self, stage: StageName) -> impl Iterator<Item = &Notice> {
        self.notices.iter().filter(move |n| n.stage == stage)
    }

    pub fn has_notice(&self, kind: NoticeKind) -> bool {
        self.notices.iter().any(|n| n.kind == kind)
    }

    pub fn record(&self, stage: StageName) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn reached(&self, stage: StageName) -> bool {
        self.record(stage).is_some()
    }

    /// Stage that stopped the run, if any.
    pub fn halted_at(&self) -> Option<StageName> {
        self.stages
            .iter()
            .find(|r| r.signal == Signal::Halt)
            .map(|r| r.stage)
    }

    pub fn verdict(&self) -> Verdict {
        if let Some(stage) = self.halted_at() {
            return Verdict::Halted { stage };
        }
        match &self.stats {
            Some(stats) => Verdict::from_counts(stats.with_output_count, stats.analysed_true_count),
            None => Verdict::Halted {
                stage: self
                    .stages
                    .last()
                    .map(|r| r.stage)
                    .unwrap_or(StageName::Connect),
            },
        }
    }
}

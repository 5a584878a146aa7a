//! Report rendering.
//!
//! Turns a finished [`Findings`] record into either a human-readable report
//! (one section per stage, "not reached" for skipped stages, a verdict
//! banner) or a JSON document for scripts. Rendering never talks to the
//! store; everything shown comes from the findings.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;

use leadcheck_core::findings::{Findings, Notice, StageName, StageStatus, Verdict};
use leadcheck_core::inspect::{AnalysedAt, LeadAnalysed, OutputShape, SampleReport};

/// Where the run pointed, as shown in the report header.
#[derive(Debug, Clone, Serialize)]
pub struct ReportHeader {
    /// Masked connection URI.
    pub uri: String,
    pub database: String,
    pub collection: String,
}

/// JSON shape of `leadcheck diagnose --json`.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub header: &'a ReportHeader,
    pub verdict: Verdict,
    pub not_reached: Vec<StageName>,
    pub findings: &'a Findings,
}

pub fn not_reached(findings: &Findings) -> Vec<StageName> {
    StageName::ALL
        .into_iter()
        .filter(|s| !findings.reached(*s))
        .collect()
}

pub fn write_json<W: Write>(w: &mut W, header: &ReportHeader, findings: &Findings) -> io::Result<()> {
    let report = JsonReport {
        header,
        verdict: findings.verdict(),
        not_reached: not_reached(findings),
        findings,
    };
    serde_json::to_writer_pretty(&mut *w, &report)?;
    writeln!(w)
}

pub fn write_text<W: Write>(w: &mut W, header: &ReportHeader, findings: &Findings) -> io::Result<()> {
    let rule = "=".repeat(60);
    writeln!(w, "{}", rule)?;
    writeln!(w, "  LEAD COLLECTION DIAGNOSTIC")?;
    writeln!(w, "{}", rule)?;
    writeln!(w)?;
    writeln!(w, "  URI:         {}", header.uri)?;
    writeln!(w, "  Database:    {}", header.database)?;
    writeln!(w, "  Collection:  {}", header.collection)?;

    for (i, stage) in StageName::ALL.into_iter().enumerate() {
        writeln!(w)?;
        writeln!(w, "{}", "-".repeat(40))?;
        let status = match findings.record(stage) {
            Some(r) => match r.status {
                StageStatus::Ok => "ok",
                StageStatus::Warning => "warning",
                StageStatus::Failed => "FAILED",
            },
            None => "not reached",
        };
        writeln!(w, "STEP {}: {}  [{}]", i + 1, stage.title(), status)?;
        if !findings.reached(stage) {
            continue;
        }
        write_stage_body(w, stage, findings)?;
        for notice in findings.notices_for(stage) {
            write_notice(w, notice)?;
        }
    }

    write_verdict(w, findings)
}

fn write_stage_body<W: Write>(w: &mut W, stage: StageName, findings: &Findings) -> io::Result<()> {
    match stage {
        StageName::Connect => {
            if let Some(conn) = &findings.connection {
                if conn.connected {
                    writeln!(w, "  Connection successful")?;
                }
            }
        }
        StageName::ListDatabases => {
            if let Some(dbs) = &findings.databases {
                writeln!(w, "  Available databases: {}", join_or_none(dbs))?;
            }
        }
        StageName::ListCollections => {
            if let Some(cols) = &findings.collections {
                writeln!(
                    w,
                    "  Collections in '{}': {}",
                    findings.target.database,
                    join_or_none(cols)
                )?;
            }
        }
        StageName::CountDocuments => {
            if let Some(total) = findings.total_count {
                writeln!(w, "  Total documents: {}", total)?;
            }
        }
        StageName::InspectSample => {
            if let Some(sample) = &findings.sample {
                write_sample(w, sample)?;
            }
        }
        StageName::AggregateStats => {
            if let Some(stats) = &findings.stats {
                writeln!(w, "  leadAnalysed=true (boolean):  {}", stats.analysed_true_count)?;
                writeln!(w, "  leadAnalysed=\"true\" (string): {}", stats.analysed_string_count)?;
                writeln!(
                    w,
                    "  Scanned:                      {} (limit {})",
                    stats.scanned, findings.target.sample_limit
                )?;
                writeln!(w, "  With analysis output:         {}", stats.with_output_count)?;
                writeln!(w, "  Without output:               {}", stats.without_output_count)?;
                if !stats.scan_complete {
                    writeln!(w, "  (incomplete: counts cover only what was read before the failure)")?;
                }
            }
        }
    }
    Ok(())
}

fn write_sample<W: Write>(w: &mut W, sample: &SampleReport) -> io::Result<()> {
    let fields: Vec<String> = sample
        .fields
        .iter()
        .map(|(name, tag)| format!("{} ({})", name, tag))
        .collect();
    writeln!(w, "  Document fields: {}", join_or_none(&fields))?;

    writeln!(
        w,
        "  sessionId:      {}",
        sample.session_id.as_ref().map(display_value).unwrap_or_else(|| "(absent)".into())
    )?;
    let flag = match &sample.lead_analysed {
        LeadAnalysed::Boolean(b) => b.to_string(),
        LeadAnalysed::StringEncoded(s) => format!("{:?}", s),
        LeadAnalysed::Missing => "(absent)".to_string(),
        LeadAnalysed::OtherType { value, .. } => display_value(value),
    };
    writeln!(
        w,
        "  leadAnalysed:   {} (type: {})",
        flag,
        sample.lead_analysed.type_tag()
    )?;
    writeln!(
        w,
        "  messageLength:  {}",
        sample.message_length.as_ref().map(display_value).unwrap_or_else(|| "(absent)".into())
    )?;
    let analysed_at = match &sample.analysed_at {
        AnalysedAt::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        AnalysedAt::Null => "null".to_string(),
        AnalysedAt::Missing => "(absent)".to_string(),
        AnalysedAt::Unparsed(tag) => format!("unrecognized ({})", tag),
    };
    writeln!(w, "  analysedAt:     {}", analysed_at)?;

    writeln!(w)?;
    writeln!(w, "  output:         {}", sample.output.kind())?;
    if let OutputShape::Analysed(analysis) = &sample.output {
        writeln!(w, "    keys: {}", analysis.keys.join(", "))?;
        for (name, value) in analysis.subfields() {
            let shown = value.map(display_value).unwrap_or_else(|| "(absent)".into());
            writeln!(w, "    {:<11} {}", format!("{}:", name), shown)?;
        }
    }

    writeln!(w)?;
    writeln!(w, "  messages:       {}", sample.messages.count)?;
    if let Some(t) = &sample.messages.first_type {
        writeln!(w, "    first type:    {}", t)?;
    }
    if let Some(preview) = &sample.messages.first_preview {
        let ellipsis = if sample.messages.preview_truncated { "..." } else { "" };
        writeln!(w, "    first content: {}{}", preview, ellipsis)?;
    }
    Ok(())
}

fn write_notice<W: Write>(w: &mut W, notice: &Notice) -> io::Result<()> {
    writeln!(w, "  ! {}", notice.message)?;
    for hint in notice.kind.hints() {
        writeln!(w, "    -> {}", hint)?;
    }
    Ok(())
}

fn write_verdict<W: Write>(w: &mut W, findings: &Findings) -> io::Result<()> {
    let verdict = findings.verdict();
    writeln!(w)?;
    writeln!(w, "{}", "=".repeat(60))?;
    match verdict {
        Verdict::Halted { stage } => {
            writeln!(w, "  VERDICT: {} at {}", verdict.code(), stage.title().to_lowercase())?;
        }
        _ => writeln!(w, "  VERDICT: {}", verdict.code())?,
    }
    writeln!(w, "  {}", verdict.symptom())?;
    if let (Verdict::Healthy, Some(stats)) = (verdict, &findings.stats) {
        writeln!(w, "  {} leads ready to display.", stats.with_output_count)?;
    }
    writeln!(w, "{}", "=".repeat(60))
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

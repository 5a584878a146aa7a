//! `leadcheck diagnose`: run the pipeline against the configured store and
//! print the report.

use std::future::Future;
use std::io::Write;

use anyhow::Result;

use leadcheck_core::findings::Findings;
use leadcheck_core::store::StoreHandle;
use leadcheck_core::{DiagnosticPipeline, Verdict};

use crate::config::Config;
use crate::mongo_store::MongoStore;
use crate::report::{self, ReportHeader};

/// How a `diagnose` invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed(Verdict),
    /// Ctrl-C arrived while a store call was in flight.
    Interrupted,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Completed(v) if v.is_healthy() => 0,
            Outcome::Completed(_) => 1,
            Outcome::Interrupted => 130,
        }
    }
}

pub fn header(config: &Config) -> ReportHeader {
    ReportHeader {
        uri: config.masked_uri(),
        database: config.mongo.database.clone(),
        collection: config.mongo.collection.clone(),
    }
}

/// Run the standard pipeline against `store` using the configured target.
pub async fn diagnose(store: &dyn StoreHandle, config: &Config) -> Findings {
    DiagnosticPipeline::new(config.connect_timeout())
        .run(store, config.target())
        .await
}

/// Like [`diagnose`], but gives up as soon as `shutdown` resolves.
/// `None` means the run was dropped together with its in-flight store call.
pub async fn diagnose_until<F>(store: &dyn StoreHandle, config: &Config, shutdown: F) -> Option<Findings>
where
    F: Future,
{
    tokio::select! {
        findings = diagnose(store, config) => Some(findings),
        _ = shutdown => {
            tracing::warn!("interrupted; cancelling the in-flight store operation");
            None
        }
    }
}

/// CLI entry point for `leadcheck diagnose`.
pub async fn run_diagnose(config: &Config, json: bool) -> Result<Outcome> {
    let store = MongoStore::from_config(config);

    let Some(findings) = diagnose_until(&store, config, tokio::signal::ctrl_c()).await else {
        return Ok(Outcome::Interrupted);
    };

    let header = header(config);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        report::write_json(&mut out, &header, &findings)?;
    } else {
        report::write_text(&mut out, &header, &findings)?;
    }
    out.flush()?;

    Ok(Outcome::Completed(findings.verdict()))
}

/// CLI entry point for `leadcheck config`: the effective settings, URI masked.
pub fn show_config(config: &Config) -> Result<()> {
    let mut shown = config.clone();
    shown.mongo.uri = config.masked_uri();
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

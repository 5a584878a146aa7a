//! Sequential stage runner.
//!
//! [`DiagnosticPipeline::run`] executes its stages strictly in order, one at
//! a time, against a single [`Findings`] record. The first stage that returns
//! [`Signal::Halt`] ends the run; the remaining stages are skipped and leave
//! no record. Every store call is read-only, so there is nothing to retry or
//! roll back.
//!
//! Dropping the future returned by `run` (for example on Ctrl-C) drops the
//! in-flight store call with it.

use std::time::{Duration, Instant};

use crate::findings::{Findings, Signal, StageName, Target};
use crate::stages::{standard_stages, DiagnosticStage, StageContext};
use crate::store::StoreHandle;

/// Default bound on the connect stage's liveness probe.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on documents read by the statistics scan.
pub const DEFAULT_SAMPLE_LIMIT: u64 = 200;

/// Ordered list of diagnostic stages.
pub struct DiagnosticPipeline {
    stages: Vec<Box<dyn DiagnosticStage>>,
}

impl DiagnosticPipeline {
    /// The standard six-stage pipeline.
    pub fn new(connect_timeout: Duration) -> Self {
        Self::with_stages(standard_stages(connect_timeout))
    }

    pub fn with_stages(stages: Vec<Box<dyn DiagnosticStage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<StageName> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage against `store` until one halts, and return what was found.
    pub async fn run(&self, store: &dyn StoreHandle, target: Target) -> Findings {
        let mut findings = Findings::new(target.clone());
        let ctx = StageContext {
            store,
            target: &target,
        };

        tracing::info!(
            database = %target.database,
            collection = %target.collection,
            sample_limit = target.sample_limit,
            "starting diagnostic run"
        );

        for stage in &self.stages {
            let name = stage.name();
            let started = Instant::now();
            tracing::debug!(stage = %name, "stage started");

            let signal = stage.run(&ctx, &mut findings).await;
            findings.record_stage(name, signal);

            tracing::info!(
                stage = %name,
                ?signal,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "stage finished"
            );
            if signal == Signal::Halt {
                tracing::warn!(stage = %name, "pipeline halted");
                break;
            }
        }

        findings
    }
}

impl Default for DiagnosticPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

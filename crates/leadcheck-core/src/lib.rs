//! # leadcheck core
//!
//! Driver-free logic for leadcheck: the lead document model, the store
//! capability trait, the schema inspector, the findings record, and the
//! staged diagnostic pipeline.
//!
//! This crate performs no network or filesystem I/O of its own. The
//! `leadcheck` binary supplies a MongoDB-backed [`store::StoreHandle`];
//! tests use [`store::memory::InMemoryStore`].
//!
//! ```text
//! Connect → ListDatabases → ListCollections → CountDocuments → InspectSample → AggregateStats
//!    │                             │                 │
//!    └── halt on failure           └── halt if       └── halt if empty
//!                                      missing
//! ```

pub mod findings;
pub mod inspect;
pub mod models;
pub mod pipeline;
pub mod stages;
pub mod store;

pub use findings::{Findings, Verdict};
pub use pipeline::DiagnosticPipeline;

//! # leadcheck
//!
//! Staged connection and schema diagnostics for the MongoDB collection that
//! stores analysed sales conversations ("leads").
//!
//! `leadcheck diagnose` connects to the store, checks that the configured
//! database and collection exist, inspects a sample document against the
//! expected lead schema, counts analysed documents (catching a
//! `leadAnalysed` flag stored as a string), and ends with a verdict:
//!
//! | Verdict | Meaning |
//! |---------|---------|
//! | `HEALTHY` | at least one document carries an analysis `output` |
//! | `ANALYSED_BUT_EMPTY_OUTPUT` | documents are flagged analysed but `output` is empty |
//! | `NO_ANALYSED_DOCS` | the analysis has not run yet |
//! | `HALTED` | a stage stopped the run (connection, missing collection, empty collection) |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────────┐   ┌──────────────┐
//! │  config  │──▶│ leadcheck-core      │◀──│ mongo_store  │
//! │ toml+env │   │ pipeline → findings │   │ StoreHandle  │
//! └──────────┘   └─────────┬───────────┘   └──────────────┘
//!                          ▼
//!                   ┌────────────┐
//!                   │   report   │  text / JSON on stdout
//!                   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Layered settings: defaults, TOML file, `.env`, environment |
//! | [`mongo_store`] | MongoDB implementation of the core `StoreHandle` trait |
//! | [`diagnose`] | `diagnose` and `config` command entry points |
//! | [`report`] | Text and JSON rendering of findings |

pub mod config;
pub mod diagnose;
pub mod mongo_store;
pub mod report;

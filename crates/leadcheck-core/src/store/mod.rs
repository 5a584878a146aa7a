//! Storage capability interface for leadcheck.
//!
//! The [`StoreHandle`] trait exposes the handful of read-only operations the
//! diagnostic pipeline needs from a document store, enabling pluggable
//! backends (MongoDB in the `leadcheck` binary, in-memory for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::models::{Document, Filter};

/// Failure of a store operation.
///
/// Infrastructure failures ([`Connection`](StoreError::Connection),
/// [`Timeout`](StoreError::Timeout), [`NotConnected`](StoreError::NotConnected))
/// are reported with remediation hints. [`Query`](StoreError::Query) covers
/// everything the store rejected after a successful connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timed out after {0:?} waiting for the server")]
    Timeout(Duration),

    #[error("store handle used before a successful ping")]
    NotConnected,

    #[error("{0}")]
    Query(String),
}

impl StoreError {
    /// Whether this error points at the network/credentials rather than data.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, StoreError::Query(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Forward-only cursor over the documents returned by
/// [`StoreHandle::find_many`]. Not restartable.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Advance the cursor. Returns `Ok(None)` once exhausted.
    async fn next_document(&mut self) -> StoreResult<Option<Document>>;
}

/// Abstract, read-only document store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ping`](StoreHandle::ping) | Lightweight liveness probe |
/// | [`list_database_names`](StoreHandle::list_database_names) | Databases visible to the credential |
/// | [`list_collection_names`](StoreHandle::list_collection_names) | Collections of one database |
/// | [`count_documents`](StoreHandle::count_documents) | Exact count for a filter |
/// | [`find_one`](StoreHandle::find_one) | First matching document, natural order |
/// | [`find_many`](StoreHandle::find_many) | Bounded lazy cursor, natural order |
#[async_trait]
pub trait StoreHandle: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn list_database_names(&self) -> StoreResult<Vec<String>>;

    async fn list_collection_names(&self, db: &str) -> StoreResult<Vec<String>>;

    async fn count_documents(&self, db: &str, collection: &str, filter: &Filter)
        -> StoreResult<u64>;

    async fn find_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<Option<Document>>;

    async fn find_many(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        limit: u64,
    ) -> StoreResult<Box<dyn DocumentCursor>>;
}

//! In-memory [`StoreHandle`] implementation for tests and dry runs.
//!
//! Databases and collections live in ordered maps behind a non-poisoning
//! lock. Filters are evaluated with [`Filter::matches`], documents are
//! returned in insertion order (the "natural order" of this store).
//! Every call is recorded so tests can assert which operations a pipeline
//! run actually reached, and failures or ping latency can be injected per
//! operation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::models::{Document, Filter};

use super::{DocumentCursor, StoreError, StoreHandle, StoreResult};

/// Store operations, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Ping,
    ListDatabaseNames,
    ListCollectionNames,
    CountDocuments,
    FindOne,
    FindMany,
}

type Collections = BTreeMap<String, Vec<Document>>;

/// In-memory store for tests.
pub struct InMemoryStore {
    databases: RwLock<BTreeMap<String, Collections>>,
    hidden: BTreeSet<String>,
    failures: HashMap<Operation, StoreError>,
    ping_delay: Option<Duration>,
    calls: RwLock<Vec<Operation>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            databases: RwLock::new(BTreeMap::new()),
            hidden: BTreeSet::new(),
            failures: HashMap::new(),
            ping_delay: None,
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Add a collection with the given documents, creating the database if needed.
    pub fn with_collection(self, db: &str, collection: &str, docs: Vec<Document>) -> Self {
        self.databases
            .write()
            .entry(db.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
        self
    }

    /// Keep `db` usable but leave it out of [`StoreHandle::list_database_names`],
    /// the way some deployments restrict visibility without restricting access.
    pub fn hide_database(mut self, db: &str) -> Self {
        self.hidden.insert(db.to_string());
        self
    }

    /// Make every call of `op` fail with `err`.
    pub fn fail_on(mut self, op: Operation, err: StoreError) -> Self {
        self.failures.insert(op, err);
        self
    }

    /// Delay every ping by `delay` before answering. The call is logged
    /// before the delay starts.
    pub fn with_ping_delay(mut self, delay: Duration) -> Self {
        self.ping_delay = Some(delay);
        self
    }

    /// Append a document to an existing or new collection.
    pub fn insert(&self, db: &str, collection: &str, doc: Document) {
        self.databases
            .write()
            .entry(db.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
    }

    /// Operations performed so far, in call order.
    pub fn calls(&self) -> Vec<Operation> {
        self.calls.read().clone()
    }

    /// Whether `op` was called at least once.
    pub fn was_called(&self, op: Operation) -> bool {
        self.calls.read().contains(&op)
    }

    fn record(&self, op: Operation) -> StoreResult<()> {
        self.calls.write().push(op);
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn matching(&self, db: &str, collection: &str, filter: &Filter) -> Vec<Document> {
        self.databases
            .read()
            .get(db)
            .and_then(|cols| cols.get(collection))
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

struct VecCursor {
    docs: std::vec::IntoIter<Document>,
}

#[async_trait]
impl DocumentCursor for VecCursor {
    async fn next_document(&mut self) -> StoreResult<Option<Document>> {
        Ok(self.docs.next())
    }
}

#[async_trait]
impl StoreHandle for InMemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.record(Operation::Ping)?;
        if let Some(delay) = self.ping_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn list_database_names(&self) -> StoreResult<Vec<String>> {
        self.record(Operation::ListDatabaseNames)?;
        Ok(self
            .databases
            .read()
            .keys()
            .filter(|name| !self.hidden.contains(*name))
            .cloned()
            .collect())
    }

    async fn list_collection_names(&self, db: &str) -> StoreResult<Vec<String>> {
        self.record(Operation::ListCollectionNames)?;
        Ok(self
            .databases
            .read()
            .get(db)
            .map(|cols| cols.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn count_documents(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<u64> {
        self.record(Operation::CountDocuments)?;
        Ok(self.matching(db, collection, filter).len() as u64)
    }

    async fn find_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<Option<Document>> {
        self.record(Operation::FindOne)?;
        Ok(self.matching(db, collection, filter).into_iter().next())
    }

    async fn find_many(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        limit: u64,
    ) -> StoreResult<Box<dyn DocumentCursor>> {
        self.record(Operation::FindMany)?;
        let mut docs = self.matching(db, collection, filter);
        docs.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(Box::new(VecCursor {
            docs: docs.into_iter(),
        }))
    }
}

//! MongoDB-backed [`StoreHandle`] implementation.
//!
//! Maps each store operation onto the official driver. The client is built
//! lazily by [`ping`](StoreHandle::ping): URI parsing and the SRV lookup of
//! `mongodb+srv://` URIs can fail or hang, and both belong to the connect
//! stage and its timeout rather than to process start-up.
//!
//! Documents are handed to the core as relaxed extended JSON, so dates
//! arrive as `{"$date": "..."}` and object ids as `{"$oid": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document as BsonDocument};
use mongodb::options::ClientOptions;
use mongodb::{Client, Cursor};
use tokio::sync::OnceCell;

use leadcheck_core::models::{Document, Filter};
use leadcheck_core::store::{DocumentCursor, StoreError, StoreHandle, StoreResult};

use crate::config::Config;

/// MongoDB implementation of the [`StoreHandle`] trait.
pub struct MongoStore {
    uri: String,
    server_selection_timeout: Duration,
    client: OnceCell<Client>,
}

impl MongoStore {
    pub fn new(uri: impl Into<String>, server_selection_timeout: Duration) -> Self {
        Self {
            uri: uri.into(),
            server_selection_timeout,
            client: OnceCell::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.mongo.uri, config.connect_timeout())
    }

    async fn build_client(&self) -> StoreResult<Client> {
        let mut options = ClientOptions::parse(self.uri.as_str()).await.map_err(connection_error)?;
        options.server_selection_timeout = Some(self.server_selection_timeout);
        options.connect_timeout = Some(self.server_selection_timeout);
        options.app_name = Some("leadcheck".to_string());
        Client::with_options(options).map_err(connection_error)
    }

    fn client(&self) -> StoreResult<&Client> {
        self.client.get().ok_or(StoreError::NotConnected)
    }

    fn collection(&self, db: &str, collection: &str) -> StoreResult<mongodb::Collection<BsonDocument>> {
        Ok(self.client()?.database(db).collection::<BsonDocument>(collection))
    }
}

fn connection_error(err: mongodb::error::Error) -> StoreError {
    StoreError::Connection(err.to_string())
}

/// Network-level failures after a successful ping still count as
/// infrastructure errors; everything else is a query error.
fn query_error(err: mongodb::error::Error) -> StoreError {
    use mongodb::error::ErrorKind;
    match *err.kind {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::Authentication { .. } => {
            StoreError::Connection(err.to_string())
        }
        _ => StoreError::Query(err.to_string()),
    }
}

fn to_bson_filter(filter: &Filter) -> StoreResult<BsonDocument> {
    match filter {
        Filter::All => Ok(BsonDocument::new()),
        Filter::Eq { field, value } => {
            let value = mongodb::bson::to_bson(value)
                .map_err(|e| StoreError::Query(format!("invalid filter value: {}", e)))?;
            let mut filter = BsonDocument::new();
            filter.insert(field.clone(), value);
            Ok(filter)
        }
    }
}

fn to_json(doc: BsonDocument) -> Document {
    Bson::Document(doc).into_relaxed_extjson()
}

struct MongoCursor {
    inner: Cursor<BsonDocument>,
}

#[async_trait]
impl DocumentCursor for MongoCursor {
    async fn next_document(&mut self) -> StoreResult<Option<Document>> {
        if !self.inner.advance().await.map_err(query_error)? {
            return Ok(None);
        }
        let doc = self.inner.deserialize_current().map_err(query_error)?;
        Ok(Some(to_json(doc)))
    }
}

#[async_trait]
impl StoreHandle for MongoStore {
    async fn ping(&self) -> StoreResult<()> {
        let client = self
            .client
            .get_or_try_init(|| self.build_client())
            .await?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connection_error)?;
        Ok(())
    }

    async fn list_database_names(&self) -> StoreResult<Vec<String>> {
        self.client()?
            .list_database_names()
            .await
            .map_err(query_error)
    }

    async fn list_collection_names(&self, db: &str) -> StoreResult<Vec<String>> {
        self.client()?
            .database(db)
            .list_collection_names()
            .await
            .map_err(query_error)
    }

    async fn count_documents(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<u64> {
        self.collection(db, collection)?
            .count_documents(to_bson_filter(filter)?)
            .await
            .map_err(query_error)
    }

    async fn find_one(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
    ) -> StoreResult<Option<Document>> {
        let found = self
            .collection(db, collection)?
            .find_one(to_bson_filter(filter)?)
            .await
            .map_err(query_error)?;
        Ok(found.map(to_json))
    }

    async fn find_many(
        &self,
        db: &str,
        collection: &str,
        filter: &Filter,
        limit: u64,
    ) -> StoreResult<Box<dyn DocumentCursor>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let cursor = self
            .collection(db, collection)?
            .find(to_bson_filter(filter)?)
            .limit(limit)
            .await
            .map_err(query_error)?;
        Ok(Box::new(MongoCursor { inner: cursor }))
    }
}

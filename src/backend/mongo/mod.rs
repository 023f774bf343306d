//! MongoDB backend over the official driver
//!
//! The "index" of a run is a `database.collection` namespace; the database
//! part may be left out when the connection URI names a default database.
//! Pages are cut from the driver cursor `page_size` documents at a time, and
//! each document is converted to JSON text before it enters the pipeline.

use async_trait::async_trait;
use bson::{Document, doc};
use futures::{TryStream, TryStreamExt};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Cursor};
use tracing::{debug, info};

use super::{DocumentCursor, QuerySpec, RawDocument, ScrollRequest, SearchBackend};
use crate::config::BackendConfig;
use crate::error::{ConnectionError, ErrorInfo, ExportError, QueryError, Result};

pub mod bson_json;

/// Connected MongoDB deployment
pub struct MongoBackend {
    client: Client,
    default_database: Option<String>,
}

impl MongoBackend {
    /// Create the client and ping the deployment
    ///
    /// # Arguments
    /// * `config` - Backend configuration
    ///
    /// # Returns
    /// * `Result<Self>` - Connected backend or connection error
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        let connection_failed = |e: mongodb::error::Error| {
            ConnectionError::ConnectionFailed(ErrorInfo::from_mongodb_error(&e).to_string())
        };

        let mut options = ClientOptions::parse(&config.address)
            .await
            .map_err(connection_failed)?;
        let timeout = config.timeout();
        options.app_name = Some("querycsv".to_string());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let default_database = options.default_database.clone();
        let client = Client::with_options(options).map_err(connection_failed)?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connection_failed)?;

        info!("Connected to MongoDB");

        Ok(Self {
            client,
            default_database,
        })
    }

    fn collection(&self, index: &str) -> Result<Collection<Document>> {
        let (database, collection) = split_namespace(index, self.default_database.as_deref())?;
        Ok(self.client.database(database).collection(collection))
    }
}

/// Split `database.collection`, falling back to the URI's default database
fn split_namespace<'a>(index: &'a str, default_database: Option<&'a str>) -> Result<(&'a str, &'a str)> {
    let index = index.trim();
    match index.split_once('.') {
        Some((database, collection)) if !database.is_empty() && !collection.is_empty() => {
            Ok((database, collection))
        }
        None if !index.is_empty() => match default_database {
            Some(database) => Ok((database, index)),
            None => Err(QueryError::InvalidIndex(format!(
                "'{index}' has no database; use database.collection or put the database in the URI"
            ))
            .into()),
        },
        _ => Err(QueryError::InvalidIndex(index.to_string()).into()),
    }
}

/// Projection including each requested field once
///
/// MongoDB rejects a projection naming both `a` and `a.b`, so paths already
/// covered by an included parent are left out.
fn projection_for(fields: &[String]) -> Document {
    let mut projection = Document::new();
    for field in fields {
        let covered = fields.iter().any(|other| {
            field.len() > other.len()
                && field.starts_with(other.as_str())
                && field.as_bytes()[other.len()] == b'.'
        });
        if !covered && !projection.contains_key(field) {
            projection.insert(field.clone(), 1);
        }
    }
    projection
}

#[async_trait]
impl SearchBackend for MongoBackend {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn count(&self, query: &QuerySpec, index: &str) -> Result<u64> {
        let collection = self.collection(index)?;
        let filter = query.to_mongo_filter()?;
        Ok(collection.count_documents(filter).await?)
    }

    async fn open(&self, request: &ScrollRequest) -> Result<Box<dyn DocumentCursor>> {
        let collection = self.collection(&request.index)?;
        let filter = request.query.to_mongo_filter()?;

        let mut find = collection.find(filter).batch_size(request.page_size);
        if let Some(fields) = &request.fields {
            find = find.projection(projection_for(fields));
        }
        let cursor = find.await?;

        Ok(Box::new(MongoCursor::new(cursor, request.page_size)))
    }
}

/// Paged reader over a driver cursor
///
/// Generic over the document stream so any `TryStream` of documents can be
/// paged the same way the driver cursor is.
pub struct MongoCursor<S = Cursor<Document>> {
    stream: Option<S>,
    page_size: u32,
    total_fetched: u64,
}

impl<S> MongoCursor<S> {
    fn new(stream: S, page_size: u32) -> Self {
        Self {
            stream: Some(stream),
            page_size,
            total_fetched: 0,
        }
    }
}

#[async_trait]
impl<S> DocumentCursor for MongoCursor<S>
where
    S: TryStream<Ok = Document> + Unpin + Send,
    S::Error: Send,
    ExportError: From<S::Error>,
{
    async fn next_page(&mut self) -> Result<Option<Vec<RawDocument>>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let mut page = Vec::with_capacity(self.page_size as usize);

        for _ in 0..self.page_size {
            match stream.try_next().await {
                Ok(Some(doc)) => {
                    let json = serde_json::Value::Object(bson_json::document_to_json(&doc));
                    page.push(RawDocument::new(json.to_string()));
                }
                Ok(None) => break,
                Err(e) => {
                    // Drop the cursor so the server can release it
                    self.stream = None;
                    return Err(e.into());
                }
            }
        }

        if page.is_empty() {
            debug!(
                "MongoDB cursor exhausted after {} documents",
                self.total_fetched
            );
            self.stream = None;
            return Ok(None);
        }

        self.total_fetched += page.len() as u64;
        debug!(
            "Fetched page of {} documents (total: {})",
            page.len(),
            self.total_fetched
        );
        Ok(Some(page))
    }

    async fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            debug!(
                "Closed MongoDB cursor after fetching {} documents",
                self.total_fetched
            );
        }
        Ok(())
    }
}

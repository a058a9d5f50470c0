use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid, Bson, Document as BsonDocument};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use serde_json::Value;
use tracing::debug;

use super::store::{
    DeleteResult, Document, DocumentStore, Filter, ObjectId, StoreError, UpdateResult, ID_FIELD,
};

/// Database used when the connection string names none
pub const DEFAULT_DATABASE: &str = "moviemasterdb";

/// Server-side duplicate key error
const DUPLICATE_KEY: i32 = 11000;

/// Document store on a MongoDB deployment (`mongodb://` or `mongodb+srv://`).
///
/// Identifiers are native ObjectIds on the server and 24-digit hex strings
/// everywhere else.
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    /// Parses `uri` and builds a client. No server round trip happens here;
    /// the first operation surfaces an unreachable deployment.
    pub async fn connect(uri: &str) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| StoreError::InvalidConnectionString(e.to_string()))?;
        options
            .app_name
            .get_or_insert_with(|| env!("CARGO_PKG_NAME").to_string());

        let client = Client::with_options(options).map_err(backend)?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));
        Ok(Self { database })
    }

    pub fn name(&self) -> &str {
        self.database.name()
    }

    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.database.collection(name)
    }
}

fn backend(error: MongoError) -> StoreError {
    StoreError::Backend(error.to_string())
}

/// Maps duplicate key write errors to `StoreError::DuplicateKey`
fn write_error(collection: &str, error: MongoError) -> StoreError {
    if let ErrorKind::Write(WriteFailure::WriteError(failure)) = error.kind.as_ref() {
        if failure.code == DUPLICATE_KEY {
            return StoreError::DuplicateKey {
                collection: collection.to_string(),
                key: failure.message.clone(),
            };
        }
    }
    backend(error)
}

/// `_id` values that look like ObjectIds are stored as ObjectIds
fn to_bson(field: &str, value: &Value) -> Result<Bson, StoreError> {
    if field == ID_FIELD {
        if let Some(id) = value.as_str().and_then(|s| oid::ObjectId::parse_str(s).ok()) {
            return Ok(Bson::ObjectId(id));
        }
    }
    bson::to_bson(value).map_err(|e| StoreError::Backend(e.to_string()))
}

fn to_bson_document(fields: &Document) -> Result<BsonDocument, StoreError> {
    let mut document = BsonDocument::new();
    for (field, value) in fields {
        document.insert(field.clone(), to_bson(field, value)?);
    }
    Ok(document)
}

fn from_bson_document(mut document: BsonDocument) -> Document {
    if let Ok(id) = document.get_object_id(ID_FIELD) {
        document.insert(ID_FIELD, id.to_hex());
    }
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(fields) => fields,
        _ => Document::new(),
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let cursor = self
            .collection(collection)
            .find(to_bson_document(filter)?, None)
            .await
            .map_err(backend)?;
        let documents: Vec<BsonDocument> = cursor.try_collect().await.map_err(backend)?;
        Ok(documents.into_iter().map(from_bson_document).collect())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        let found = self
            .collection(collection)
            .find_one(to_bson_document(filter)?, None)
            .await
            .map_err(backend)?;
        Ok(found.map(from_bson_document))
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<ObjectId, StoreError> {
        let id = ObjectId::new();
        let mut document = to_bson_document(&document)?;
        document.insert(ID_FIELD, oid::ObjectId::from_bytes(id.bytes()));

        self.collection(collection)
            .insert_one(document, None)
            .await
            .map_err(|e| write_error(collection, e))?;
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        set: Document,
    ) -> Result<UpdateResult, StoreError> {
        let filter = to_bson_document(filter)?;
        let mut set = to_bson_document(&set)?;
        set.remove(ID_FIELD);

        // the server rejects an empty $set
        if set.is_empty() {
            let matched = self.collection(collection).find_one(filter, None).await.map_err(backend)?;
            return Ok(UpdateResult {
                matched_count: u64::from(matched.is_some()),
                modified_count: 0,
            });
        }

        let result = self
            .collection(collection)
            .update_one(filter, doc! { "$set": set }, None)
            .await
            .map_err(|e| write_error(collection, e))?;
        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<DeleteResult, StoreError> {
        let result = self
            .collection(collection)
            .delete_one(to_bson_document(filter)?, None)
            .await
            .map_err(backend)?;
        Ok(DeleteResult {
            deleted_count: result.deleted_count,
        })
    }

    async fn create_unique_index(&self, collection: &str, fields: &[&str]) -> Result<(), StoreError> {
        let keys: BsonDocument = fields
            .iter()
            .map(|field| (field.to_string(), Bson::Int32(1)))
            .collect();
        let index = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build();

        let created = self
            .collection(collection)
            .create_index(index, None)
            .await
            .map_err(backend)?;
        debug!("Unique index {} ready on {}", created.index_name, collection);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

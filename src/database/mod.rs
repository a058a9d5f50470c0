pub mod manager;
pub mod memory;
pub mod mongo;
pub mod store;

pub use manager::{Connection, ConnectionManager, Connector, DatabaseError, UrlConnector};
pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use store::{
    filter_of, DeleteResult, Document, DocumentStore, Filter, ObjectId, StoreError, UpdateResult,
    ID_FIELD,
};

pub mod backends;
mod connection;
pub mod repository;
pub(crate) mod schema;
pub mod traits;

pub use backends::libsql::LibSqlBackend;
pub use connection::Database;
pub use traits::{
    CheckpointStore, DatabaseBackend, GraphChunkHit, GraphStore, KvStore, MetadataStore,
    ScrolledPoint, UserStore, VectorHit, VectorPoint, VectorStore,
};

/// Names of the two vector collections.
pub const DOCUMENTS_COLLECTION: &str = "documents";
pub const MEMORY_COLLECTION: &str = "memory";

/// Key-value namespace prefixes.
pub const BLOCKLIST_PREFIX: &str = "blocklist:";
pub const REFRESH_PREFIX: &str = "refresh:";
pub const TASK_PREFIX: &str = "task:";

pub mod auth;
pub mod chunk;
pub mod compare;
pub mod document;
pub mod memory;
pub mod principal;
pub mod task;

pub use auth::{Claims, MigrationStats, TokenPair, User};
pub use chunk::{Chunk, Citation, GraphContext, RetrievalMethod, RetrievedChunk};
pub use compare::{compare_thread_id, CompareNode, CompareStatus, ComparisonState};
pub use document::{Document, FileType, SummaryFormat};
pub use memory::{MemoryEntry, MemoryHit, MemoryKind, MemoryMetadata};
pub use principal::{is_valid_anon_id, Principal, Role};
pub use task::{IngestStage, TaskRecord};

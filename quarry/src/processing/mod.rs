pub mod chunker;
pub mod extractors;
mod pipeline;
mod tasks;

pub use chunker::{estimate_tokens, SemanticChunker};
pub use extractors::{DocumentExtractor, TextExtractor};
pub use pipeline::Ingestor;
pub use tasks::TaskTracker;

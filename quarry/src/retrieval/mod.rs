mod retriever;

pub use retriever::{RetrievalOptions, RetrievalOutput, Retriever};
